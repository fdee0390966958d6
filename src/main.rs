use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use valuation_sheets::{
    api::YahooClient,
    concurrent_fetcher::fetch_tickers_concurrently,
    data_collector::{DataCollector, Dataset},
    models::Config,
    tickers::read_tickers,
    utils::RetryPolicy,
    workbook::Workbook,
};

#[derive(Parser, Debug)]
#[command(
    name = "valuation-sheets",
    version,
    about = "📊 Per-ticker valuation spreadsheets from Yahoo Finance",
    long_about = "Reads a ticker list, downloads statements, prices, dividends, valuation and analyst data, \
and merges them into one spreadsheet per ticker. Existing sheets only ever gain new columns."
)]
struct Cli {
    /// Spreadsheet or CSV file with a "Ticker" column (overrides TICKERS_FILE)
    #[arg(long, global = true)]
    tickers_file: Option<PathBuf>,

    /// Folder receiving the per-ticker files (overrides OUTPUT_DIR)
    #[arg(long, short, global = true)]
    output_dir: Option<PathBuf>,

    /// Tickers processed in parallel (overrides CONCURRENCY)
    #[arg(long, short, global = true)]
    concurrency: Option<usize>,

    /// Attempts per provider call (overrides RETRY_ATTEMPTS)
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Process these tickers instead of reading the ticker file
    #[arg(long = "ticker", short, global = true)]
    tickers: Vec<String>,

    /// Show debug logs
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Annual and quarterly income statement, balance sheet and cash flow
    Financials,
    /// Daily, weekly and monthly prices plus dividends
    Prices,
    /// Valuation measures (market cap, P/E, P/B, ...)
    Valuation,
    /// Analyst price targets and recommendation trend
    Analyst,
    /// Currency, sector, industry and headcount
    Info,
    /// Earnings and revenue estimates
    Estimates,
    /// Everything above
    All,
    /// Print the sheets of an existing spreadsheet
    Inspect {
        file: PathBuf,
    },
}

impl Command {
    fn datasets(&self) -> Vec<Dataset> {
        match self {
            Command::Financials => vec![Dataset::Financials],
            Command::Prices => vec![Dataset::Prices, Dataset::Dividends],
            Command::Valuation => vec![Dataset::Valuation],
            Command::Analyst => vec![Dataset::AnalystTargets, Dataset::RecommendationTrend],
            Command::Info => vec![Dataset::GeneralInfo],
            Command::Estimates => vec![Dataset::EarningsEstimate],
            Command::All => Dataset::ALL.to_vec(),
            Command::Inspect { .. } => Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "valuation_sheets=debug"
    } else {
        "valuation_sheets=info"
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    if let Command::Inspect { file } = &cli.command {
        return inspect(file);
    }

    let mut config = Config::from_env();
    if let Some(path) = cli.tickers_file.clone() {
        config.tickers_file = path;
    }
    if let Some(dir) = cli.output_dir.clone() {
        config.output_dir = dir;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency.max(1);
    }
    if let Some(retries) = cli.retries {
        config.retry_attempts = retries.max(1);
    }

    info!("🚀 Starting valuation-sheets");
    info!("📁 Output folder: {}", config.output_dir.display());

    let tickers = if cli.tickers.is_empty() {
        match read_tickers(&config.tickers_file) {
            Ok(tickers) => tickers,
            Err(e) => {
                error!("❌ Failed to read ticker list {}: {}", config.tickers_file.display(), e);
                return Err(e).context("failed to read the ticker list");
            }
        }
    } else {
        cli.tickers.iter().map(|t| t.trim().to_uppercase()).filter(|t| !t.is_empty()).collect()
    };

    if tickers.is_empty() {
        info!("No tickers to process.");
        return Ok(());
    }

    let client = YahooClient::new(&config).context("failed to build HTTP client")?;
    let retry = RetryPolicy::new(config.retry_attempts, Duration::from_millis(config.retry_delay_ms));
    let collector = Arc::new(DataCollector::new(Arc::new(client), config.output_dir.clone(), retry));

    let datasets = cli.command.datasets();
    let result = fetch_tickers_concurrently(collector, tickers, &datasets, config.concurrency).await?;

    println!();
    println!("📊 Summary");
    println!("  Tickers:        {}", result.total_tickers);
    println!("  Succeeded:      {}", result.succeeded);
    println!("  Partial:        {}", result.partial);
    println!("  Failed:         {}", result.failed);
    println!("  Sheets written: {}", result.sheets_written);

    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let book = Workbook::open(file).with_context(|| format!("failed to open {}", file.display()))?;

    println!("📄 {}", file.display());
    for sheet in book.sheets() {
        let (rows, cols) = sheet.dimensions();
        println!("  {:<30} {:>6} rows x {:>3} columns", sheet.name, rows, cols);
    }
    Ok(())
}
