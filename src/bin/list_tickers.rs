//! Print the tickers a run would process

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use valuation_sheets::{models::Config, tickers::read_tickers};

#[derive(Parser, Debug)]
#[command(author, version, about = "📋 Print the parsed ticker list", long_about = None)]
struct Args {
    /// Ticker file; defaults to TICKERS_FILE
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    let path = args.file.unwrap_or_else(|| Config::from_env().tickers_file);
    let tickers = read_tickers(&path).with_context(|| format!("failed to read {}", path.display()))?;

    for ticker in &tickers {
        println!("{}", ticker);
    }
    eprintln!("{} tickers", tickers.len());
    Ok(())
}
