use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::MarketDataProvider;
use crate::models::{PriceInterval, PriceTargets, StatementSheet};
use crate::utils::{parse_period, RetryPolicy};
use crate::workbook::{merge_metric_rows, Cell, LabeledTable, OpenOutcome, RecordTable, Workbook};

pub const DIVIDENDS_SHEET: &str = "Dividends";
pub const VALUATION_SHEET: &str = "Valuation";
pub const ANALYST_SHEET: &str = "Analyst Price Target";
pub const GENERAL_INFO_SHEET: &str = "General information";
pub const RECOMMENDATION_SHEET: &str = "RecommendationTrend";
pub const EARNINGS_ESTIMATE_SHEET: &str = "EarningsEstimate";

const PRICE_HEADERS: &[&str] = &["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"];
const GENERAL_INFO_HEADERS: &[&str] = &["Ticker", "Trading Currency", "Sector", "Industry", "Full Time Employees"];
const NOT_AVAILABLE: &str = "N/A";

/// Kinds of data that can be collected for a ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Financials,
    Prices,
    Dividends,
    Valuation,
    AnalystTargets,
    GeneralInfo,
    RecommendationTrend,
    EarningsEstimate,
}

impl Dataset {
    pub const ALL: [Dataset; 8] = [
        Dataset::Financials,
        Dataset::Prices,
        Dataset::Dividends,
        Dataset::Valuation,
        Dataset::AnalystTargets,
        Dataset::GeneralInfo,
        Dataset::RecommendationTrend,
        Dataset::EarningsEstimate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Financials => "financials",
            Dataset::Prices => "prices",
            Dataset::Dividends => "dividends",
            Dataset::Valuation => "valuation",
            Dataset::AnalystTargets => "analyst targets",
            Dataset::GeneralInfo => "general info",
            Dataset::RecommendationTrend => "recommendation trend",
            Dataset::EarningsEstimate => "earnings estimate",
        }
    }

    /// Whether the dataset lives in the per-ticker valuation measures file
    pub fn in_valuation_file(&self) -> bool {
        !matches!(self, Dataset::RecommendationTrend | Dataset::EarningsEstimate)
    }
}

/// Something that went wrong while collecting one ticker
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub what: String,
    pub error: String,
}

/// Outcome of collecting one ticker
#[derive(Debug, Clone, Default)]
pub struct TickerReport {
    pub ticker: String,
    pub sheets_written: usize,
    pub files_written: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

impl TickerReport {
    fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }

    fn fail(&mut self, what: impl Into<String>, error: impl std::fmt::Display) {
        let what = what.into();
        error!("❌ {}: {} failed: {}", self.ticker, what, error);
        self.failures.push(Failure {
            what,
            error: error.to_string(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetches market data for a ticker and merges it into its spreadsheet files
pub struct DataCollector {
    provider: Arc<dyn MarketDataProvider>,
    output_dir: PathBuf,
    retry: RetryPolicy,
}

impl DataCollector {
    pub fn new(provider: Arc<dyn MarketDataProvider>, output_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            output_dir: output_dir.into(),
            retry,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn valuation_path(&self, ticker: &str) -> PathBuf {
        self.output_dir.join(format!("{}_valuation_measures.xlsx", ticker))
    }

    pub fn recommendation_path(&self, ticker: &str) -> PathBuf {
        self.output_dir.join(format!("recommendation_trend_{}.xlsx", ticker))
    }

    pub fn earnings_estimate_path(&self, ticker: &str) -> PathBuf {
        self.output_dir.join(format!("earnings_estimate_{}.xlsx", ticker))
    }

    /// Collect `datasets` for one ticker. Errors are recorded in the report, never returned.
    pub async fn collect_ticker(&self, ticker: &str, datasets: &[Dataset]) -> TickerReport {
        let mut report = TickerReport::new(ticker);

        if datasets.iter().any(|d| d.in_valuation_file()) {
            self.update_valuation_file(ticker, datasets, &mut report).await;
        }
        if datasets.contains(&Dataset::RecommendationTrend) {
            self.write_recommendation_trend(ticker, &mut report).await;
        }
        if datasets.contains(&Dataset::EarningsEstimate) {
            self.write_earnings_estimate(ticker, &mut report).await;
        }

        report
    }

    async fn update_valuation_file(&self, ticker: &str, datasets: &[Dataset], report: &mut TickerReport) {
        let path = self.valuation_path(ticker);
        let (mut book, outcome) = Workbook::open_or_recreate(&path);
        if outcome == OpenOutcome::Created {
            info!("🆕 Creating {}", path.display());
        }

        let mut changed = 0;
        for dataset in datasets.iter().filter(|d| d.in_valuation_file()) {
            changed += match dataset {
                Dataset::Financials => self.merge_financials(ticker, &mut book, report).await,
                Dataset::Prices => self.replace_prices(ticker, &mut book, report).await,
                Dataset::Dividends => self.replace_dividends(ticker, &mut book, report).await,
                Dataset::Valuation => self.merge_valuation(ticker, &mut book, report).await,
                Dataset::AnalystTargets => self.replace_analyst_targets(ticker, &mut book, report).await,
                Dataset::GeneralInfo => self.replace_general_info(ticker, &mut book, report).await,
                Dataset::RecommendationTrend | Dataset::EarningsEstimate => 0,
            };
        }

        // a recreated file is rewritten even when every dataset failed
        if changed == 0 && outcome != OpenOutcome::Recreated {
            info!("🔁 {}: nothing changed, {} left untouched", ticker, path.display());
            return;
        }

        match book.save(&path) {
            Ok(()) => {
                info!("💾 {}: saved {} sheet(s) to {}", ticker, changed, path.display());
                report.sheets_written += changed;
                report.files_written.push(path);
            }
            Err(e) => report.fail(path.display().to_string(), e),
        }
    }

    /// Create missing statement sheets and append unseen period columns to existing ones
    async fn merge_financials(&self, ticker: &str, book: &mut Workbook, report: &mut TickerReport) -> usize {
        let mut changed = 0;

        for sheet in StatementSheet::ALL {
            let name = sheet.sheet_name();
            let description = format!("{} {}", ticker, name);
            let statement = match self
                .retry
                .run(&description, || self.provider.financial_statement(ticker, sheet))
                .await
            {
                Ok(statement) => statement,
                Err(e) => {
                    report.fail(name, e);
                    continue;
                }
            };

            if statement.is_empty() {
                warn!("⚠️ {}: no data for {}", ticker, name);
                continue;
            }

            let incoming = LabeledTable::from_statement(&statement);
            match book.sheet(name) {
                None => {
                    info!("🆕 Creating sheet '{}' for {}", name, ticker);
                    book.put_sheet(incoming.to_sheet(name));
                    changed += 1;
                }
                Some(existing) => {
                    let mut table = LabeledTable::from_sheet(existing);
                    let added = table.merge_new_columns(&incoming);
                    if added.is_empty() {
                        info!("🔁 Nothing to add for '{}' ({})", name, ticker);
                    } else {
                        info!("➕ Adding new columns for '{}' ({}): {}", name, ticker, added.join(", "));
                        book.put_sheet(table.to_sheet(name));
                        changed += 1;
                    }
                }
            }
        }

        changed
    }

    async fn replace_prices(&self, ticker: &str, book: &mut Workbook, report: &mut TickerReport) -> usize {
        let mut changed = 0;

        for interval in PriceInterval::ALL {
            let name = interval.sheet_name();
            let description = format!("{} {} prices", ticker, name);
            let bars = match self
                .retry
                .run(&description, || self.provider.price_history(ticker, interval))
                .await
            {
                Ok(bars) => bars,
                Err(e) => {
                    report.fail(format!("{} prices", name), e);
                    continue;
                }
            };

            let mut table = RecordTable::new(PRICE_HEADERS);
            for bar in &bars {
                table.push(vec![
                    Cell::Date(bar.date),
                    Cell::number(bar.open),
                    Cell::number(bar.high),
                    Cell::number(bar.low),
                    Cell::number(bar.close),
                    Cell::number(bar.adj_close),
                    Cell::number(bar.volume.map(|v| v as f64)),
                ]);
            }

            debug!("{}: {} {} bars", ticker, table.len(), name);
            book.put_sheet(table.to_sheet(name));
            changed += 1;
        }

        changed
    }

    async fn replace_dividends(&self, ticker: &str, book: &mut Workbook, report: &mut TickerReport) -> usize {
        let description = format!("{} dividends", ticker);
        let dividends = match self.retry.run(&description, || self.provider.dividends(ticker)).await {
            Ok(dividends) => dividends,
            Err(e) => {
                report.fail(DIVIDENDS_SHEET, e);
                return 0;
            }
        };

        if dividends.is_empty() {
            info!("{} pays no dividend", ticker);
        }

        let mut table = RecordTable::new(&["Date", "Dividend"]);
        for dividend in &dividends {
            table.push(vec![Cell::Date(dividend.date), Cell::Number(dividend.amount)]);
        }
        book.put_sheet(table.to_sheet(DIVIDENDS_SHEET));
        1
    }

    async fn merge_valuation(&self, ticker: &str, book: &mut Workbook, report: &mut TickerReport) -> usize {
        let description = format!("{} valuation measures", ticker);
        let measures = match self
            .retry
            .run(&description, || self.provider.valuation_measures(ticker))
            .await
        {
            Ok(measures) => measures,
            Err(e) => {
                report.fail(VALUATION_SHEET, e);
                return 0;
            }
        };

        if measures.is_empty() {
            warn!("⚠️ {}: no valuation measures", ticker);
            return 0;
        }

        let existing = book.sheet(VALUATION_SHEET);
        let sheet = merge_metric_rows(existing, &measures, VALUATION_SHEET);
        if existing.map_or(false, |e| e.same_content(&sheet)) {
            info!("🔁 Nothing to add for '{}' ({})", VALUATION_SHEET, ticker);
            return 0;
        }

        book.put_sheet(sheet);
        1
    }

    async fn replace_analyst_targets(&self, ticker: &str, book: &mut Workbook, report: &mut TickerReport) -> usize {
        let description = format!("{} analyst targets", ticker);
        let targets = match self.retry.run(&description, || self.provider.price_targets(ticker)).await {
            Ok(Some(targets)) => targets,
            Ok(None) => {
                warn!("⚠️ No financial data available for {}", ticker);
                return 0;
            }
            Err(e) => {
                report.fail(ANALYST_SHEET, e);
                return 0;
            }
        };

        book.put_sheet(analyst_table(&targets).to_sheet(ANALYST_SHEET));
        1
    }

    async fn replace_general_info(&self, ticker: &str, book: &mut Workbook, report: &mut TickerReport) -> usize {
        let description = format!("{} general info", ticker);
        let record = match self.retry.run(&description, || self.provider.general_info(ticker)).await {
            Ok(info) => vec![
                Cell::text(ticker),
                text_or_empty(info.trading_currency),
                text_or_empty(info.sector),
                text_or_empty(info.industry),
                Cell::number(info.full_time_employees),
            ],
            Err(e) => {
                report.fail(GENERAL_INFO_SHEET, e);
                let mut record = vec![Cell::text(ticker)];
                record.extend((1..GENERAL_INFO_HEADERS.len()).map(|_| Cell::text("Error")));
                record
            }
        };

        let mut table = RecordTable::new(GENERAL_INFO_HEADERS);
        table.push(record);
        book.put_sheet(table.to_sheet(GENERAL_INFO_SHEET));
        1
    }

    async fn write_recommendation_trend(&self, ticker: &str, report: &mut TickerReport) {
        let description = format!("{} recommendation trend", ticker);
        let trend = match self
            .retry
            .run(&description, || self.provider.recommendation_trend(ticker))
            .await
        {
            Ok(trend) => trend,
            Err(e) => {
                report.fail(RECOMMENDATION_SHEET, e);
                return;
            }
        };

        if trend.is_empty() {
            info!("No recommendation trend data for {}", ticker);
            return;
        }

        let today = Local::now().date_naive();
        let mut table = RecordTable::new(&["Period", "Strong Buy", "Buy", "Hold", "Sell", "Strong Sell"]);
        for row in &trend {
            table.push(vec![
                Cell::text(parse_period(&row.period, today)),
                Cell::number(row.strong_buy),
                Cell::number(row.buy),
                Cell::number(row.hold),
                Cell::number(row.sell),
                Cell::number(row.strong_sell),
            ]);
        }

        let path = self.recommendation_path(ticker);
        self.write_single_sheet(&path, table, RECOMMENDATION_SHEET, report);
    }

    async fn write_earnings_estimate(&self, ticker: &str, report: &mut TickerReport) {
        let description = format!("{} earnings estimate", ticker);
        let estimates = match self.retry.run(&description, || self.provider.earnings_trend(ticker)).await {
            Ok(estimates) => estimates,
            Err(e) => {
                report.fail(EARNINGS_ESTIMATE_SHEET, e);
                return;
            }
        };

        if estimates.is_empty() {
            info!("No earnings estimate data for {}", ticker);
            return;
        }

        let mut table = RecordTable::new(&[
            "Period",
            "Growth",
            "Earnings Avg",
            "Earnings Low",
            "Earnings High",
            "Revenue Avg",
            "Revenue Low",
            "Revenue High",
        ]);
        for estimate in &estimates {
            table.push(vec![
                Cell::text(estimate.period.as_str()),
                Cell::number(estimate.growth),
                Cell::number(estimate.earnings_avg),
                Cell::number(estimate.earnings_low),
                Cell::number(estimate.earnings_high),
                Cell::number(estimate.revenue_avg),
                Cell::number(estimate.revenue_low),
                Cell::number(estimate.revenue_high),
            ]);
        }

        let path = self.earnings_estimate_path(ticker);
        self.write_single_sheet(&path, table, EARNINGS_ESTIMATE_SHEET, report);
    }

    /// Overwrite `path` with a workbook holding only `table`
    fn write_single_sheet(&self, path: &Path, table: RecordTable, name: &str, report: &mut TickerReport) {
        let mut book = Workbook::new();
        book.put_sheet(table.to_sheet(name));

        match book.save(path) {
            Ok(()) => {
                info!("💾 {}: saved {}", report.ticker, path.display());
                report.sheets_written += 1;
                report.files_written.push(path.to_path_buf());
            }
            Err(e) => report.fail(path.display().to_string(), e),
        }
    }
}

fn analyst_table(targets: &PriceTargets) -> RecordTable {
    let number = |value: Option<f64>| value.map_or_else(|| Cell::text(NOT_AVAILABLE), Cell::Number);

    let mut table = RecordTable::new(&["Category", "Value"]);
    let rows = [
        ("Current Price", number(targets.current_price)),
        ("Target High Price", number(targets.target_high_price)),
        ("Target Low Price", number(targets.target_low_price)),
        ("Target Mean Price", number(targets.target_mean_price)),
        ("Number Of Analyst Opinions", number(targets.number_of_analyst_opinions)),
        (
            "Recommendation Key",
            Cell::text(targets.recommendation_key.as_deref().unwrap_or(NOT_AVAILABLE)),
        ),
        ("Recommendation Mean", number(targets.recommendation_mean)),
    ];
    for (category, value) in rows {
        table.push(vec![Cell::text(category), value]);
    }
    table
}

fn text_or_empty(value: Option<String>) -> Cell {
    value.map_or(Cell::Empty, Cell::Text)
}
