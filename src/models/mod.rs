use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Financial statement families published by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

/// Reporting frequency of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Annual,
    Quarterly,
}

impl Frequency {
    /// Prefix used by the fundamentals time-series API
    pub fn series_prefix(&self) -> &'static str {
        match self {
            Frequency::Annual => "annual",
            Frequency::Quarterly => "quarterly",
        }
    }
}

/// One of the six statement sheets of a valuation measures file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementSheet {
    pub kind: StatementKind,
    pub frequency: Frequency,
}

impl StatementSheet {
    pub const ALL: [StatementSheet; 6] = [
        StatementSheet { kind: StatementKind::IncomeStatement, frequency: Frequency::Annual },
        StatementSheet { kind: StatementKind::IncomeStatement, frequency: Frequency::Quarterly },
        StatementSheet { kind: StatementKind::BalanceSheet, frequency: Frequency::Annual },
        StatementSheet { kind: StatementKind::BalanceSheet, frequency: Frequency::Quarterly },
        StatementSheet { kind: StatementKind::CashFlow, frequency: Frequency::Annual },
        StatementSheet { kind: StatementKind::CashFlow, frequency: Frequency::Quarterly },
    ];

    pub fn sheet_name(&self) -> &'static str {
        match (self.kind, self.frequency) {
            (StatementKind::IncomeStatement, Frequency::Annual) => "Annual Income Statement",
            (StatementKind::IncomeStatement, Frequency::Quarterly) => "Quarterly Income Statement",
            (StatementKind::BalanceSheet, Frequency::Annual) => "Annual Balance Sheet",
            (StatementKind::BalanceSheet, Frequency::Quarterly) => "Quarterly Balance Sheet",
            (StatementKind::CashFlow, Frequency::Annual) => "Annual Cash Flow",
            (StatementKind::CashFlow, Frequency::Quarterly) => "Quarterly Cash Flow",
        }
    }
}

/// A statement line item with one value per reporting period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Statement table: line items (rows) by period end dates (columns), oldest period first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub periods: Vec<NaiveDate>,
    pub line_items: Vec<LineItem>,
}

impl FinancialStatement {
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty() || self.line_items.is_empty()
    }
}

/// Price history sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceInterval {
    Daily,
    Weekly,
    Monthly,
}

impl PriceInterval {
    pub const ALL: [PriceInterval; 3] = [PriceInterval::Daily, PriceInterval::Weekly, PriceInterval::Monthly];

    /// Interval code understood by the chart API
    pub fn code(&self) -> &'static str {
        match self {
            PriceInterval::Daily => "1d",
            PriceInterval::Weekly => "1wk",
            PriceInterval::Monthly => "1mo",
        }
    }

    pub fn sheet_name(&self) -> &'static str {
        match self {
            PriceInterval::Daily => "Daily",
            PriceInterval::Weekly => "Weekly",
            PriceInterval::Monthly => "Monthly",
        }
    }
}

/// Historical price bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

/// Cash dividend paid on `date`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Valuation measures table: metrics by columns ("Current" then quarter ends)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationMeasures {
    pub columns: Vec<String>,
    pub metrics: Vec<(String, Vec<Option<f64>>)>,
}

impl ValuationMeasures {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Analyst price targets and consensus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTargets {
    pub current_price: Option<f64>,
    pub target_high_price: Option<f64>,
    pub target_low_price: Option<f64>,
    pub target_mean_price: Option<f64>,
    pub number_of_analyst_opinions: Option<f64>,
    pub recommendation_key: Option<String>,
    pub recommendation_mean: Option<f64>,
}

/// Company profile summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralInfo {
    pub ticker: String,
    pub trading_currency: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub full_time_employees: Option<f64>,
}

/// Analyst recommendation counts for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationTrend {
    /// Relative period as published, e.g. "0m" or "-1m"
    pub period: String,
    pub strong_buy: Option<f64>,
    pub buy: Option<f64>,
    pub hold: Option<f64>,
    pub sell: Option<f64>,
    pub strong_sell: Option<f64>,
}

/// Consensus earnings and revenue estimate for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsEstimate {
    pub period: String,
    pub growth: Option<f64>,
    pub earnings_avg: Option<f64>,
    pub earnings_low: Option<f64>,
    pub earnings_high: Option<f64>,
    pub revenue_avg: Option<f64>,
    pub revenue_low: Option<f64>,
    pub revenue_high: Option<f64>,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub tickers_file: PathBuf,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_per_minute: u32,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tickers_file: PathBuf::from("tickers.xlsx"),
            output_dir: PathBuf::from("XLSX"),
            concurrency: 5,
            retry_attempts: 3,
            retry_delay_ms: 3000,
            rate_limit_per_minute: 120,
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        Config {
            tickers_file: lookup("TICKERS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.tickers_file),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            concurrency: parsed(lookup("CONCURRENCY"), defaults.concurrency).max(1),
            retry_attempts: parsed(lookup("RETRY_ATTEMPTS"), defaults.retry_attempts).max(1),
            retry_delay_ms: parsed(lookup("RETRY_DELAY_MS"), defaults.retry_delay_ms),
            rate_limit_per_minute: parsed(lookup("RATE_LIMIT_PER_MINUTE"), defaults.rate_limit_per_minute),
            http_timeout_secs: parsed(lookup("HTTP_TIMEOUT_SECS"), defaults.http_timeout_secs),
        }
    }
}
