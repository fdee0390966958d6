use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::models::{
    Dividend, EarningsEstimate, FinancialStatement, GeneralInfo, PriceBar, PriceInterval,
    PriceTargets, RecommendationTrend, StatementSheet, ValuationMeasures,
};
use crate::utils::Retryable;

pub mod series_keys;
pub mod yahoo_client;
pub use yahoo_client::{YahooClient, YahooEndpoints};

/// Errors raised by market-data providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no data returned for {symbol}")]
    NoData { symbol: String },

    #[error("provider error: {0}")]
    Api(String),
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::NoData { .. } => false,
            // 404 means an unknown symbol, asking again will not change that
            ProviderError::Status { status, .. } => *status != 404,
            _ => true,
        }
    }
}

/// Rate limiter shared by every request of a client
pub struct ApiRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Source of per-ticker market data
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn financial_statement(
        &self,
        symbol: &str,
        sheet: StatementSheet,
    ) -> Result<FinancialStatement, ProviderError>;

    async fn price_history(
        &self,
        symbol: &str,
        interval: PriceInterval,
    ) -> Result<Vec<PriceBar>, ProviderError>;

    async fn dividends(&self, symbol: &str) -> Result<Vec<Dividend>, ProviderError>;

    async fn valuation_measures(&self, symbol: &str) -> Result<ValuationMeasures, ProviderError>;

    /// `None` when the provider has no analyst coverage for the symbol
    async fn price_targets(&self, symbol: &str) -> Result<Option<PriceTargets>, ProviderError>;

    async fn general_info(&self, symbol: &str) -> Result<GeneralInfo, ProviderError>;

    async fn recommendation_trend(
        &self,
        symbol: &str,
    ) -> Result<Vec<RecommendationTrend>, ProviderError>;

    async fn earnings_trend(&self, symbol: &str) -> Result<Vec<EarningsEstimate>, ProviderError>;
}
