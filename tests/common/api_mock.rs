//! Mock market-data provider

use async_trait::async_trait;
use mockall::mock;
use valuation_sheets::api::{MarketDataProvider, ProviderError};
use valuation_sheets::models::{
    Dividend, EarningsEstimate, FinancialStatement, GeneralInfo, PriceBar, PriceInterval,
    PriceTargets, RecommendationTrend, StatementSheet, ValuationMeasures,
};

use super::test_data;

mock! {
    pub Provider {}

    #[async_trait]
    impl MarketDataProvider for Provider {
        async fn financial_statement(&self, symbol: &str, sheet: StatementSheet) -> Result<FinancialStatement, ProviderError>;
        async fn price_history(&self, symbol: &str, interval: PriceInterval) -> Result<Vec<PriceBar>, ProviderError>;
        async fn dividends(&self, symbol: &str) -> Result<Vec<Dividend>, ProviderError>;
        async fn valuation_measures(&self, symbol: &str) -> Result<ValuationMeasures, ProviderError>;
        async fn price_targets(&self, symbol: &str) -> Result<Option<PriceTargets>, ProviderError>;
        async fn general_info(&self, symbol: &str) -> Result<GeneralInfo, ProviderError>;
        async fn recommendation_trend(&self, symbol: &str) -> Result<Vec<RecommendationTrend>, ProviderError>;
        async fn earnings_trend(&self, symbol: &str) -> Result<Vec<EarningsEstimate>, ProviderError>;
    }
}

/// Statement returned for every sheet by `provider_with_statement`
pub fn two_year_statement() -> FinancialStatement {
    test_data::statement(
        &[(2022, 9, 30), (2023, 9, 30)],
        &[
            ("Total Revenue", &[Some(394.3), Some(383.3)]),
            ("Net Income", &[Some(99.8), Some(97.0)]),
        ],
    )
}

/// Provider answering every statement request with `statement`
pub fn provider_with_statement(statement: FinancialStatement) -> MockProvider {
    let mut provider = MockProvider::new();
    provider
        .expect_financial_statement()
        .returning(move |_, _| Ok(statement.clone()));
    provider
}

/// Provider with a successful answer for every call
pub fn healthy_provider() -> MockProvider {
    let mut provider = provider_with_statement(two_year_statement());
    provider
        .expect_price_history()
        .returning(|_, _| Ok(test_data::price_bars()));
    provider
        .expect_dividends()
        .returning(|_| Ok(test_data::dividends()));
    provider
        .expect_valuation_measures()
        .returning(|_| Ok(test_data::valuation()));
    provider
        .expect_price_targets()
        .returning(|_| Ok(Some(test_data::price_targets())));
    provider
        .expect_general_info()
        .returning(|symbol| Ok(test_data::general_info(symbol)));
    provider
        .expect_recommendation_trend()
        .returning(|_| Ok(test_data::recommendation_trend()));
    provider
        .expect_earnings_trend()
        .returning(|_| Ok(test_data::earnings_estimates()));
    provider
}
