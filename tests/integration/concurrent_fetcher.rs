//! Integration tests for concurrent ticker processing

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use test_log::test;

use crate::common::api_mock::{two_year_statement, MockProvider};
use crate::common::logging::{init_test_logging, log_test_step};
use valuation_sheets::api::ProviderError;
use valuation_sheets::concurrent_fetcher::fetch_tickers_concurrently;
use valuation_sheets::data_collector::{DataCollector, Dataset};
use valuation_sheets::utils::RetryPolicy;

#[test(tokio::test)]
async fn test_run_classifies_tickers_and_creates_output_dir() {
    init_test_logging();
    log_test_step("Running three tickers, one of them unknown");

    let dir = tempdir().unwrap();
    let output = dir.path().join("nested").join("XLSX");

    let mut provider = MockProvider::new();
    provider.expect_financial_statement().returning(|symbol, _| {
        if symbol == "NOPE" {
            Err(ProviderError::NoData { symbol: symbol.to_string() })
        } else {
            Ok(two_year_statement())
        }
    });

    let collector = Arc::new(DataCollector::new(
        Arc::new(provider),
        output.clone(),
        RetryPolicy::new(2, Duration::from_millis(1)),
    ));
    let tickers = vec!["AAPL".to_string(), "NOPE".to_string(), "MSFT".to_string()];

    let result = fetch_tickers_concurrently(collector, tickers, &[Dataset::Financials], 2)
        .await
        .unwrap();

    assert_eq!(result.total_tickers, 3);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.partial, 0);
    assert_eq!(result.failed, 1);
    assert_eq!(result.sheets_written, 12);

    assert!(output.join("AAPL_valuation_measures.xlsx").exists());
    assert!(output.join("MSFT_valuation_measures.xlsx").exists());
    assert!(!output.join("NOPE_valuation_measures.xlsx").exists());
}

#[test(tokio::test)]
async fn test_partial_ticker_is_reported_as_partial() {
    let dir = tempdir().unwrap();

    let mut provider = MockProvider::new();
    provider
        .expect_dividends()
        .returning(|_| Ok(Vec::new()));
    provider
        .expect_valuation_measures()
        .returning(|_| Err(ProviderError::Api("timeseries unavailable".to_string())));

    let collector = Arc::new(DataCollector::new(
        Arc::new(provider),
        dir.path(),
        RetryPolicy::new(1, Duration::from_millis(1)),
    ));

    let result = fetch_tickers_concurrently(
        collector,
        vec!["BRK-B".to_string()],
        &[Dataset::Dividends, Dataset::Valuation],
        4,
    )
    .await
    .unwrap();

    assert_eq!(result.partial, 1);
    assert_eq!(result.sheets_written, 1);
}
