//! Per-ticker read-modify-write against a mocked provider

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use test_log::test;

use crate::common::api_mock::{healthy_provider, provider_with_statement, two_year_statement, MockProvider};
use crate::common::test_data;
use valuation_sheets::api::ProviderError;
use valuation_sheets::data_collector::{DataCollector, Dataset};
use valuation_sheets::models::PriceInterval;
use valuation_sheets::utils::RetryPolicy;
use valuation_sheets::workbook::{Cell, Sheet, Workbook};

fn collector(provider: MockProvider, dir: &std::path::Path) -> DataCollector {
    DataCollector::new(Arc::new(provider), dir, RetryPolicy::new(3, Duration::from_millis(1)))
}

fn row_keys(book: &Workbook, sheet: &str, row: usize) -> Vec<String> {
    book.sheet(sheet).unwrap().rows[row].iter().map(|c| c.key()).collect()
}

#[test(tokio::test)]
async fn test_first_run_creates_every_sheet_and_file() {
    let dir = tempdir().unwrap();
    let collector = collector(healthy_provider(), dir.path());

    let report = collector.collect_ticker("AAPL", &Dataset::ALL).await;

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.files_written.len(), 3);

    let book = Workbook::open(&dir.path().join("AAPL_valuation_measures.xlsx")).unwrap();
    assert_eq!(
        book.sheet_names(),
        vec![
            "Annual Income Statement",
            "Quarterly Income Statement",
            "Annual Balance Sheet",
            "Quarterly Balance Sheet",
            "Annual Cash Flow",
            "Quarterly Cash Flow",
            "Daily",
            "Weekly",
            "Monthly",
            "Dividends",
            "Valuation",
            "Analyst Price Target",
            "General information",
        ]
    );
    assert_eq!(row_keys(&book, "Annual Income Statement", 0), vec!["", "2022-09-30", "2023-09-30"]);
    assert_eq!(
        row_keys(&book, "Daily", 0),
        vec!["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"]
    );
    assert_eq!(row_keys(&book, "General information", 1)[..3].to_vec(), vec!["AAPL", "USD", "Technology"]);
    assert_eq!(row_keys(&book, "Analyst Price Target", 7), vec!["Recommendation Mean", "N/A"]);

    let trend = Workbook::open(&dir.path().join("recommendation_trend_AAPL.xlsx")).unwrap();
    assert_eq!(trend.sheet_names(), vec!["RecommendationTrend"]);
    let period = trend.sheet("RecommendationTrend").unwrap().cell(1, 0).key();
    assert!(period.ends_with("-01"), "period {} should be a month start", period);

    assert!(dir.path().join("earnings_estimate_AAPL.xlsx").exists());
    assert_eq!(report.sheets_written, 15);
}

#[test(tokio::test)]
async fn test_statement_sheets_only_gain_columns() {
    let dir = tempdir().unwrap();
    collector(provider_with_statement(two_year_statement()), dir.path())
        .collect_ticker("AAPL", &[Dataset::Financials])
        .await;

    // restated 2023 figure must not overwrite the stored one
    let newer = test_data::statement(
        &[(2023, 9, 30), (2024, 9, 30)],
        &[
            ("Total Revenue", &[Some(999.0), Some(391.0)]),
            ("EBITDA", &[Some(125.8), Some(134.7)]),
        ],
    );
    let report = collector(provider_with_statement(newer), dir.path())
        .collect_ticker("AAPL", &[Dataset::Financials])
        .await;

    assert!(report.is_success());
    assert_eq!(report.sheets_written, 6);

    let book = Workbook::open(&dir.path().join("AAPL_valuation_measures.xlsx")).unwrap();
    let sheet = "Quarterly Cash Flow";
    assert_eq!(row_keys(&book, sheet, 0), vec!["", "2022-09-30", "2023-09-30", "2024-09-30"]);
    assert_eq!(row_keys(&book, sheet, 1), vec!["Total Revenue", "394.3", "383.3", "391"]);
    assert_eq!(row_keys(&book, sheet, 2), vec!["Net Income", "99.8", "97"]);
    assert_eq!(row_keys(&book, sheet, 3), vec!["EBITDA", "", "", "134.7"]);
}

#[test(tokio::test)]
async fn test_identical_rerun_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("MSFT_valuation_measures.xlsx");

    collector(provider_with_statement(two_year_statement()), dir.path())
        .collect_ticker("MSFT", &[Dataset::Financials])
        .await;
    let first = std::fs::read(&path).unwrap();

    let report = collector(provider_with_statement(two_year_statement()), dir.path())
        .collect_ticker("MSFT", &[Dataset::Financials])
        .await;

    assert!(report.is_success());
    assert_eq!(report.sheets_written, 0);
    assert!(report.files_written.is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test(tokio::test)]
async fn test_corrupted_file_is_recreated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("AAPL_valuation_measures.xlsx");
    std::fs::write(&path, b"definitely not a zip archive").unwrap();

    let report = collector(provider_with_statement(two_year_statement()), dir.path())
        .collect_ticker("AAPL", &[Dataset::Financials])
        .await;

    assert!(report.is_success());
    assert!(Workbook::is_valid_file(&path));
    assert_eq!(Workbook::open(&path).unwrap().sheets().len(), 6);
}

#[test(tokio::test)]
async fn test_failed_interval_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    let mut provider = MockProvider::new();
    provider.expect_price_history().returning(|_, interval| match interval {
        PriceInterval::Weekly => Err(ProviderError::Status { status: 404, body: String::new() }),
        _ => Ok(test_data::price_bars()),
    });

    let report = collector(provider, dir.path()).collect_ticker("AAPL", &[Dataset::Prices]).await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].what, "Weekly prices");
    let book = Workbook::open(&dir.path().join("AAPL_valuation_measures.xlsx")).unwrap();
    assert_eq!(book.sheet_names(), vec!["Daily", "Monthly"]);
}

#[test(tokio::test)]
async fn test_transient_errors_are_retried() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut provider = MockProvider::new();
    provider.expect_dividends().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ProviderError::Status { status: 500, body: "busy".to_string() })
        } else {
            Ok(test_data::dividends())
        }
    });

    let report = collector(provider, dir.path()).collect_ticker("KO", &[Dataset::Dividends]).await;

    assert!(report.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let book = Workbook::open(&dir.path().join("KO_valuation_measures.xlsx")).unwrap();
    assert_eq!(book.sheet("Dividends").unwrap().rows.len(), 3);
}

#[test(tokio::test)]
async fn test_general_info_failure_writes_error_row() {
    let dir = tempdir().unwrap();
    let mut provider = MockProvider::new();
    provider
        .expect_general_info()
        .times(1)
        .returning(|symbol| Err(ProviderError::NoData { symbol: symbol.to_string() }));

    let report = collector(provider, dir.path()).collect_ticker("XYZ", &[Dataset::GeneralInfo]).await;

    assert_eq!(report.failures.len(), 1);
    let book = Workbook::open(&dir.path().join("XYZ_valuation_measures.xlsx")).unwrap();
    assert_eq!(
        row_keys(&book, "General information", 1),
        vec!["XYZ", "Error", "Error", "Error", "Error"]
    );
}

#[test(tokio::test)]
async fn test_missing_analyst_coverage_and_empty_trends_are_skipped() {
    let dir = tempdir().unwrap();
    let mut provider = MockProvider::new();
    provider.expect_price_targets().returning(|_| Ok(None));
    provider.expect_recommendation_trend().returning(|_| Ok(Vec::new()));
    provider.expect_earnings_trend().returning(|_| Ok(Vec::new()));

    let report = collector(provider, dir.path())
        .collect_ticker(
            "TINY",
            &[Dataset::AnalystTargets, Dataset::RecommendationTrend, Dataset::EarningsEstimate],
        )
        .await;

    assert!(report.is_success());
    assert_eq!(report.sheets_written, 0);
    assert!(!dir.path().join("TINY_valuation_measures.xlsx").exists());
    assert!(!dir.path().join("recommendation_trend_TINY.xlsx").exists());
    assert!(!dir.path().join("earnings_estimate_TINY.xlsx").exists());
}

#[test(tokio::test)]
async fn test_valuation_sheet_keeps_history_between_runs() {
    let dir = tempdir().unwrap();

    let mut first = MockProvider::new();
    first.expect_valuation_measures().returning(|_| Ok(test_data::valuation()));
    collector(first, dir.path()).collect_ticker("AAPL", &[Dataset::Valuation]).await;

    let mut second = MockProvider::new();
    second.expect_valuation_measures().returning(|_| {
        let mut measures = test_data::valuation();
        measures.columns[1] = "2024-09-30".to_string();
        measures.metrics.truncate(1);
        Ok(measures)
    });
    collector(second, dir.path()).collect_ticker("AAPL", &[Dataset::Valuation]).await;

    let book = Workbook::open(&dir.path().join("AAPL_valuation_measures.xlsx")).unwrap();
    let sheet = book.sheet("Valuation").unwrap();
    assert_eq!(row_keys(&book, "Valuation", 0), vec!["Metric", "Current", "2024-06-30", "2024-09-30"]);
    assert_eq!(sheet.cell(1, 0), &Cell::text("Market Cap"));
    assert_eq!(sheet.cell(2, 0), &Cell::text("Trailing P/E"));
    // trailing P/E was not refreshed, its old values survive
    assert_eq!(sheet.cell(2, 1), &Cell::Number(33.1));
    assert_eq!(sheet.cell(2, 3), &Cell::Empty);
}

#[test(tokio::test)]
async fn test_unchanged_valuation_is_not_rewritten() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("AAPL_valuation_measures.xlsx");
    let measures = || {
        let mut measures = test_data::valuation();
        measures.metrics[1].1 = vec![Some(33.1), None];
        measures
    };

    let mut first = MockProvider::new();
    first.expect_valuation_measures().returning(move |_| Ok(measures()));
    collector(first, dir.path()).collect_ticker("AAPL", &[Dataset::Valuation]).await;
    let stored = std::fs::read(&path).unwrap();

    let mut second = MockProvider::new();
    second.expect_valuation_measures().returning(move |_| Ok(measures()));
    let report = collector(second, dir.path()).collect_ticker("AAPL", &[Dataset::Valuation]).await;

    assert!(report.is_success());
    assert_eq!(report.sheets_written, 0);
    assert!(report.files_written.is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), stored);
}

#[test(tokio::test)]
async fn test_corrupted_file_is_rewritten_when_every_fetch_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("AAPL_valuation_measures.xlsx");
    std::fs::write(&path, b"definitely not a zip archive").unwrap();

    let mut provider = MockProvider::new();
    provider
        .expect_financial_statement()
        .returning(|symbol, _| Err(ProviderError::NoData { symbol: symbol.to_string() }));

    let report = collector(provider, dir.path()).collect_ticker("AAPL", &[Dataset::Financials]).await;

    assert_eq!(report.failures.len(), 6);
    assert!(Workbook::is_valid_file(&path));
}

#[test(tokio::test)]
async fn test_formulas_in_untouched_sheets_survive_a_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("AAPL_valuation_measures.xlsx");
    let mut book = Workbook::new();
    book.put_sheet(Sheet::with_rows(
        "Notes",
        vec![vec![Cell::Number(2.0), Cell::formula("=A1*10")]],
    ));
    book.save(&path).unwrap();

    let report = collector(provider_with_statement(two_year_statement()), dir.path())
        .collect_ticker("AAPL", &[Dataset::Financials])
        .await;

    assert!(report.is_success());
    let book = Workbook::open(&path).unwrap();
    assert_eq!(book.sheet_names()[0], "Notes");
    assert_eq!(book.sheet("Notes").unwrap().cell(0, 1), &Cell::Formula("A1*10".to_string()));
}
