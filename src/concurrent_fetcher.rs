//! Concurrent ticker processing
//!
//! Runs the data collector over a ticker list with a bounded number of
//! tickers in flight. Each ticker is handled by exactly one task, so a
//! ticker's files are never written concurrently.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::data_collector::{DataCollector, Dataset, TickerReport};

/// Result of a concurrent collection run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub total_tickers: usize,
    /// Tickers with every dataset collected
    pub succeeded: usize,
    /// Tickers where some datasets failed but something was written
    pub partial: usize,
    /// Tickers where nothing could be written
    pub failed: usize,
    pub sheets_written: usize,
}

impl FetchResult {
    fn record(&mut self, report: &TickerReport) {
        self.sheets_written += report.sheets_written;
        if report.is_success() {
            self.succeeded += 1;
        } else if report.sheets_written > 0 {
            self.partial += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Collect `datasets` for every ticker, at most `concurrency` at a time
pub async fn fetch_tickers_concurrently(
    collector: Arc<DataCollector>,
    tickers: Vec<String>,
    datasets: &[Dataset],
    concurrency: usize,
) -> Result<FetchResult> {
    let concurrency = concurrency.max(1);
    let total = tickers.len();

    std::fs::create_dir_all(collector.output_dir()).with_context(|| {
        format!("failed to create output directory {}", collector.output_dir().display())
    })?;

    let labels: Vec<&str> = datasets.iter().map(|d| d.label()).collect();
    info!("🚀 Processing {} tickers ({} at a time)", total, concurrency);
    info!("📦 Datasets: {}", labels.join(", "));

    let mut result = FetchResult {
        total_tickers: total,
        ..Default::default()
    };

    let mut reports = stream::iter(tickers)
        .map(|ticker| {
            let collector = Arc::clone(&collector);
            async move { collector.collect_ticker(&ticker, datasets).await }
        })
        .buffer_unordered(concurrency);

    let mut processed = 0;
    while let Some(report) = reports.next().await {
        processed += 1;
        if report.is_success() {
            info!("✅ {}/{}: {} - {} sheet(s) written", processed, total, report.ticker, report.sheets_written);
        } else if report.sheets_written > 0 {
            warn!(
                "⚠️ {}/{}: {} - {} sheet(s) written, {} failure(s)",
                processed,
                total,
                report.ticker,
                report.sheets_written,
                report.failures.len()
            );
        } else {
            error!("❌ {}/{}: {} - nothing written", processed, total, report.ticker);
        }
        result.record(&report);
    }

    info!("✅ Run completed");
    info!(
        "📊 Results: {} succeeded, {} partial, {} failed, {} sheets written",
        result.succeeded, result.partial, result.failed, result.sheets_written
    );

    Ok(result)
}
