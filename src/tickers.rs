//! Ticker list loading

use calamine::{Data, Reader};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::workbook::Cell;

pub const TICKER_COLUMN: &str = "Ticker";

#[derive(Debug, thiserror::Error)]
pub enum TickerListError {
    #[error("failed to read ticker spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("failed to read ticker csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("{path} has no worksheet")]
    NoSheet { path: PathBuf },

    #[error("{path} has no '{}' column", TICKER_COLUMN)]
    MissingColumn { path: PathBuf },
}

/// Read the `Ticker` column of a CSV or spreadsheet file
pub fn read_tickers(path: &Path) -> Result<Vec<String>, TickerListError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"));

    let raw = if is_csv {
        read_csv_column(path)?
    } else {
        read_sheet_column(path)?
    };

    let tickers = normalize(raw);
    info!("📋 Loaded {} tickers from {}", tickers.len(), path.display());
    Ok(tickers)
}

fn read_csv_column(path: &Path) -> Result<Vec<String>, TickerListError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == TICKER_COLUMN)
        .ok_or_else(|| TickerListError::MissingColumn { path: path.to_path_buf() })?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}

fn read_sheet_column(path: &Path) -> Result<Vec<String>, TickerListError> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TickerListError::NoSheet { path: path.to_path_buf() })??;

    let mut rows = range.rows();
    let column = rows
        .next()
        .and_then(|header| {
            header
                .iter()
                .position(|c| matches!(c, Data::String(s) if s.trim() == TICKER_COLUMN))
        })
        .ok_or_else(|| TickerListError::MissingColumn { path: path.to_path_buf() })?;

    Ok(rows
        .filter_map(|row| row.get(column))
        .map(|data| Cell::from(data).key())
        .collect())
}

fn normalize(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| {
            let fresh = seen.insert(t.clone());
            if !fresh {
                debug!("Skipping duplicate ticker {}", t);
            }
            fresh
        })
        .collect()
}
