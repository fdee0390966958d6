//! Ticker list parsing

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use test_log::test;

use valuation_sheets::tickers::{read_tickers, TickerListError};
use valuation_sheets::workbook::{Cell, Sheet, Workbook};

#[test]
fn test_only_first_worksheet_is_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tickers.xlsx");

    let mut book = Workbook::new();
    book.put_sheet(Sheet::with_rows(
        "Watchlist",
        vec![
            vec![Cell::text("Company"), Cell::text("Ticker")],
            vec![Cell::text("Apple"), Cell::text("AAPL")],
            vec![Cell::text("Alphabet"), Cell::text(" GOOGL ")],
        ],
    ));
    book.put_sheet(Sheet::with_rows(
        "Archive",
        vec![vec![Cell::text("Ticker")], vec![Cell::text("TWTR")]],
    ));
    book.save(&path).unwrap();

    assert_eq!(read_tickers(&path).unwrap(), vec!["AAPL", "GOOGL"]);
}

#[test]
fn test_missing_ticker_header_in_spreadsheet() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("symbols.xlsx");

    let mut book = Workbook::new();
    book.put_sheet(Sheet::with_rows("Sheet1", vec![vec![Cell::text("Symbol")], vec![Cell::text("AAPL")]]));
    book.save(&path).unwrap();

    assert_matches!(read_tickers(&path), Err(TickerListError::MissingColumn { .. }));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(read_tickers(&dir.path().join("absent.xlsx")).is_err());
    assert!(read_tickers(&dir.path().join("absent.csv")).is_err());
}

#[test]
fn test_header_only_csv_yields_no_tickers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "Ticker\n").unwrap();

    assert!(read_tickers(&path).unwrap().is_empty());
}
