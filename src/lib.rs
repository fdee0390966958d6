pub mod api;
pub mod concurrent_fetcher;
pub mod data_collector;
pub mod models;
pub mod tickers;
pub mod utils;
pub mod workbook;
