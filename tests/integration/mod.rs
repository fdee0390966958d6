//! Integration tests

pub mod concurrent_fetcher;
pub mod data_collector;
