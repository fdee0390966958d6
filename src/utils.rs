use chrono::{DateTime, Datelike, Months, NaiveDate};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that can tell whether repeating the operation might help
pub trait Retryable {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Fixed-delay retry policy for provider calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(3000),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
    pub async fn run<T, E, F, Fut>(&self, description: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && e.is_retryable() => {
                    warn!("⚠️ {} failed (try {}/{}): {}", description, attempt, self.attempts, e);
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Resolve a relative recommendation period ("0m", "-1m", ...) to the first day of that month.
///
/// Periods that are not month offsets ("0q", "+1y") are returned unchanged.
pub fn parse_period(period: &str, today: NaiveDate) -> String {
    let offset = period
        .trim()
        .strip_suffix('m')
        .and_then(|n| n.parse::<i32>().ok());

    let Some(offset) = offset else {
        return period.to_string();
    };

    let first_of_month = today.with_day(1).unwrap_or(today);
    let shifted = if offset >= 0 {
        first_of_month.checked_add_months(Months::new(offset as u32))
    } else {
        first_of_month.checked_sub_months(Months::new(offset.unsigned_abs()))
    };

    match shifted {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => period.to_string(),
    }
}

/// Calendar date of a unix timestamp in the exchange's local time
pub fn local_date(timestamp: i64, gmt_offset_secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmt_offset_secs, 0).map(|dt| dt.date_naive())
}

/// "TotalRevenue" -> "Total Revenue", "EBITDA" stays whole, "NormalizedEBITDA" -> "Normalized EBITDA"
pub fn camel_to_title(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push(' ');
            }
        }
        if i == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }

    out
}
