use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::series_keys::{self, VALUATION};
use super::{ApiRateLimiter, MarketDataProvider, ProviderError};
use crate::models::{
    Config, Dividend, EarningsEstimate, FinancialStatement, GeneralInfo, LineItem, PriceBar,
    PriceInterval, PriceTargets, RecommendationTrend, StatementSheet, ValuationMeasures,
};
use crate::utils::{camel_to_title, local_date};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// First period requested from the fundamentals time-series API (1985-08-23)
const SERIES_START: i64 = 493_590_046;

/// Base URLs of the Yahoo Finance services
#[derive(Debug, Clone)]
pub struct YahooEndpoints {
    pub query1: String,
    pub query2: String,
    /// Page visited once to receive the session cookie
    pub cookie: String,
}

impl Default for YahooEndpoints {
    fn default() -> Self {
        Self {
            query1: "https://query1.finance.yahoo.com".to_string(),
            query2: "https://query2.finance.yahoo.com".to_string(),
            cookie: "https://fc.yahoo.com".to_string(),
        }
    }
}

impl YahooEndpoints {
    /// Route every service to one host, e.g. a local mock server
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            query1: base.clone(),
            query2: base.clone(),
            cookie: format!("{}/", base),
        }
    }
}

/// Yahoo Finance API client
pub struct YahooClient {
    client: Client,
    endpoints: YahooEndpoints,
    rate_limiter: ApiRateLimiter,
    crumb: Mutex<Option<String>>,
    /// Dividends carried by the last daily chart of each symbol
    daily_dividends: Mutex<HashMap<String, Vec<Dividend>>>,
}

impl YahooClient {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        Self::with_endpoints(config, YahooEndpoints::default())
    }

    pub fn with_endpoints(config: &Config, endpoints: YahooEndpoints) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            endpoints,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
            crumb: Mutex::new(None),
            daily_dividends: Mutex::new(HashMap::new()),
        })
    }

    fn url(base: &str, path: &str, params: &[(&str, String)]) -> Result<Url, ProviderError> {
        Url::parse_with_params(&format!("{}{}", base, path), params)
            .map_err(|e| ProviderError::Api(format!("invalid url: {}", e)))
    }

    /// Make a rate-limited GET request and decode the JSON body
    async fn get_json(&self, url: Url) -> Result<Value, ProviderError> {
        self.rate_limiter.wait().await;
        debug!("Making request to: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let text = response.text().await?;
        debug!("API response received: {} bytes", text.len());
        Ok(serde_json::from_str(&text)?)
    }

    /// Session crumb required by the quote-summary endpoint, fetched once and cached
    async fn crumb(&self, refresh: bool) -> Result<String, ProviderError> {
        let mut cached = self.crumb.lock().await;
        if !refresh {
            if let Some(crumb) = cached.as_ref() {
                return Ok(crumb.clone());
            }
        }

        // Only the Set-Cookie header matters here, the page itself usually answers 404
        self.rate_limiter.wait().await;
        if let Err(e) = self.client.get(&self.endpoints.cookie).send().await {
            warn!("Cookie request failed: {}", e);
        }

        self.rate_limiter.wait().await;
        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.endpoints.query1))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let crumb = body.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(ProviderError::Api("received an invalid crumb".to_string()));
        }

        info!("🔑 Obtained Yahoo session crumb");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    /// Fetch quote-summary modules and return the first result object
    async fn quote_summary(&self, symbol: &str, modules: &[&str]) -> Result<Value, ProviderError> {
        let mut refreshed = false;
        loop {
            let crumb = self.crumb(refreshed).await?;
            let url = Self::url(
                &self.endpoints.query2,
                &format!("/v10/finance/quoteSummary/{}", symbol),
                &[
                    ("modules", modules.join(",")),
                    ("formatted", "false".to_string()),
                    ("crumb", crumb),
                ],
            )?;

            match self.get_json(url).await {
                Err(ProviderError::Status { status, .. })
                    if status == StatusCode::UNAUTHORIZED.as_u16() && !refreshed =>
                {
                    warn!("Crumb rejected for {}, refreshing session", symbol);
                    refreshed = true;
                }
                Err(e) => return Err(e),
                Ok(json) => {
                    return json
                        .pointer("/quoteSummary/result/0")
                        .filter(|v| v.is_object())
                        .cloned()
                        .ok_or_else(|| ProviderError::NoData { symbol: symbol.to_string() });
                }
            }
        }
    }

    async fn chart(&self, symbol: &str, interval: &str) -> Result<ChartResult, ProviderError> {
        let url = Self::url(
            &self.endpoints.query1,
            &format!("/v8/finance/chart/{}", symbol),
            &[
                ("range", "max".to_string()),
                ("interval", interval.to_string()),
                ("events", "div|split".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ],
        )?;

        let json = self.get_json(url).await?;
        let response: ChartResponse = serde_json::from_value(json)?;

        if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
            return Err(ProviderError::Api(error.to_string()));
        }

        response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ProviderError::NoData { symbol: symbol.to_string() })
    }

    /// Fetch time series by full type name, returning type -> (as-of date -> value)
    async fn timeseries(
        &self,
        symbol: &str,
        types: &[String],
    ) -> Result<HashMap<String, BTreeMap<NaiveDate, f64>>, ProviderError> {
        let url = Self::url(
            &self.endpoints.query2,
            &format!("/ws/fundamentals-timeseries/v1/finance/timeseries/{}", symbol),
            &[
                ("symbol", symbol.to_string()),
                ("type", types.join(",")),
                ("period1", SERIES_START.to_string()),
                ("period2", Utc::now().timestamp().to_string()),
            ],
        )?;

        let json = self.get_json(url).await?;
        Ok(parse_timeseries(&json))
    }
}

/// Accept both `1.5` and `{"raw": 1.5, "fmt": "1.50"}`
fn raw_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::Object(obj) => obj.get("raw").and_then(|v| v.as_f64()),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn parse_timeseries(json: &Value) -> HashMap<String, BTreeMap<NaiveDate, f64>> {
    let mut series = HashMap::new();

    let Some(results) = json.pointer("/timeseries/result").and_then(|v| v.as_array()) else {
        return series;
    };

    for result in results {
        let Some(series_type) = result.pointer("/meta/type/0").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(points) = result.get(series_type).and_then(|v| v.as_array()) else {
            continue;
        };

        let mut values = BTreeMap::new();
        for point in points.iter().filter(|p| !p.is_null()) {
            let date = point
                .get("asOfDate")
                .and_then(|v| v.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            let value = raw_number(point.get("reportedValue"));
            if let (Some(date), Some(value)) = (date, value) {
                values.insert(date, value);
            }
        }

        if !values.is_empty() {
            series.insert(series_type.to_string(), values);
        }
    }

    series
}

pub(crate) fn build_statement(
    series: &HashMap<String, BTreeMap<NaiveDate, f64>>,
    prefix: &str,
    keys: &[&str],
) -> FinancialStatement {
    let periods: Vec<NaiveDate> = keys
        .iter()
        .filter_map(|key| series.get(&format!("{}{}", prefix, key)))
        .flat_map(|values| values.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let line_items = keys
        .iter()
        .filter_map(|key| {
            let values = series.get(&format!("{}{}", prefix, key))?;
            Some(LineItem {
                name: camel_to_title(key),
                values: periods.iter().map(|date| values.get(date).copied()).collect(),
            })
        })
        .collect();

    FinancialStatement { periods, line_items }
}

pub(crate) fn build_valuation(series: &HashMap<String, BTreeMap<NaiveDate, f64>>) -> ValuationMeasures {
    let quarters: Vec<NaiveDate> = VALUATION
        .iter()
        .filter_map(|(key, _)| series.get(&format!("quarterly{}", key)))
        .flat_map(|values| values.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns = vec!["Current".to_string()];
    columns.extend(quarters.iter().map(|d| d.format("%Y-%m-%d").to_string()));

    let metrics = VALUATION
        .iter()
        .filter_map(|(key, label)| {
            let current = series
                .get(&format!("trailing{}", key))
                .and_then(|values| values.values().next_back().copied());
            let quarterly = series.get(&format!("quarterly{}", key));

            if current.is_none() && quarterly.is_none() {
                return None;
            }

            let mut values = vec![current];
            values.extend(
                quarters
                    .iter()
                    .map(|date| quarterly.and_then(|q| q.get(date).copied())),
            );
            Some((label.to_string(), values))
        })
        .collect();

    ValuationMeasures { columns, metrics }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    async fn financial_statement(
        &self,
        symbol: &str,
        sheet: StatementSheet,
    ) -> Result<FinancialStatement, ProviderError> {
        let prefix = sheet.frequency.series_prefix();
        let keys = series_keys::statement_keys(sheet.kind);
        let types: Vec<String> = keys.iter().map(|k| format!("{}{}", prefix, k)).collect();

        let series = self.timeseries(symbol, &types).await?;
        let statement = build_statement(&series, prefix, keys);
        debug!(
            "Retrieved {} line items over {} periods for {} ({})",
            statement.line_items.len(),
            statement.periods.len(),
            symbol,
            sheet.sheet_name()
        );
        Ok(statement)
    }

    async fn price_history(
        &self,
        symbol: &str,
        interval: PriceInterval,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let chart = self.chart(symbol, interval.code()).await?;
        let bars = chart.price_bars();
        if matches!(interval, PriceInterval::Daily) {
            self.daily_dividends
                .lock()
                .await
                .insert(symbol.to_string(), chart.dividends());
        }
        debug!("Retrieved {} {} bars for {}", bars.len(), interval.code(), symbol);
        Ok(bars)
    }

    async fn dividends(&self, symbol: &str) -> Result<Vec<Dividend>, ProviderError> {
        if let Some(dividends) = self.daily_dividends.lock().await.remove(symbol) {
            debug!("Reusing {} dividends from the daily chart of {}", dividends.len(), symbol);
            return Ok(dividends);
        }
        let chart = self.chart(symbol, PriceInterval::Daily.code()).await?;
        Ok(chart.dividends())
    }

    async fn valuation_measures(&self, symbol: &str) -> Result<ValuationMeasures, ProviderError> {
        let types: Vec<String> = VALUATION
            .iter()
            .flat_map(|(key, _)| [format!("quarterly{}", key), format!("trailing{}", key)])
            .collect();

        let series = self.timeseries(symbol, &types).await?;
        Ok(build_valuation(&series))
    }

    async fn price_targets(&self, symbol: &str) -> Result<Option<PriceTargets>, ProviderError> {
        let summary = self.quote_summary(symbol, &["financialData"]).await?;
        let Some(fd) = summary.get("financialData").filter(|v| v.is_object()) else {
            return Ok(None);
        };

        Ok(Some(PriceTargets {
            current_price: raw_number(fd.get("currentPrice")),
            target_high_price: raw_number(fd.get("targetHighPrice")),
            target_low_price: raw_number(fd.get("targetLowPrice")),
            target_mean_price: raw_number(fd.get("targetMeanPrice")),
            number_of_analyst_opinions: raw_number(fd.get("numberOfAnalystOpinions")),
            recommendation_key: text(fd.get("recommendationKey")),
            recommendation_mean: raw_number(fd.get("recommendationMean")),
        }))
    }

    async fn general_info(&self, symbol: &str) -> Result<GeneralInfo, ProviderError> {
        let summary = self.quote_summary(symbol, &["assetProfile", "price"]).await?;
        let profile = summary.get("assetProfile");
        let price = summary.get("price");

        Ok(GeneralInfo {
            ticker: symbol.to_string(),
            trading_currency: text(price.and_then(|p| p.get("currency"))),
            sector: text(profile.and_then(|p| p.get("sector"))),
            industry: text(profile.and_then(|p| p.get("industry"))),
            full_time_employees: raw_number(profile.and_then(|p| p.get("fullTimeEmployees"))),
        })
    }

    async fn recommendation_trend(
        &self,
        symbol: &str,
    ) -> Result<Vec<RecommendationTrend>, ProviderError> {
        let summary = self.quote_summary(symbol, &["recommendationTrend"]).await?;
        let trend = summary
            .pointer("/recommendationTrend/trend")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(trend
            .iter()
            .filter_map(|item| {
                Some(RecommendationTrend {
                    period: text(item.get("period"))?,
                    strong_buy: raw_number(item.get("strongBuy")),
                    buy: raw_number(item.get("buy")),
                    hold: raw_number(item.get("hold")),
                    sell: raw_number(item.get("sell")),
                    strong_sell: raw_number(item.get("strongSell")),
                })
            })
            .collect())
    }

    async fn earnings_trend(&self, symbol: &str) -> Result<Vec<EarningsEstimate>, ProviderError> {
        let summary = self.quote_summary(symbol, &["earningsTrend"]).await?;
        let trend = summary
            .pointer("/earningsTrend/trend")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(trend
            .iter()
            .filter_map(|item| {
                let earnings = item.get("earningsEstimate");
                let revenue = item.get("revenueEstimate");
                Some(EarningsEstimate {
                    period: text(item.get("period"))?,
                    growth: raw_number(item.get("growth")),
                    earnings_avg: raw_number(earnings.and_then(|e| e.get("avg"))),
                    earnings_low: raw_number(earnings.and_then(|e| e.get("low"))),
                    earnings_high: raw_number(earnings.and_then(|e| e.get("high"))),
                    revenue_avg: raw_number(revenue.and_then(|r| r.get("avg"))),
                    revenue_low: raw_number(revenue.and_then(|r| r.get("low"))),
                    revenue_high: raw_number(revenue.and_then(|r| r.get("high"))),
                })
            })
            .collect())
    }
}

// chart endpoint payload
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    events: Option<ChartEvents>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
    #[serde(default)]
    adjclose: Vec<AdjCloseIndicator>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseIndicator {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

impl ChartResult {
    fn price_bars(&self) -> Vec<PriceBar> {
        let empty = QuoteIndicator::default();
        let quote = self.indicators.quote.first().unwrap_or(&empty);
        let adjclose = self.indicators.adjclose.first().map(|a| a.adjclose.as_slice());

        let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let date = local_date(ts, self.meta.gmtoffset)?;
                let bar = PriceBar {
                    date,
                    open: at(&quote.open, i),
                    high: at(&quote.high, i),
                    low: at(&quote.low, i),
                    close: at(&quote.close, i),
                    adj_close: adjclose.and_then(|a| at(a, i)),
                    volume: at(&quote.volume, i).map(|v| v as i64),
                };
                let has_prices = bar.open.is_some()
                    || bar.high.is_some()
                    || bar.low.is_some()
                    || bar.close.is_some();
                has_prices.then_some(bar)
            })
            .collect()
    }

    fn dividends(&self) -> Vec<Dividend> {
        let mut dividends: Vec<Dividend> = self
            .events
            .as_ref()
            .map(|events| {
                events
                    .dividends
                    .values()
                    .filter_map(|d| {
                        Some(Dividend {
                            date: local_date(d.date, self.meta.gmtoffset)?,
                            amount: d.amount,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        dividends.sort_by_key(|d| d.date);
        dividends
    }
}
