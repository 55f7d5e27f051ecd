#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/snapshot/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance statement provider.
//!
//! This crate provides a Yahoo Finance provider that implements the
//! [`DataProvider`] and [`StatementProvider`] traits from `snapshot-core`.
//!
//! # Features
//!
//! - Annual income statement, balance sheet and cash-flow statement from the
//!   fundamentals time-series API
//! - Company name, sector, market cap, ROE and price-to-book from the quote
//!   summary API
//! - Built-in rate limiting (1 request per second by default)
//!
//! # Example
//!
//! ```no_run
//! use snapshot_yahoo::YahooProvider;
//! use snapshot_core::{StatementProvider, Symbol};
//!
//! # async fn example() -> snapshot_core::FetchResult<()> {
//! let provider = YahooProvider::new();
//! let statements = provider.fetch_statements(&Symbol::new("AAPL")).await?;
//! println!("{} income periods", statements.income.periods().len());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Months, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snapshot_core::{
    CompanyInfo, DataProvider, FetchError, FetchResult, StatementProvider, StatementSet,
    StatementTable, Symbol,
};
use tokio::time::sleep;
use tracing::debug;

/// Yahoo Finance fundamentals time-series API base URL.
const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Quote summary modules carrying the company facts.
const QUOTE_SUMMARY_MODULES: &str = "price,assetProfile,financialData,defaultKeyStatistics";

/// Prefix Yahoo puts on annual series keys.
const ANNUAL_PREFIX: &str = "annual";

/// How far back to request annual statements.
const HISTORY_YEARS: u32 = 10;

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Provider name used in errors and logs.
const PROVIDER_NAME: &str = "Yahoo Finance";

/// Income statement series.
const INCOME_KEYS: &[&str] = &[
    "TotalRevenue",
    "OperatingIncome",
    "EBIT",
    "EBITDA",
    "NetIncome",
];

/// Balance sheet series.
const BALANCE_SHEET_KEYS: &[&str] = &["TotalAssets", "CashAndCashEquivalents", "TotalDebt"];

/// Cash-flow statement series.
const CASH_FLOW_KEYS: &[&str] = &[
    "OperatingCashFlow",
    "InvestingCashFlow",
    "Depreciation",
    "DepreciationAndAmortization",
    "FreeCashFlow",
];

/// Yahoo Finance statement provider.
///
/// Implements [`DataProvider`] and [`StatementProvider`].
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    ///
    /// Uses the provided client for all HTTP requests. Rate limiting
    /// is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rate_limit_ms: rate_limit.as_millis() as u64,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = now_millis();
        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(now_millis(), Ordering::Relaxed);
    }

    /// Build the time-series URL requesting every annual series we read.
    fn build_timeseries_url(&self, symbol: &Symbol, end: NaiveDate) -> String {
        let start = end
            .checked_sub_months(Months::new(12 * HISTORY_YEARS))
            .unwrap_or(end);

        let types = INCOME_KEYS
            .iter()
            .chain(BALANCE_SHEET_KEYS)
            .chain(CASH_FLOW_KEYS)
            .map(|key| format!("{ANNUAL_PREFIX}{key}"))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}/{}?symbol={}&type={}&period1={}&period2={}",
            TIMESERIES_URL,
            symbol.as_str(),
            symbol.as_str(),
            types,
            unix_seconds(start),
            unix_seconds(end)
        )
    }

    /// Build the quote summary URL for a symbol.
    fn build_quote_summary_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/{}?modules={}",
            QUOTE_SUMMARY_URL,
            symbol.as_str(),
            QUOTE_SUMMARY_MODULES
        )
    }

    /// Make a rate-limited GET request and parse the JSON response.
    async fn get_json<T: DeserializeOwned>(&self, symbol: &Symbol, url: &str) -> FetchResult<T> {
        self.apply_rate_limit().await;
        debug!("Yahoo request: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after: Some(Duration::from_secs(60)),
            });
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound(symbol.to_string()));
        }

        if !response.status().is_success() {
            return Err(FetchError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Yahoo Finance provider for annual financial statements and company facts"
    }
}

#[async_trait]
impl StatementProvider for YahooProvider {
    async fn fetch_statements(&self, symbol: &Symbol) -> FetchResult<StatementSet> {
        if symbol.is_empty() {
            return Err(FetchError::InvalidParameter(
                "Ticker symbol must not be empty".to_string(),
            ));
        }

        let summary: QuoteSummaryResponse = self
            .get_json(symbol, &self.build_quote_summary_url(symbol))
            .await?;
        let info = parse_company_info(symbol, summary)?;

        let url = self.build_timeseries_url(symbol, Utc::now().date_naive());
        let timeseries: TimeseriesResponse = self.get_json(symbol, &url).await?;
        let series = parse_timeseries(symbol, timeseries)?;

        let statements = StatementSet {
            info,
            income: series.statement(INCOME_KEYS)?,
            balance_sheet: series.statement(BALANCE_SHEET_KEYS)?,
            cash_flow: series.statement(CASH_FLOW_KEYS)?,
        };

        debug!(
            symbol = %symbol,
            periods = statements.income.periods().len(),
            "Fetched statements"
        );
        Ok(statements)
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
        .unwrap_or(0)
}

/// Turns a Yahoo series key into a statement row label.
///
/// Words are split at case changes and acronyms stay whole:
/// `TotalRevenue` becomes `Total Revenue`, `EBITDA` stays `EBITDA`.
fn row_label(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut label = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || (prev.is_uppercase() && next_is_lower) {
                label.push(' ');
            }
        }
        label.push(c);
    }

    label
}

/// Extracts company facts from a quote summary response.
fn parse_company_info(symbol: &Symbol, response: QuoteSummaryResponse) -> FetchResult<CompanyInfo> {
    if let Some(error) = response.quote_summary.error {
        if error.code == "Not Found" {
            return Err(FetchError::SymbolNotFound(symbol.to_string()));
        }
        return Err(FetchError::Provider(format!(
            "{}: {}",
            error.code, error.description
        )));
    }

    let data = response
        .quote_summary
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::SymbolNotFound(symbol.to_string()))?;

    let price = data.price.unwrap_or_default();
    let profile = data.asset_profile.unwrap_or_default();

    Ok(CompanyInfo {
        name: price.long_name,
        sector: profile.sector,
        market_cap: price.market_cap.and_then(|v| v.raw).map(|v| v as i64),
        roe: data
            .financial_data
            .and_then(|f| f.return_on_equity)
            .and_then(|v| v.raw),
        pbr: data
            .default_key_statistics
            .and_then(|s| s.price_to_book)
            .and_then(|v| v.raw),
    })
}

/// Annual series keyed by label without the `annual` prefix.
#[derive(Debug, Default)]
struct AnnualSeries {
    points: HashMap<String, Vec<(NaiveDate, Option<f64>)>>,
}

impl AnnualSeries {
    /// Assembles one statement table from the given series keys.
    ///
    /// The table covers every period any of the keys reports; keys without
    /// data are left out so that row presence reflects what Yahoo returned.
    fn statement(&self, keys: &[&str]) -> FetchResult<StatementTable> {
        let present: Vec<(&str, &Vec<(NaiveDate, Option<f64>)>)> = keys
            .iter()
            .filter_map(|&key| self.points.get(key).map(|points| (key, points)))
            .collect();

        let periods: Vec<NaiveDate> = present
            .iter()
            .flat_map(|(_, points)| points.iter().map(|(date, _)| *date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .rev()
            .collect();

        let rows = present.into_iter().map(|(key, points)| {
            let values = periods
                .iter()
                .map(|period| {
                    points
                        .iter()
                        .find(|(date, _)| date == period)
                        .and_then(|(_, value)| *value)
                })
                .collect::<Vec<_>>();
            (row_label(key), values)
        });

        StatementTable::from_rows(periods.clone(), rows)
    }
}

/// Collects the annual series of a time-series response.
fn parse_timeseries(symbol: &Symbol, response: TimeseriesResponse) -> FetchResult<AnnualSeries> {
    if let Some(error) = response.timeseries.error {
        return Err(FetchError::Provider(format!(
            "{}: {}",
            error.code, error.description
        )));
    }

    let mut series = AnnualSeries::default();
    for result in response.timeseries.result.unwrap_or_default() {
        for (key, points) in result.series {
            let Some(name) = key.strip_prefix(ANNUAL_PREFIX) else {
                continue;
            };

            let parsed: Vec<(NaiveDate, Option<f64>)> = points
                .into_iter()
                .flatten()
                .filter_map(|point| {
                    let value = point.reported_value.and_then(|v| v.raw);
                    point.as_of_date.map(|date| (date, value))
                })
                .collect();

            if !parsed.is_empty() {
                series.points.insert(name.to_string(), parsed);
            }
        }
    }

    debug!(symbol = %symbol, series = series.points.len(), "Parsed annual series");
    Ok(series)
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

/// A `{"raw": .., "fmt": ..}` value; Yahoo sends `{}` when it has nothing.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

/// Time-series API response.
#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    timeseries: TimeseriesResult,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResult {
    result: Option<Vec<TimeseriesData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesData {
    #[allow(dead_code)]
    meta: Option<serde_json::Value>,
    #[allow(dead_code)]
    timestamp: Option<Vec<i64>>,
    #[serde(flatten)]
    series: HashMap<String, Vec<Option<TimeseriesPoint>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesPoint {
    as_of_date: Option<NaiveDate>,
    reported_value: Option<RawValue>,
}

/// Quote Summary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<QuoteSummaryData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryData {
    price: Option<PriceModule>,
    asset_profile: Option<AssetProfile>,
    financial_data: Option<FinancialDataModule>,
    default_key_statistics: Option<KeyStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    long_name: Option<String>,
    market_cap: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    return_on_equity: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    price_to_book: Option<RawValue>,
}
