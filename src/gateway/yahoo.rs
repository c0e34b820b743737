//! Yahoo Finance gateway.
//!
//! Uses the unauthenticated JSON endpoints:
//! - `/v8/finance/chart/{symbol}` for daily closes
//! - `/v7/finance/options/{symbol}` for option chains
//!
//! The chain is taken from the nearest listed expiry at least
//! `min_days_to_expiry` days out, requested with `?date=` when Yahoo's
//! default expiry is closer than that.
//!
//! The risk-free rate is the 13-week T-bill yield (`^IRX`), cached for
//! [`RATE_TTL`].

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::MarketDataGateway;
use crate::VolscanError;
use crate::error::ScreenError;
use crate::models::{OptionChain, OptionContract, OptionType, PricePoint, decimal_to_f64};

const USER_AGENT: &str = concat!("volscan/", env!("CARGO_PKG_VERSION"));

/// Yield symbol used for the risk-free rate.
const RATE_SYMBOL: &str = "^IRX";

/// How long a fetched risk-free rate is reused.
pub const RATE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default for [`YahooGateway::with_min_days_to_expiry`].
pub const DEFAULT_MIN_DAYS_TO_EXPIRY: u32 = 7;

// ── Yahoo response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct YahooError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<Decimal>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsResponse {
    option_chain: OptionsBody,
}

#[derive(Debug, Deserialize)]
struct OptionsBody {
    #[serde(default)]
    result: Option<Vec<OptionsResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsResult {
    quote: OptionsQuote,
    /// Every listed expiry, as 00:00 UTC timestamps.
    #[serde(default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<OptionsExpiry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsQuote {
    #[serde(default)]
    regular_market_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsExpiry {
    #[serde(default)]
    expiration_date: Option<i64>,
    #[serde(default)]
    calls: Vec<YahooContract>,
    #[serde(default)]
    puts: Vec<YahooContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooContract {
    strike: Decimal,
    expiration: i64,
    #[serde(default)]
    last_price: Option<Decimal>,
    #[serde(default)]
    bid: Option<Decimal>,
    #[serde(default)]
    ask: Option<Decimal>,
}

// ── Implementation ────────────────────────────────────────────────────

/// Live gateway backed by Yahoo Finance.
#[derive(Debug)]
pub struct YahooGateway {
    client: reqwest::Client,
    base_url: String,
    fallback_rate: f64,
    min_days_to_expiry: u32,
    cached_rate: Mutex<Option<(Instant, f64)>>,
}

impl YahooGateway {
    /// Builds a gateway against `base_url` (no trailing slash needed).
    ///
    /// `fallback_rate` is returned whenever the yield lookup fails.
    ///
    /// # Errors
    ///
    /// Returns [`VolscanError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        fallback_rate: f64,
        request_timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_rate,
            min_days_to_expiry: DEFAULT_MIN_DAYS_TO_EXPIRY,
            cached_rate: Mutex::new(None),
        })
    }

    /// Skips expiries closer than `days` when picking a chain.
    #[must_use]
    pub fn with_min_days_to_expiry(mut self, days: u32) -> Self {
        self.min_days_to_expiry = days;
        self
    }

    /// `{base_url}/{path...}/{symbol}` with every segment percent-encoded.
    fn endpoint(&self, path: &[&str], symbol: &str) -> crate::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            VolscanError::Config(format!("invalid Yahoo base URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                VolscanError::Config(format!("Yahoo base URL {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(path)
            .push(symbol);
        // Index tickers start with '^', which path encoding leaves alone.
        let path = url.path().replace('^', "%5E");
        url.set_path(&path);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        query: &[(&str, String)],
    ) -> crate::Result<T> {
        debug!(url = %url, "Requesting Yahoo endpoint");
        let resp = self.client.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VolscanError::HttpStatus {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_options(
        &self,
        symbol: &str,
        date: Option<i64>,
    ) -> crate::Result<OptionsResponse> {
        let url = self.endpoint(&["v7", "finance", "options"], symbol)?;
        let query: Vec<(&str, String)> =
            date.map(|d| ("date", d.to_string())).into_iter().collect();
        self.get_json(url, &query).await
    }

    async fn fetch_closes(
        &self,
        symbol: &str,
        calendar_days: i64,
    ) -> crate::Result<Vec<PricePoint>> {
        let now = Utc::now();
        let start = now - chrono::Duration::days(calendar_days);
        let url = self.endpoint(&["v8", "finance", "chart"], symbol)?;
        let query = [
            ("period1", start.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
            ("interval", "1d".to_string()),
        ];
        let response: ChartResponse = self.get_json(url, &query).await?;
        parse_chart(response).map_err(VolscanError::Io)
    }

    fn cached_rate(&self) -> Option<f64> {
        let guard = self.cached_rate.lock().unwrap_or_else(PoisonError::into_inner);
        guard.and_then(|(at, rate)| (at.elapsed() < RATE_TTL).then_some(rate))
    }

    fn store_rate(&self, rate: f64) {
        let mut guard = self.cached_rate.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some((Instant::now(), rate));
    }
}

impl MarketDataGateway for YahooGateway {
    async fn price_history(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<PricePoint>, ScreenError> {
        // Trading days to calendar days, with slack for holidays.
        let calendar_days = (lookback as i64 * 7) / 5 + 10;
        let points = self
            .fetch_closes(symbol, calendar_days)
            .await
            .map_err(|e| ScreenError::data_unavailable(symbol, e.to_string()))?;
        debug!(symbol, closes = points.len(), "Fetched price history");
        Ok(points)
    }

    async fn option_chain(&self, symbol: &str) -> Result<OptionChain, ScreenError> {
        let unavailable = |e: VolscanError| ScreenError::data_unavailable(symbol, e.to_string());
        let first = self.fetch_options(symbol, None).await.map_err(unavailable)?;

        let (listed, served) = first.expiries();
        let wanted = select_expiry(&listed, Utc::now(), self.min_days_to_expiry);
        let response = match wanted {
            Some(date) if Some(date) != served => {
                debug!(symbol, date, "Requesting later expiry");
                self.fetch_options(symbol, Some(date))
                    .await
                    .map_err(unavailable)?
            }
            _ => first,
        };
        let chain = parse_options(symbol, response)
            .map_err(|reason| ScreenError::data_unavailable(symbol, reason))?;
        debug!(
            symbol,
            contracts = chain.contracts.len(),
            "Fetched option chain"
        );
        Ok(chain)
    }

    async fn risk_free_rate(&self) -> f64 {
        if let Some(rate) = self.cached_rate() {
            return rate;
        }
        let latest = self
            .fetch_closes(RATE_SYMBOL, 10)
            .await
            .and_then(|points| {
                points
                    .last()
                    .map(|p| decimal_to_f64(p.close) / 100.0)
                    .filter(|r| r.is_finite())
                    .ok_or_else(|| VolscanError::Io("no recent yield close".to_string()))
            });
        match latest {
            Ok(rate) => {
                debug!(rate, "Fetched risk-free rate");
                self.store_rate(rate);
                rate
            }
            Err(e) => {
                warn!(fallback = self.fallback_rate, "Risk-free rate unavailable: {e}");
                self.fallback_rate
            }
        }
    }
}

impl OptionsResponse {
    /// Listed expiries and the expiry whose contracts this response holds.
    fn expiries(&self) -> (Vec<i64>, Option<i64>) {
        let Some(result) = self.option_chain.result.as_ref().and_then(|r| r.first()) else {
            return (Vec::new(), None);
        };
        let served = result.options.first().and_then(|o| o.expiration_date);
        (result.expiration_dates.clone(), served)
    }
}

/// Nearest expiry whose close is at least `min_days` after `now`, else the
/// furthest listed one.
fn select_expiry(listed: &[i64], now: DateTime<Utc>, min_days: u32) -> Option<i64> {
    let horizon = now + chrono::Duration::days(i64::from(min_days));
    listed
        .iter()
        .copied()
        .filter(|&date| expiry_close(date).is_some_and(|close| close >= horizon))
        .min()
        .or_else(|| listed.iter().copied().max())
}

/// Yahoo stamps expiries at 00:00 UTC; contracts stop trading at the 16:00
/// New York close, 20:00 UTC under daylight time and 21:00 UTC otherwise.
fn expiry_close(timestamp: i64) -> Option<DateTime<Utc>> {
    let date = DateTime::from_timestamp(timestamp, 0)?.date_naive();
    let hour = if new_york_daylight_time(date) { 20 } else { 21 };
    Some(date.and_hms_opt(hour, 0, 0)?.and_utc())
}

/// US daylight time runs from the second Sunday in March to the first
/// Sunday in November.
fn new_york_daylight_time(date: NaiveDate) -> bool {
    let year = date.year();
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2);
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1);
    match (start, end) {
        (Some(start), Some(end)) => date >= start && date < end,
        _ => false,
    }
}

fn describe(error: Option<YahooError>) -> String {
    match error {
        Some(e) => format!("{}: {}", e.code, e.description),
        None => "empty result".to_string(),
    }
}

/// Pairs timestamps with closes, skipping days Yahoo reports as `null`.
fn parse_chart(response: ChartResponse) -> Result<Vec<PricePoint>, String> {
    let body = response.chart;
    let Some(result) = body.result.and_then(|r| r.into_iter().next()) else {
        return Err(describe(body.error));
    };
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let points = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            let timestamp = DateTime::from_timestamp(ts, 0)?;
            Some(PricePoint::new(timestamp, close?))
        })
        .collect();
    Ok(points)
}

fn parse_options(symbol: &str, response: OptionsResponse) -> Result<OptionChain, String> {
    let body = response.option_chain;
    let Some(result) = body.result.and_then(|r| r.into_iter().next()) else {
        return Err(describe(body.error));
    };
    let underlying_price = result
        .quote
        .regular_market_price
        .ok_or_else(|| "quote has no regular market price".to_string())?;

    let mut contracts = Vec::new();
    if let Some(expiry) = result.options.into_iter().next() {
        let calls = expiry.calls.into_iter().map(|c| (OptionType::Call, c));
        let puts = expiry.puts.into_iter().map(|c| (OptionType::Put, c));
        contracts.extend(calls.chain(puts).filter_map(|(option_type, c)| {
            let expiry = expiry_close(c.expiration)?;
            Some(OptionContract {
                strike: c.strike,
                expiry,
                option_type,
                last_price: c.last_price.unwrap_or(Decimal::ZERO),
                bid: c.bid,
                ask: c.ask,
            })
        }));
    }

    Ok(OptionChain {
        symbol: symbol.to_string(),
        underlying_price,
        contracts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "symbol": "AAPL" },
                "timestamp": [1717421400, 1717507800, 1717594200],
                "indicators": { "quote": [{ "close": [194.03, null, 195.87] }] }
            }],
            "error": null
        }
    }"#;

    const OPTIONS: &str = r#"{
        "optionChain": {
            "result": [{
                "underlyingSymbol": "AAPL",
                "quote": { "regularMarketPrice": 195.87 },
                "options": [{
                    "expirationDate": 1718323200,
                    "calls": [{ "strike": 195.0, "lastPrice": 3.1, "bid": 3.0, "ask": 3.2, "expiration": 1718323200 }],
                    "puts": [{ "strike": 195.0, "lastPrice": 2.4, "expiration": 1718323200 }]
                }]
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parse_chart_skips_null_closes() {
        let response: ChartResponse = serde_json::from_str(CHART).unwrap();
        let points = parse_chart(response).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, dec!(194.03));
        assert_eq!(points[1].close, dec!(195.87));
        assert_eq!(points[1].timestamp.timestamp(), 1717594200);
    }

    #[test]
    fn parse_chart_surfaces_yahoo_error() {
        let json = r#"{ "chart": { "result": null, "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" } } }"#;
        let response: ChartResponse = serde_json::from_str(json).unwrap();
        let err = parse_chart(response).unwrap_err();
        assert!(err.contains("delisted"));
    }

    #[test]
    fn parse_options_builds_calls_and_puts() {
        let response: OptionsResponse = serde_json::from_str(OPTIONS).unwrap();
        let chain = parse_options("AAPL", response).unwrap();
        assert_eq!(chain.underlying_price, dec!(195.87));
        assert_eq!(chain.contracts.len(), 2);

        let call = &chain.contracts[0];
        assert_eq!(call.option_type, OptionType::Call);
        assert_eq!(call.market_price(), dec!(3.1));
        assert_eq!(call.expiry.timestamp(), 1718323200 + 20 * 3600);

        let put = &chain.contracts[1];
        assert_eq!(put.option_type, OptionType::Put);
        assert_eq!(put.market_price(), dec!(2.4));
    }

    #[test]
    fn parse_options_without_expiries_is_empty_chain() {
        let json = r#"{ "optionChain": { "result": [{ "quote": { "regularMarketPrice": 10.5 }, "options": [] }], "error": null } }"#;
        let response: OptionsResponse = serde_json::from_str(json).unwrap();
        let chain = parse_options("XYZ", response).unwrap();
        assert!(chain.contracts.is_empty());
    }

    #[test]
    fn endpoint_encodes_every_reserved_character() {
        let gateway = YahooGateway::new("http://yahoo.test/", 0.01, Duration::from_secs(1)).unwrap();
        let chart = ["v8", "finance", "chart"];

        let url = gateway.endpoint(&chart, "^IRX").unwrap();
        assert_eq!(url.as_str(), "http://yahoo.test/v8/finance/chart/%5EIRX");

        let url = gateway.endpoint(&chart, "BRK/B").unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/BRK%2FB");

        let url = gateway.endpoint(&chart, "A B?#%").unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/A%20B%3F%23%25");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn expiry_close_follows_new_york_daylight_time() {
        // 2024-06-14 and 2024-01-19, both stamped 00:00 UTC.
        assert_eq!(expiry_close(1718323200).unwrap().timestamp(), 1718323200 + 20 * 3600);
        assert_eq!(expiry_close(1705622400).unwrap().timestamp(), 1705622400 + 21 * 3600);
        // 2024 daylight time: 10 March to 3 November.
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        assert!(!new_york_daylight_time(day(3, 9)));
        assert!(new_york_daylight_time(day(3, 10)));
        assert!(new_york_daylight_time(day(11, 2)));
        assert!(!new_york_daylight_time(day(11, 3)));
    }

    #[test]
    fn select_expiry_skips_near_dated_contracts() {
        let day = 86_400;
        // Monday 2024-06-03 00:00 UTC, then 0, 2, 4, 11 and 32 days out.
        let monday = 1717372800;
        let listed = [monday, monday + 2 * day, monday + 4 * day, monday + 11 * day, monday + 32 * day];
        let now = DateTime::from_timestamp(monday + 15 * 3600, 0).unwrap();

        assert_eq!(select_expiry(&listed, now, 7), Some(monday + 11 * day));
        assert_eq!(select_expiry(&listed, now, 0), Some(monday));
        // Nothing far enough out: take the furthest listed.
        assert_eq!(select_expiry(&listed, now, 60), Some(monday + 32 * day));
        assert_eq!(select_expiry(&[], now, 7), None);
    }

    #[test]
    fn expiries_lists_dates_and_served_expiry() {
        let json = r#"{ "optionChain": { "result": [{
            "quote": { "regularMarketPrice": 10.5 },
            "expirationDates": [1717372800, 1718323200],
            "options": [{ "expirationDate": 1717372800, "calls": [], "puts": [] }]
        }], "error": null } }"#;
        let response: OptionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.expiries(),
            (vec![1717372800, 1718323200], Some(1717372800))
        );
    }

    /// Serves canned responses on a local port, recording each request target.
    async fn stub_server<F>(respond: F) -> (String, Arc<Mutex<Vec<String>>>)
    where
        F: Fn(&str) -> (u16, String) + Send + 'static,
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let target = String::from_utf8_lossy(&head)
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                let (status, body) = respond(&target);
                log.lock().unwrap().push(target);
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (base, seen)
    }

    #[tokio::test]
    async fn non_success_status_is_reported_as_http_status() {
        let (base, _) = stub_server(|_| (404, r#"{"finance":{"error":"Not Found"}}"#.to_string())).await;
        let gateway = YahooGateway::new(base, 0.01, Duration::from_secs(5)).unwrap();
        let url = gateway.endpoint(&["v8", "finance", "chart"], "NOPE").unwrap();

        let err = gateway.get_json::<serde_json::Value>(url, &[]).await.unwrap_err();
        match err {
            VolscanError::HttpStatus { status, body } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert!(body.contains("Not Found"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn option_chain_requests_first_expiry_past_minimum() {
        let day = 86_400;
        let today = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let near = today + 2 * day;
        let later = today + 10 * day;

        let options = move |date: i64, strike: f64| {
            format!(
                r#"{{ "optionChain": {{ "result": [{{
                    "quote": {{ "regularMarketPrice": 100.0 }},
                    "expirationDates": [{today}, {near}, {later}],
                    "options": [{{ "expirationDate": {date},
                        "calls": [{{ "strike": {strike}, "lastPrice": 2.5, "expiration": {date} }}],
                        "puts": [] }}]
                }}], "error": null }} }}"#
            )
        };
        let (base, seen) = stub_server(move |target| {
            if target.contains(&format!("date={later}")) {
                (200, options(later, 105.0))
            } else {
                (200, options(today, 100.0))
            }
        })
        .await;

        let gateway = YahooGateway::new(base, 0.01, Duration::from_secs(5))
            .unwrap()
            .with_min_days_to_expiry(7);
        let chain = gateway.option_chain("SPY").await.unwrap();

        assert_eq!(chain.contracts.len(), 1);
        assert_eq!(chain.contracts[0].strike, dec!(105));
        assert_eq!(
            chain.contracts[0].expiry.date_naive(),
            DateTime::from_timestamp(later, 0).unwrap().date_naive()
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "/v7/finance/options/SPY");
        assert_eq!(seen[1], format!("/v7/finance/options/SPY?date={later}"));
    }

    #[tokio::test]
    async fn unreachable_host_falls_back_to_configured_rate() {
        let gateway =
            YahooGateway::new("http://127.0.0.1:9", 0.01, Duration::from_millis(200)).unwrap();
        assert_eq!(gateway.risk_free_rate().await, 0.01);

        let err = gateway.price_history("AAPL", 20).await.unwrap_err();
        assert!(matches!(err, ScreenError::DataUnavailable { .. }));
    }
}
