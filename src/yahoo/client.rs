// =============================================================================
// Yahoo Finance chart API client — intraday bars over public REST
// =============================================================================
//
// The chart endpoint is unauthenticated; the only required courtesy is a real
// User-Agent header (the default reqwest UA gets rate-limited aggressively).
// Lookback and bar size are fixed: one trading day of five-minute bars.
// =============================================================================

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, instrument};

use crate::market_data::Bar;

/// Fixed lookback window requested from the provider.
const LOOKBACK_RANGE: &str = "1d";
/// Fixed bar size requested from the provider.
const BAR_INTERVAL: &str = "5m";

/// Yahoo Finance chart API client.
#[derive(Clone)]
pub struct YahooClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    /// Create a new `YahooClient` against the public chart host.
    pub fn new() -> Self {
        Self::with_base_url("https://query1.finance.yahoo.com")
    }

    /// Create a client against a custom host (used by tests and mirrors).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (compatible; candlewatch/0.1)"),
        );

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// GET /v8/finance/chart/{symbol} — one trading day of five-minute bars.
    ///
    /// Unknown symbols and provider errors surface through the body's
    /// `chart.error` object; both are plain errors to the caller.
    #[instrument(skip(self), name = "yahoo::get_intraday_bars")]
    pub async fn get_intraday_bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval={}",
            self.base_url, symbol, LOOKBACK_RANGE, BAR_INTERVAL
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET chart request for {symbol} failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse chart response for {symbol}"))?;

        if !status.is_success() {
            anyhow::bail!("chart endpoint returned {} for {}: {}", status, symbol, body);
        }

        let bars = parse_chart_response(&body)
            .with_context(|| format!("malformed chart payload for {symbol}"))?;

        debug!(symbol, count = bars.len(), "intraday bars fetched");
        Ok(bars)
    }
}

impl crate::market_data::BarProvider for YahooClient {
    async fn get_intraday_bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        YahooClient::get_intraday_bars(self, symbol).await
    }
}

impl std::fmt::Debug for YahooClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Response parsing
// =============================================================================

/// Parse the chart JSON envelope into bars.
///
/// Expected shape:
/// ```json
/// { "chart": { "result": [ { "timestamp": [...],
///                            "indicators": { "quote": [ { "open": [...], ... } ] } } ],
///              "error": null } }
/// ```
///
/// Rows where any of open/high/low/close is null (the provider pads session
/// gaps with nulls) are skipped; a null volume decodes as 0.
fn parse_chart_response(body: &serde_json::Value) -> Result<Vec<Bar>> {
    let chart = &body["chart"];

    let error = &chart["error"];
    if !error.is_null() {
        let code = error["code"].as_str().unwrap_or("unknown");
        let description = error["description"].as_str().unwrap_or("no description");
        anyhow::bail!("provider error {code}: {description}");
    }

    let result = chart["result"]
        .as_array()
        .and_then(|arr| arr.first())
        .context("chart response missing result[0]")?;

    let timestamps = result["timestamp"].as_array();
    let timestamps = match timestamps {
        Some(ts) => ts,
        // A valid but empty session (e.g. market holiday) has no timestamp
        // array at all.
        None => return Ok(Vec::new()),
    };

    let quote = result["indicators"]["quote"]
        .as_array()
        .and_then(|arr| arr.first())
        .context("chart response missing indicators.quote[0]")?;

    let opens = quote["open"].as_array().context("missing quote.open")?;
    let highs = quote["high"].as_array().context("missing quote.high")?;
    let lows = quote["low"].as_array().context("missing quote.low")?;
    let closes = quote["close"].as_array().context("missing quote.close")?;
    let volumes = quote["volume"].as_array().context("missing quote.volume")?;

    let mut bars = Vec::with_capacity(timestamps.len());

    for (i, ts) in timestamps.iter().enumerate() {
        let timestamp = match ts.as_i64() {
            Some(t) => t,
            None => continue,
        };

        let (open, high, low, close) = match (
            opens.get(i).and_then(|v| v.as_f64()),
            highs.get(i).and_then(|v| v.as_f64()),
            lows.get(i).and_then(|v| v.as_f64()),
            closes.get(i).and_then(|v| v.as_f64()),
        ) {
            (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
            _ => continue,
        };

        let volume = volumes.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0);

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(bars)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chart_response_ok() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "chart": {
                    "result": [{
                        "meta": { "symbol": "RELIANCE.NS" },
                        "timestamp": [1700000000, 1700000300],
                        "indicators": {
                            "quote": [{
                                "open":   [100.0, 101.5],
                                "high":   [102.0, 103.0],
                                "low":    [ 99.5, 101.0],
                                "close":  [101.5, 102.5],
                                "volume": [12000, 8000]
                            }]
                        }
                    }],
                    "error": null
                }
            }"#,
        )
        .unwrap();

        let bars = parse_chart_response(&body).expect("should parse");
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, 1700000000);
        assert!((bars[0].open - 100.0).abs() < f64::EPSILON);
        assert!((bars[1].close - 102.5).abs() < f64::EPSILON);
        assert!((bars[1].volume - 8000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_chart_response_skips_null_rows() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "chart": {
                    "result": [{
                        "timestamp": [1, 2, 3],
                        "indicators": {
                            "quote": [{
                                "open":   [100.0, null, 102.0],
                                "high":   [101.0, null, 103.0],
                                "low":    [ 99.0, null, 101.0],
                                "close":  [100.5, null, 102.5],
                                "volume": [1000, null, null]
                            }]
                        }
                    }],
                    "error": null
                }
            }"#,
        )
        .unwrap();

        let bars = parse_chart_response(&body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, 1);
        assert_eq!(bars[1].timestamp, 3);
        // Null volume on an otherwise complete row decodes as 0.
        assert!((bars[1].volume - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_chart_response_provider_error() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "chart": {
                    "result": null,
                    "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
                }
            }"#,
        )
        .unwrap();

        let err = parse_chart_response(&body).unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn parse_chart_response_empty_session() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{ "chart": { "result": [{ "meta": {}, "indicators": { "quote": [{}] } }], "error": null } }"#,
        )
        .unwrap();

        let bars = parse_chart_response(&body).unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn parse_chart_response_missing_result_is_error() {
        let body: serde_json::Value =
            serde_json::from_str(r#"{ "chart": { "result": [], "error": null } }"#).unwrap();
        assert!(parse_chart_response(&body).is_err());
    }
}
