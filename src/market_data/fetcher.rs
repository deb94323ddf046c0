// =============================================================================
// Batch intraday fetch with per-symbol failure isolation
// =============================================================================
//
// One symbol's failure (network error, unknown ticker, provider error) must
// never abort the batch: the failing symbol is dropped from the result map and
// recorded as a FetchFailure for the caller to surface. The returned map
// contains exactly the symbols that succeeded.
//
// There is no caching layer. Every call re-fetches every requested symbol.
// =============================================================================

use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::market_data::{Bar, Series};

/// The market-data provider boundary: one trading day of five-minute bars for
/// a single symbol, or a failure.
pub trait BarProvider: Send + Sync {
    fn get_intraday_bars(&self, symbol: &str) -> impl Future<Output = Result<Series>> + Send;
}

/// A recorded per-symbol fetch failure for the dashboard error panel.
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub symbol: String,
    pub error: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Result of one batch fetch: the series that succeeded plus the failures.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub series: HashMap<String, Vec<Bar>>,
    pub failures: Vec<FetchFailure>,
}

/// Fetch the current trading day for every symbol, sequentially, guarding
/// each call independently. Never fails as a whole.
pub async fn fetch_intraday<P: BarProvider>(provider: &P, symbols: &[String]) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    for symbol in symbols {
        match provider.get_intraday_bars(symbol).await {
            Ok(bars) => {
                debug!(symbol = %symbol, bars = bars.len(), "intraday fetch ok");
                outcome.series.insert(symbol.clone(), bars);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "intraday fetch failed — symbol skipped this cycle");
                outcome.failures.push(FetchFailure {
                    symbol: symbol.clone(),
                    error: format!("{e:#}"),
                    at: Utc::now().to_rfc3339(),
                });
            }
        }
    }

    outcome
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Stub provider backed by canned per-symbol results.
    struct StubProvider {
        bars: HashMap<String, Vec<Bar>>,
    }

    impl StubProvider {
        fn new(entries: &[(&str, Vec<Bar>)]) -> Self {
            Self {
                bars: entries
                    .iter()
                    .map(|(s, b)| (s.to_string(), b.clone()))
                    .collect(),
            }
        }
    }

    impl BarProvider for StubProvider {
        async fn get_intraday_bars(&self, symbol: &str) -> Result<Series> {
            match self.bars.get(symbol) {
                Some(bars) => Ok(bars.clone()),
                None => anyhow::bail!("no data found for symbol {symbol}"),
            }
        }
    }

    fn bar(ts: i64, close: f64) -> Bar {
        Bar {
            timestamp: ts,
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[tokio::test]
    async fn failing_symbol_does_not_abort_batch() {
        let provider = StubProvider::new(&[("AAA", vec![bar(0, 100.0), bar(300, 101.0)])]);
        let symbols = vec!["AAA".to_string(), "BBB".to_string()];

        let outcome = fetch_intraday(&provider, &symbols).await;

        assert_eq!(outcome.series.len(), 1);
        assert!(outcome.series.contains_key("AAA"));
        assert!(!outcome.series.contains_key("BBB"));

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].symbol, "BBB");
        assert!(outcome.failures[0].error.contains("BBB"));
    }

    #[tokio::test]
    async fn all_symbols_succeed() {
        let provider = StubProvider::new(&[
            ("AAA", vec![bar(0, 100.0)]),
            ("BBB", vec![bar(0, 50.0)]),
        ]);
        let symbols = vec!["AAA".to_string(), "BBB".to_string()];

        let outcome = fetch_intraday(&provider, &symbols).await;
        assert_eq!(outcome.series.len(), 2);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn empty_symbol_list_yields_empty_outcome() {
        let provider = StubProvider::new(&[]);
        let outcome = fetch_intraday(&provider, &[]).await;
        assert!(outcome.series.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn every_fetch_returns_fresh_series() {
        // No caching: the provider is consulted on every call.
        let provider = StubProvider::new(&[("AAA", vec![bar(0, 100.0)])]);
        let symbols = vec!["AAA".to_string()];

        let first = fetch_intraday(&provider, &symbols).await;
        let second = fetch_intraday(&provider, &symbols).await;
        assert_eq!(first.series["AAA"], second.series["AAA"]);
    }
}
