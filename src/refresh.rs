// =============================================================================
// Scan loop — periodic fetch → detect → publish with explicit lifecycle
// =============================================================================
//
// One cycle, strictly sequential: read the current symbol selection, fetch
// every symbol (per-symbol failures isolated), run the detector on each
// series, publish the lot into AppState. Publishing is the render dispatch —
// the dashboard reads it over REST/WebSocket. Then the loop waits out the
// interval.
//
// The loop is a spawned task with a watch-channel shutdown signal, so the
// hosting process can stop it cleanly instead of abandoning an unbounded
// sleep. Selection changes land between cycles; the interval itself is read
// once at start.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_state::{AppState, SymbolScan};
use crate::market_data::{fetch_intraday, BarProvider};
use crate::marubozu_detector::MarubozuDetector;

/// Handle to a running scan loop.
pub struct RefreshLoop {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl RefreshLoop {
    /// Spawn the loop. The first cycle runs immediately; subsequent cycles
    /// fire every `refresh_interval_secs` (read from config at start).
    pub fn start<P>(state: Arc<AppState>, provider: Arc<P>) -> Self
    where
        P: BarProvider + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(state, provider, shutdown_rx));
        Self { handle, shutdown }
    }

    /// Signal shutdown and wait for the in-flight cycle to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "scan loop task did not shut down cleanly");
        }
    }
}

async fn run<P: BarProvider>(
    state: Arc<AppState>,
    provider: Arc<P>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = {
        let secs = state.runtime_config.read().refresh_interval_secs;
        tokio::time::Duration::from_secs(secs.max(1))
    };
    info!(period_secs = period.as_secs(), "scan loop starting");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cycle(&state, &*provider).await;
            }
            _ = shutdown.changed() => {
                info!("scan loop stopping");
                return;
            }
        }
    }
}

/// Execute one scan cycle: fetch all, detect all, then publish.
pub(crate) async fn run_cycle<P: BarProvider>(state: &Arc<AppState>, provider: &P) {
    let symbols = state.runtime_config.read().selected_symbols();
    if symbols.is_empty() {
        debug!("no symbols selected — idle cycle");
        return;
    }

    let outcome = fetch_intraday(provider, &symbols).await;

    for failure in &outcome.failures {
        state.push_error(format!(
            "failed to fetch data for {}: {}",
            failure.symbol, failure.error
        ));
    }

    let detector = MarubozuDetector::default();
    let mut scans = std::collections::HashMap::with_capacity(outcome.series.len());
    for (symbol, series) in outcome.series {
        let matches = detector.detect(&series);
        if !matches.is_empty() {
            debug!(symbol = %symbol, matches = matches.len(), "highlighted candles found");
        }
        scans.insert(symbol, SymbolScan { series, matches });
    }

    let fetched = scans.len();

    // Publish: everything for this cycle lands before the next fetch starts.
    *state.scans.write() = scans;
    *state.last_fetch_failures.write() = outcome.failures;
    *state.last_updated.write() = Some(Utc::now());
    state.increment_version();

    info!(
        requested = symbols.len(),
        fetched,
        "scan cycle complete"
    );
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Bar, Series};
    use crate::runtime_config::{RuntimeConfig, SymbolGroup};
    use anyhow::Result;
    use std::collections::HashMap;

    struct StubProvider {
        bars: HashMap<String, Vec<Bar>>,
    }

    impl BarProvider for StubProvider {
        async fn get_intraday_bars(&self, symbol: &str) -> Result<Series> {
            match self.bars.get(symbol) {
                Some(bars) => Ok(bars.clone()),
                None => anyhow::bail!("no data found for symbol {symbol}"),
            }
        }
    }

    fn test_state(symbols: Vec<&str>) -> Arc<AppState> {
        let config = RuntimeConfig {
            symbol_groups: vec![SymbolGroup {
                name: "TEST".into(),
                symbols: symbols.into_iter().map(String::from).collect(),
            }],
            selected_groups: vec!["TEST".into()],
            ..RuntimeConfig::default()
        };
        Arc::new(AppState::new(config))
    }

    fn flat_bar(ts: i64, price: f64) -> Bar {
        Bar {
            timestamp: ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 10.0,
        }
    }

    fn plain_bar(ts: i64, price: f64) -> Bar {
        Bar {
            timestamp: ts,
            open: price,
            high: price + 2.0,
            low: price - 1.0,
            close: price + 1.0,
            volume: 10.0,
        }
    }

    #[tokio::test]
    async fn cycle_publishes_scans_and_failures() {
        let state = test_state(vec!["GOOD", "BAD"]);
        let provider = StubProvider {
            bars: [(
                "GOOD".to_string(),
                vec![plain_bar(0, 100.0), flat_bar(300, 101.0)],
            )]
            .into_iter()
            .collect(),
        };

        let version_before = state.current_state_version();
        run_cycle(&state, &provider).await;

        let scans = state.scans.read();
        assert_eq!(scans.len(), 1);
        let good = scans.get("GOOD").unwrap();
        assert_eq!(good.series.len(), 2);
        // Only the flat bar matches the predicate.
        assert_eq!(good.matches.len(), 1);
        assert_eq!(good.matches[0].index, 1);
        drop(scans);

        let failures = state.last_fetch_failures.read();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].symbol, "BAD");
        drop(failures);

        assert!(state.last_updated.read().is_some());
        assert!(state.current_state_version() > version_before);
        // The failure also lands on the error log.
        assert!(state
            .recent_errors
            .read()
            .iter()
            .any(|e| e.message.contains("BAD")));
    }

    #[tokio::test]
    async fn idle_cycle_with_no_selection_publishes_nothing() {
        let config = RuntimeConfig::default();
        let state = Arc::new(AppState::new(config));
        let provider = StubProvider {
            bars: HashMap::new(),
        };

        run_cycle(&state, &provider).await;

        assert!(state.scans.read().is_empty());
        assert!(state.last_updated.read().is_none());
    }

    #[tokio::test]
    async fn next_cycle_replaces_previous_results() {
        // Series are ephemeral: each cycle regenerates the map in full.
        let state = test_state(vec!["GOOD", "GONE"]);
        let provider = StubProvider {
            bars: [
                ("GOOD".to_string(), vec![plain_bar(0, 100.0)]),
                ("GONE".to_string(), vec![plain_bar(0, 50.0)]),
            ]
            .into_iter()
            .collect(),
        };
        run_cycle(&state, &provider).await;
        assert_eq!(state.scans.read().len(), 2);

        let provider = StubProvider {
            bars: [("GOOD".to_string(), vec![plain_bar(300, 101.0)])]
                .into_iter()
                .collect(),
        };
        run_cycle(&state, &provider).await;

        let scans = state.scans.read();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans.get("GOOD").unwrap().series[0].timestamp, 300);
    }

    #[tokio::test]
    async fn loop_start_stop() {
        let state = test_state(vec!["GOOD"]);
        let provider = Arc::new(StubProvider {
            bars: [("GOOD".to_string(), vec![plain_bar(0, 100.0)])]
                .into_iter()
                .collect(),
        });

        let refresh = RefreshLoop::start(state.clone(), provider);
        // First tick fires immediately; give it a moment to land.
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        refresh.stop().await;

        assert_eq!(state.scans.read().len(), 1);
    }
}
