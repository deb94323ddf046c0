// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth shared between the scan loop and the API tasks.
// The scan loop publishes fresh per-symbol series + matches each cycle; the
// REST snapshot and the WebSocket push both read from here.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::credstore::CredentialStore;
use crate::market_data::{Bar, FetchFailure};
use crate::marubozu_detector::MarubozuMatch;
use crate::runtime_config::{RuntimeConfig, SymbolGroup};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// Records
// =============================================================================

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// One symbol's latest scan cycle output.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolScan {
    pub series: Vec<Bar>,
    pub matches: Vec<MarubozuMatch>,
}

/// Per-login session context: created on login, discarded on logout.
/// The notepad text lives here rather than in any process-wide global.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub logged_in_at: DateTime<Utc>,
    pub notepad: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful mutation. The WebSocket feed uses this to detect changes
    /// and push updates.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub credentials: CredentialStore,

    // ── Latest scan cycle ───────────────────────────────────────────────
    pub scans: RwLock<HashMap<String, SymbolScan>>,
    pub last_updated: RwLock<Option<DateTime<Utc>>>,
    pub last_fetch_failures: RwLock<Vec<FetchFailure>>,

    // ── Error log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Sessions ────────────────────────────────────────────────────────
    pub sessions: RwLock<HashMap<String, Session>>,

    /// Instant when the process started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let credentials = CredentialStore::new(config.credentials_path.clone());

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            credentials,
            scans: RwLock::new(HashMap::new()),
            last_updated: RwLock::new(None),
            last_fetch_failures: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            sessions: RwLock::new(HashMap::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    /// Atomically increment the state version. Call after every meaningful
    /// mutation so WebSocket clients learn fresh data is available.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error logging ───────────────────────────────────────────────────

    /// Record an error message. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Create a session for `username` and return its bearer token.
    pub fn create_session(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().insert(
            token.clone(),
            Session {
                username: username.to_string(),
                logged_in_at: Utc::now(),
                notepad: String::new(),
            },
        );
        token
    }

    /// Discard a session, returning it if the token was live.
    pub fn remove_session(&self, token: &str) -> Option<Session> {
        self.sessions.write().remove(token)
    }

    /// Username behind a live session token, if any.
    pub fn session_username(&self, token: &str) -> Option<String> {
        self.sessions.read().get(token).map(|s| s.username.clone())
    }

    /// Current notepad text for a session.
    pub fn session_notepad(&self, token: &str) -> Option<String> {
        self.sessions.read().get(token).map(|s| s.notepad.clone())
    }

    /// Replace a session's notepad text. Returns false for a dead token.
    pub fn set_session_notepad(&self, token: &str, text: String) -> bool {
        match self.sessions.write().get_mut(token) {
            Some(session) => {
                session.notepad = text;
                true
            }
            None => false,
        }
    }

    // ── Snapshot builder ────────────────────────────────────────────────

    /// Build the full renderer payload: one panel per selected symbol (in
    /// selection order, succeeded symbols only) plus grid layout, timestamps,
    /// and the current cycle's failures.
    pub fn build_snapshot(&self) -> DashboardSnapshot {
        let config = self.runtime_config.read();
        let scans = self.scans.read();

        let panels = config
            .selected_symbols()
            .into_iter()
            .filter_map(|symbol| {
                scans.get(&symbol).map(|scan| SymbolPanel {
                    symbol: symbol.clone(),
                    series: scan.series.clone(),
                    matches: scan.matches.clone(),
                })
            })
            .collect();

        DashboardSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            last_updated: self.last_updated.read().map(|t| t.to_rfc3339()),
            chart_columns: config.chart_columns,
            symbol_groups: config.symbol_groups.clone(),
            selected_groups: config.selected_groups.clone(),
            panels,
            failures: self.last_fetch_failures.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

// =============================================================================
// Serialisable snapshot types (the dashboard's wire contract)
// =============================================================================

/// One chart panel: a symbol's day of bars plus the highlighted candles.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolPanel {
    pub symbol: String,
    pub series: Vec<Bar>,
    pub matches: Vec<MarubozuMatch>,
}

/// Full dashboard snapshot sent over REST `GET /api/v1/charts` and the
/// WebSocket push feed.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    /// End of the last completed scan cycle, ISO 8601.
    pub last_updated: Option<String>,
    pub chart_columns: u32,
    pub symbol_groups: Vec<SymbolGroup>,
    pub selected_groups: Vec<String>,
    pub panels: Vec<SymbolPanel>,
    pub failures: Vec<FetchFailure>,
    pub recent_errors: Vec<ErrorRecord>,
    pub uptime_secs: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_selection(groups: Vec<&str>) -> AppState {
        let mut config = RuntimeConfig::default();
        config.selected_groups = groups.into_iter().map(String::from).collect();
        AppState::new(config)
    }

    fn flat_bar(ts: i64, price: f64) -> Bar {
        Bar {
            timestamp: ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    #[test]
    fn version_increments() {
        let state = state_with_selection(vec![]);
        let before = state.current_state_version();
        state.increment_version();
        assert_eq!(state.current_state_version(), before + 1);
    }

    #[test]
    fn error_ring_buffer_is_capped() {
        let state = state_with_selection(vec![]);
        for i in 0..(MAX_RECENT_ERRORS + 10) {
            state.push_error(format!("error {i}"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 10");
    }

    #[test]
    fn session_lifecycle() {
        let state = state_with_selection(vec![]);
        let token = state.create_session("alice");

        assert_eq!(state.session_username(&token).as_deref(), Some("alice"));
        assert_eq!(state.session_notepad(&token).as_deref(), Some(""));

        assert!(state.set_session_notepad(&token, "scratch".into()));
        assert_eq!(state.session_notepad(&token).as_deref(), Some("scratch"));

        let removed = state.remove_session(&token).expect("session should exist");
        assert_eq!(removed.username, "alice");
        assert!(removed.logged_in_at <= Utc::now());
        assert!(state.session_username(&token).is_none());
        assert!(!state.set_session_notepad(&token, "gone".into()));
    }

    #[test]
    fn snapshot_orders_panels_by_selection() {
        let state = state_with_selection(vec!["INDICES"]);
        let selected = state.runtime_config.read().selected_symbols();

        {
            let mut scans = state.scans.write();
            // Publish in reverse order; the snapshot must still follow the
            // selection order.
            for (i, symbol) in selected.iter().enumerate().rev() {
                scans.insert(
                    symbol.clone(),
                    SymbolScan {
                        series: vec![flat_bar(i as i64, 100.0)],
                        matches: Vec::new(),
                    },
                );
            }
        }

        let snapshot = state.build_snapshot();
        let panel_symbols: Vec<_> = snapshot.panels.iter().map(|p| p.symbol.clone()).collect();
        assert_eq!(panel_symbols, selected);
        assert_eq!(snapshot.chart_columns, 3);
    }

    #[test]
    fn snapshot_skips_symbols_without_scans() {
        let state = state_with_selection(vec!["INDICES"]);
        // Nothing published yet: selection is non-empty but panels are not.
        let snapshot = state.build_snapshot();
        assert!(!snapshot.selected_groups.is_empty());
        assert!(snapshot.panels.is_empty());
        assert!(snapshot.last_updated.is_none());
    }
}
