pub mod fetcher;

use serde::{Deserialize, Serialize};

/// A single five-minute OHLCV bar for one symbol.
///
/// `low <= open,close <= high` is assumed from the provider, never enforced;
/// a malformed bar simply fails the detector predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time as a UNIX timestamp in seconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Full candle range, `high - low`.
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// One symbol's bars for the current trading day, ordered by timestamp.
/// Regenerated in full on every fetch; nothing is appended incrementally.
pub type Series = Vec<Bar>;

// Re-export the batch fetch surface (e.g. `use crate::market_data::fetch_intraday`).
pub use fetcher::{fetch_intraday, BarProvider, FetchFailure, FetchOutcome};
