// =============================================================================
// Marubozu scan — equal open/low, equal close/high, half-range body floor
// =============================================================================
//
// A bar matches when, with range = high - low:
//
//   open == low
//   close == high
//   open >= low + min_body_ratio * range
//
// Comparisons are exact. Floating-point provider data will miss near-equal
// bars; that is accepted behavior, not something to paper over with an
// epsilon. A fully flat bar (open == high == low == close) satisfies the
// threshold term at zero range and therefore matches — that falls straight
// out of the formula and must not be special-cased away.
// =============================================================================

use serde::Serialize;

use crate::market_data::Bar;

/// A bar that satisfied the scan predicate, with its position in the source
/// series. Carries no identity beyond the bar itself.
#[derive(Debug, Clone, Serialize)]
pub struct MarubozuMatch {
    /// Index of the bar in the scanned series.
    pub index: usize,
    pub bar: Bar,
}

/// Stateless single-bar scanner over a day's series.
#[derive(Debug, Clone, Copy)]
pub struct MarubozuDetector {
    /// Minimum body as a fraction of the candle range. Fixed heuristic; the
    /// field exists so the constant lives in one place, not for tuning.
    pub min_body_ratio: f64,
}

impl Default for MarubozuDetector {
    fn default() -> Self {
        Self {
            min_body_ratio: 0.5,
        }
    }
}

impl MarubozuDetector {
    /// Scan a series and return the matching bars in input order.
    ///
    /// The result is always an order-preserving subsequence of `series`;
    /// empty input yields empty output.
    pub fn detect(&self, series: &[Bar]) -> Vec<MarubozuMatch> {
        series
            .iter()
            .enumerate()
            .filter(|(_, bar)| self.is_match(bar))
            .map(|(index, bar)| MarubozuMatch {
                index,
                bar: bar.clone(),
            })
            .collect()
    }

    /// The raw predicate for one bar.
    #[inline]
    pub fn is_match(&self, bar: &Bar) -> bool {
        bar.open == bar.low
            && bar.close == bar.high
            && bar.open >= bar.low + self.min_body_ratio * bar.range()
    }
}

// =============================================================================
// Tests
// =============================================================================
