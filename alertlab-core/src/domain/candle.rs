//! Candle — the fundamental market data unit.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// OHLCV candle for a single instrument over one fixed interval.
///
/// `timestamp_ms` is the candle open time in milliseconds since the Unix
/// epoch (UTC). Every timestamp in the engine uses the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any OHLC field is NaN (void candle).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }
}

/// Read-only access to per-instrument candle series.
pub trait CandleSource {
    /// Candles for `instrument`, sorted ascending, or `None` if unknown.
    fn candles(&self, instrument: &str) -> Option<&[Candle]>;
}

impl CandleSource for HashMap<String, Vec<Candle>> {
    fn candles(&self, instrument: &str) -> Option<&[Candle]> {
        self.get(instrument).map(Vec::as_slice)
    }
}

impl CandleSource for BTreeMap<String, Vec<Candle>> {
    fn candles(&self, instrument: &str) -> Option<&[Candle]> {
        self.get(instrument).map(Vec::as_slice)
    }
}

/// Index of the first candle whose timestamp is at or after `timestamp_ms`.
///
/// Candles must be sorted ascending by timestamp. Returns `None` when every
/// candle is strictly before the timestamp.
pub fn first_at_or_after(candles: &[Candle], timestamp_ms: i64) -> Option<usize> {
    let idx = candles.partition_point(|c| c.timestamp_ms < timestamp_ms);
    (idx < candles.len()).then_some(idx)
}

/// True when the slice is strictly increasing by timestamp.
pub fn is_strictly_ordered(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms)
}
