//! Bar: the fundamental market data unit.

use serde::{Deserialize, Serialize};

/// OHLCV bar keyed by its open timestamp in epoch milliseconds.
///
/// Series of bars are append-only and strictly time-ascending per subscription;
/// the scheduler reads them by position, never by lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// The open-only view handed to `on_bar_start`.
    ///
    /// All prices equal the open and volume is zero, so a strategy reacting at
    /// the start of a bar cannot see where the bar resolves.
    pub fn open_view(&self) -> Self {
        Self {
            timestamp_ms: self.timestamp_ms,
            open: self.open,
            high: self.open,
            low: self.open,
            close: self.open,
            volume: 0.0,
        }
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close.
    pub fn is_sane(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}
