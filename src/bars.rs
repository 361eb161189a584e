// =============================================================================
// Bar buffer — bounded per-symbol OHLCV history for the indicator modes
// =============================================================================
//
// The DEMA±ATR trail mode needs a rolling window of closed bars. The host
// pushes bars as its feed closes them; the buffer keeps the most recent 600
// per symbol and serves indicator reads. Reads take a short read lock and
// copy out — the lock is never held across an await.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::indicators::{atr, dema};

/// Maximum bars retained per symbol.
pub const MAX_BARS: usize = 600;

/// One closed OHLCV bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    /// Bar close time, epoch milliseconds.
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Thread-safe bounded bar history per symbol.
#[derive(Default)]
pub struct BarBuffer {
    inner: RwLock<HashMap<String, VecDeque<Bar>>>,
}

impl BarBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed bar, evicting the oldest once the cap is reached.
    pub fn push(&self, symbol: &str, bar: Bar) {
        let mut map = self.inner.write();
        let buf = map.entry(symbol.to_string()).or_default();
        if buf.len() == MAX_BARS {
            buf.pop_front();
        }
        buf.push_back(bar);
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.inner.read().get(symbol).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    /// Close series, oldest first.
    pub fn closes(&self, symbol: &str) -> Vec<f64> {
        self.inner
            .read()
            .get(symbol)
            .map(|buf| buf.iter().map(|b| b.close).collect())
            .unwrap_or_default()
    }

    /// Wilder ATR over the buffered bars. `None` until enough history.
    pub fn atr(&self, symbol: &str, period: usize) -> Option<f64> {
        let bars: Vec<Bar> = self.inner.read().get(symbol)?.iter().copied().collect();
        atr::calculate_atr(&bars, period)
    }

    /// DEMA over the buffered closes. `None` until enough history.
    pub fn dema(&self, symbol: &str, period: usize) -> Option<f64> {
        let closes = self.closes(symbol);
        dema::calculate_dema(&closes, period)
    }
}
