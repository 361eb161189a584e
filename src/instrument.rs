// =============================================================================
// Instrument metadata and price-distance unit conversion
// =============================================================================
//
// Every stop calculation works in one of four unit systems (currency, pips,
// ticks, percent). This module owns the instrument-level facts needed to move
// a raw price distance between those systems:
//
//   pip  — 0.0001 price units for forex, 0.01 for JPY-quoted pairs, and the
//          contract tick size for anything that is not a currency pair.
//   tick — the smallest increment defined by the contract specification.
//
// All conversions are pure. A zero or undefined unit size yields a sentinel
// distance of 0.0 rather than a division fault.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Broad contract category — only used to decide what a "pip" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Forex,
    Futures,
    Other,
}

/// Static contract facts for one tradable instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub kind: InstrumentKind,
    /// Smallest price increment of the contract.
    pub tick_size: f64,
    /// Currency value of a one-point move for one contract.
    pub point_value: f64,
}

impl Instrument {
    pub fn new(symbol: &str, kind: InstrumentKind, tick_size: f64, point_value: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
            tick_size,
            point_value,
        }
    }

    /// Size of one pip in price units.
    ///
    /// Forex pairs use the conventional 0.0001 (0.01 when the symbol is
    /// JPY-quoted); every other instrument falls back to its tick size.
    pub fn pip_size(&self) -> f64 {
        match self.kind {
            InstrumentKind::Forex => {
                if self.symbol.to_uppercase().contains("JPY") {
                    0.01
                } else {
                    0.0001
                }
            }
            _ => self.tick_size,
        }
    }

    /// Convert a raw price distance into pips. Returns 0.0 when the pip size
    /// is undefined.
    pub fn to_pips(&self, distance: f64) -> f64 {
        let pip = self.pip_size();
        if pip > 0.0 {
            distance / pip
        } else {
            0.0
        }
    }

    /// Convert a raw price distance into ticks. Returns 0.0 when the tick
    /// size is undefined.
    pub fn to_ticks(&self, distance: f64) -> f64 {
        if self.tick_size > 0.0 {
            distance / self.tick_size
        } else {
            0.0
        }
    }

    /// Quantize a price to the nearest valid tick. Identity when the tick
    /// size is undefined.
    pub fn round_to_tick(&self, price: f64) -> f64 {
        if self.tick_size > 0.0 {
            (price / self.tick_size).round() * self.tick_size
        } else {
            price
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn forex(symbol: &str) -> Instrument {
        Instrument::new(symbol, InstrumentKind::Forex, 0.00001, 1.0)
    }

    #[test]
    fn pip_size_standard_forex() {
        assert!((forex("EURUSD").pip_size() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn pip_size_jpy_pair() {
        assert!((forex("USDJPY").pip_size() - 0.01).abs() < 1e-12);
        // Case-insensitive match on the symbol.
        assert!((forex("eurjpy").pip_size() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn pip_size_non_forex_uses_tick() {
        let es = Instrument::new("ES", InstrumentKind::Futures, 0.25, 50.0);
        assert!((es.pip_size() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn distance_conversions() {
        let eur = forex("EURUSD");
        assert!((eur.to_pips(0.0025) - 25.0).abs() < 1e-9);
        assert!((eur.to_ticks(0.0025) - 250.0).abs() < 1e-9);
    }

    #[test]
    fn zero_tick_size_is_sentinel() {
        let broken = Instrument::new("XXX", InstrumentKind::Other, 0.0, 1.0);
        assert_eq!(broken.to_pips(1.5), 0.0);
        assert_eq!(broken.to_ticks(1.5), 0.0);
        // Quantization is identity rather than NaN.
        assert_eq!(broken.round_to_tick(101.37), 101.37);
    }

    #[test]
    fn round_to_nearest_tick() {
        let es = Instrument::new("ES", InstrumentKind::Futures, 0.25, 50.0);
        assert!((es.round_to_tick(4500.13) - 4500.25).abs() < 1e-9);
        assert!((es.round_to_tick(4500.12) - 4500.0).abs() < 1e-9);
        assert!((es.round_to_tick(4500.25) - 4500.25).abs() < 1e-9);
    }
}
