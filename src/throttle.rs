// =============================================================================
// Update throttle — keep stop updates from flooding downstream
// =============================================================================
//
// Two independent gates, both of which must pass before a stop update leaves
// the internal engine:
//
//   unit throttle   — configured per deployment: a minimum profit change
//                     (Dollars), a minimum price move (Pips/Ticks), or a
//                     minimum elapsed interval (Percent — the configured
//                     value is read as seconds, an inherited configuration
//                     reuse kept for compatibility with existing files).
//   hard floor      — the candidate must differ from the last dispatched
//                     stop by at least one tick AND at least one second must
//                     have passed since the last dispatch.
//
// The strictest gate wins.
// =============================================================================

use chrono::{DateTime, Duration, Utc};

use crate::config::ProfitUnit;
use crate::instrument::Instrument;

/// Minimum wall-clock spacing between dispatched stop updates, milliseconds.
pub const MIN_DISPATCH_MS: i64 = 1_000;

/// Unit-dependent throttle. `last_update` of `None` means nothing has been
/// dispatched yet, which always passes.
pub fn should_dispatch(
    unit: ProfitUnit,
    required: f64,
    last_update: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    profit_change: f64,
    price_change: f64,
    instrument: &Instrument,
) -> bool {
    if required <= 0.0 {
        return true;
    }
    match unit {
        ProfitUnit::Dollars => profit_change.abs() >= required,
        ProfitUnit::Pips => instrument.to_pips(price_change.abs()) >= required,
        ProfitUnit::Ticks => instrument.to_ticks(price_change.abs()) >= required,
        // Percent doubles as a seconds interval.
        ProfitUnit::Percent => match last_update {
            Some(last) => (now - last) >= Duration::milliseconds((required * 1000.0) as i64),
            None => true,
        },
    }
}

/// Internal-engine hard floor: a candidate is only worth dispatching when it
/// has moved at least one tick from the last dispatched level and the last
/// dispatch is at least one second old.
pub fn stop_change_due(
    last_dispatched: Option<f64>,
    candidate: f64,
    tick_size: f64,
    last_dispatch: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let moved = match last_dispatched {
        Some(prev) => {
            let min_move = if tick_size > 0.0 { tick_size } else { f64::EPSILON };
            (candidate - prev).abs() >= min_move - 1e-12
        }
        None => true,
    };
    let aged = match last_dispatch {
        Some(last) => (now - last).num_milliseconds() >= MIN_DISPATCH_MS,
        None => true,
    };
    moved && aged
}
