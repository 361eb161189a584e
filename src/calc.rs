// =============================================================================
// Stop-Level Calculator — profit-locking ratchet and continuous trail modes
// =============================================================================
//
// Pure price math, no state.  Two families of stop derivation:
//
//   profit_lock_stop   — stepped ratchet: once progress clears the activation
//                        trigger, an initial amount of profit is protected and
//                        each further `increment` of progress locks in one
//                        more increment.
//   continuous_stop    — classic trailing: a fixed distance (dollars, pips,
//                        ticks) behind the water mark, a DEMA±ATR band, or a
//                        step ladder keyed off progress in pips.
//
// Every candidate passes through `apply_ratchet` before use: with a previous
// stop on record, a long stop may only rise and a short stop only fall.
//
// Invalid inputs (zero entry, dead prices, broken contract data) yield `None`
// — the caller keeps its previous stop for the cycle.  Nothing here divides
// by zero or emits a 0.0 stop.
// =============================================================================

use crate::config::{ProfitUnit, StepLevel, TrailMode, TrailingConfig};
use crate::instrument::Instrument;
use crate::position::Side;

/// Fixed progress buffer layered on top of the initial protection for the
/// pip- and tick-denominated profit-lock paths.
const PIP_TICK_BUFFER: f64 = 10.0;

/// Same buffer for the percent-denominated path.
const PERCENT_BUFFER: f64 = 1.0;

// =============================================================================
// Profit-locking ratchet
// =============================================================================

/// Inputs for one profit-lock evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ProfitLockInputs<'a> {
    pub side: Side,
    pub entry_price: f64,
    pub current_price: f64,
    /// Unrealized profit in account currency.
    pub profit: f64,
    pub quantity: f64,
    pub instrument: &'a Instrument,
    pub unit: ProfitUnit,
    /// Activation trigger in `unit` (Dollars path only — the other paths
    /// anchor on `initial` plus the fixed buffer).
    pub trigger: f64,
    /// Initial protected amount in `unit`.
    pub initial: f64,
    /// Protection growth per cleared increment of progress, in `unit`.
    pub increment: f64,
}

/// Compute the profit-lock stop candidate, quantized to the contract tick.
///
/// Returns `None` when the inputs cannot produce a trustworthy stop; the
/// caller keeps its previous level.
pub fn profit_lock_stop(inp: &ProfitLockInputs) -> Option<f64> {
    if inp.side == Side::Flat {
        return None;
    }
    if inp.entry_price <= 0.0 || !inp.current_price.is_finite() || inp.current_price <= 0.0 {
        return None;
    }
    if inp.instrument.point_value <= 0.0 {
        return None;
    }

    let increment = inp.increment.max(1e-9);
    let raw_move = (inp.current_price - inp.entry_price).abs();

    // Protected amount and its conversion back to a price distance, per unit.
    let distance = match inp.unit {
        ProfitUnit::Dollars => {
            if inp.quantity <= 0.0 {
                return None;
            }
            let extra = (inp.profit - inp.trigger).max(0.0);
            let increments = (extra / increment).floor();
            let protection = inp.initial + increments * inp.increment;
            protection / (inp.quantity * inp.instrument.point_value)
        }
        ProfitUnit::Pips => {
            let pip = inp.instrument.pip_size();
            if pip <= 0.0 {
                return None;
            }
            let progress = raw_move / pip;
            let extra = (progress - (inp.initial + PIP_TICK_BUFFER)).max(0.0);
            let increments = (extra / increment).floor();
            let protection = inp.initial + PIP_TICK_BUFFER + increments * inp.increment;
            protection * pip
        }
        ProfitUnit::Ticks => {
            let tick = inp.instrument.tick_size;
            if tick <= 0.0 {
                return None;
            }
            let progress = raw_move / tick;
            let extra = (progress - (inp.initial + PIP_TICK_BUFFER)).max(0.0);
            let increments = (extra / increment).floor();
            let protection = inp.initial + PIP_TICK_BUFFER + increments * inp.increment;
            protection * tick
        }
        ProfitUnit::Percent => {
            let progress = raw_move / inp.entry_price * 100.0;
            let extra = (progress - (inp.initial + PERCENT_BUFFER)).max(0.0);
            let increments = (extra / increment).floor();
            let protection = inp.initial + PERCENT_BUFFER + increments * inp.increment;
            protection / 100.0 * inp.entry_price
        }
    };

    if !distance.is_finite() {
        return None;
    }

    let candidate = match inp.side {
        Side::Long => inp.entry_price + distance,
        Side::Short => inp.entry_price - distance,
        Side::Flat => return None,
    };

    Some(inp.instrument.round_to_tick(candidate))
}

// =============================================================================
// Continuous ("classic") trail modes
// =============================================================================

/// Per-cycle market context for the continuous modes.
#[derive(Debug, Clone, Copy)]
pub struct TrailContext<'a> {
    pub side: Side,
    pub instrument: &'a Instrument,
    /// High-water mark for longs, low-water for shorts.
    pub water_mark: f64,
    /// Favorable progress from entry, in pips (step mode).
    pub progress_pips: f64,
    /// Latest DEMA over closes, when available (DEMA±ATR mode).
    pub dema: Option<f64>,
    /// Latest Wilder ATR, when available (DEMA±ATR mode).
    pub atr: Option<f64>,
}

/// Compute the continuous-mode stop candidate for the configured mode,
/// quantized to the contract tick. `None` keeps the previous stop.
pub fn continuous_stop(cfg: &TrailingConfig, ctx: &TrailContext) -> Option<f64> {
    if ctx.side == Side::Flat || !ctx.water_mark.is_finite() || ctx.water_mark <= 0.0 {
        return None;
    }

    let distance = match cfg.trail_mode {
        TrailMode::ProfitLock => return None,
        TrailMode::DollarDistance => {
            if ctx.instrument.point_value <= 0.0 || cfg.trail_distance <= 0.0 {
                return None;
            }
            cfg.trail_distance / ctx.instrument.point_value
        }
        TrailMode::PipDistance => {
            let pip = ctx.instrument.pip_size();
            if pip <= 0.0 || cfg.trail_distance <= 0.0 {
                return None;
            }
            cfg.trail_distance * pip
        }
        TrailMode::TickDistance => {
            let tick = ctx.instrument.tick_size;
            if tick <= 0.0 || cfg.trail_distance <= 0.0 {
                return None;
            }
            cfg.trail_distance * tick
        }
        TrailMode::DemaAtr => {
            let atr = ctx.atr.filter(|a| a.is_finite() && *a > 0.0)?;
            let dema = ctx.dema.filter(|d| d.is_finite() && *d > 0.0)?;
            let band = match ctx.side {
                Side::Long => dema - atr * cfg.dema_atr_multiplier,
                Side::Short => dema + atr * cfg.dema_atr_multiplier,
                Side::Flat => return None,
            };
            return Some(ctx.instrument.round_to_tick(band));
        }
        TrailMode::Step => {
            let pip = ctx.instrument.pip_size();
            if pip <= 0.0 {
                return None;
            }
            let rung = select_step_level(&cfg.parsed_step_levels(), ctx.progress_pips)?;
            rung.distance_pips * pip
        }
    };

    let candidate = match ctx.side {
        Side::Long => ctx.water_mark - distance,
        Side::Short => ctx.water_mark + distance,
        Side::Flat => return None,
    };

    Some(ctx.instrument.round_to_tick(candidate))
}

/// Pick the highest rung whose trigger does not exceed the current progress.
/// `levels` must be sorted ascending by trigger.
fn select_step_level(levels: &[StepLevel], progress_pips: f64) -> Option<StepLevel> {
    levels
        .iter()
        .rev()
        .find(|l| l.trigger_pips <= progress_pips)
        .copied()
}

// =============================================================================
// Ratchet
// =============================================================================

/// Enforce stop monotonicity: against a previous stop, a long stop may only
/// rise and a short stop only fall. An unfavorable candidate is replaced by
/// the previous value.
pub fn apply_ratchet(side: Side, candidate: f64, previous: Option<f64>) -> f64 {
    match (side, previous) {
        (Side::Long, Some(prev)) => candidate.max(prev),
        (Side::Short, Some(prev)) => candidate.min(prev),
        _ => candidate,
    }
}
