// =============================================================================
// Activation gate — a position must earn its trail
// =============================================================================
//
// Each tracked position starts Inactive. Once favorable progress in the
// configured trigger unit reaches the trigger value, the gate flips to Active
// and stays there for the life of the tracker. Before activation no stop is
// computed or dispatched; on the transition the caller seeds both water marks
// from the current price.
//
// Progress is the favorable signed delta clamped at zero — an adverse move
// never activates, regardless of its magnitude.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProfitUnit;
use crate::instrument::Instrument;
use crate::position::Side;

/// One-way activation state. Activation time and price are retained for
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ActivationGate {
    #[default]
    Inactive,
    Active {
        time: DateTime<Utc>,
        price: f64,
    },
}

impl ActivationGate {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Evaluate the gate for this cycle. Returns `true` on the Inactive →
    /// Active transition so the caller can seed its water marks.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        base_id: &str,
        side: Side,
        entry_price: f64,
        current_price: f64,
        profit: f64,
        instrument: &Instrument,
        unit: ProfitUnit,
        trigger: f64,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_active() {
            return false;
        }
        let progress = favorable_progress(side, entry_price, current_price, profit, instrument, unit);
        if progress < trigger {
            return false;
        }

        *self = Self::Active {
            time: now,
            price: current_price,
        };
        info!(
            base_id,
            %side,
            %unit,
            trigger,
            progress,
            price = current_price,
            "trailing stop activated"
        );
        true
    }
}

/// Favorable progress from entry in the given unit, clamped at zero.
pub fn favorable_progress(
    side: Side,
    entry_price: f64,
    current_price: f64,
    profit: f64,
    instrument: &Instrument,
    unit: ProfitUnit,
) -> f64 {
    if entry_price <= 0.0 || !current_price.is_finite() || current_price <= 0.0 {
        return 0.0;
    }
    let favorable = (side.direction() * (current_price - entry_price)).max(0.0);
    match unit {
        ProfitUnit::Dollars => profit.max(0.0),
        ProfitUnit::Pips => instrument.to_pips(favorable),
        ProfitUnit::Ticks => instrument.to_ticks(favorable),
        ProfitUnit::Percent => favorable / entry_price * 100.0,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentKind;

    fn es() -> Instrument {
        Instrument::new("ES", InstrumentKind::Futures, 0.25, 50.0)
    }

    fn tick(
        gate: &mut ActivationGate,
        side: Side,
        entry: f64,
        current: f64,
        profit: f64,
        unit: ProfitUnit,
        trigger: f64,
    ) -> bool {
        gate.update(
            "pos-1",
            side,
            entry,
            current,
            profit,
            &es(),
            unit,
            trigger,
            Utc::now(),
        )
    }

    #[test]
    fn activates_on_tick_trigger() {
        let mut gate = ActivationGate::default();
        // 19 ticks of progress, trigger 20: stays inactive.
        assert!(!tick(&mut gate, Side::Long, 4500.0, 4504.75, 237.5, ProfitUnit::Ticks, 20.0));
        assert!(!gate.is_active());
        // 20 ticks: fires.
        assert!(tick(&mut gate, Side::Long, 4500.0, 4505.0, 250.0, ProfitUnit::Ticks, 20.0));
        assert!(gate.is_active());
    }

    #[test]
    fn activation_is_terminal() {
        let mut gate = ActivationGate::default();
        assert!(tick(&mut gate, Side::Long, 4500.0, 4505.0, 250.0, ProfitUnit::Ticks, 20.0));
        // Price collapses afterwards: still active, no second transition.
        assert!(!tick(&mut gate, Side::Long, 4500.0, 4490.0, -500.0, ProfitUnit::Ticks, 20.0));
        assert!(gate.is_active());
    }

    #[test]
    fn adverse_move_never_activates() {
        let mut gate = ActivationGate::default();
        // A short going against us by 40 ticks: progress clamps at zero.
        assert!(!tick(&mut gate, Side::Short, 4500.0, 4510.0, -500.0, ProfitUnit::Ticks, 20.0));
        assert!(!gate.is_active());
    }

    #[test]
    fn dollar_trigger_uses_currency_profit() {
        let mut gate = ActivationGate::default();
        assert!(!tick(&mut gate, Side::Long, 4500.0, 4501.0, 50.0, ProfitUnit::Dollars, 100.0));
        assert!(tick(&mut gate, Side::Long, 4500.0, 4502.0, 100.0, ProfitUnit::Dollars, 100.0));
    }

    #[test]
    fn percent_progress() {
        let inst = Instrument::new("X", InstrumentKind::Other, 0.01, 1.0);
        let p = favorable_progress(Side::Short, 200.0, 196.0, 4.0, &inst, ProfitUnit::Percent);
        assert!((p - 2.0).abs() < 1e-9);
    }

    #[test]
    fn activation_records_time_and_price() {
        let mut gate = ActivationGate::default();
        tick(&mut gate, Side::Long, 4500.0, 4505.0, 250.0, ProfitUnit::Ticks, 20.0);
        match gate {
            ActivationGate::Active { price, .. } => assert!((price - 4505.0).abs() < 1e-9),
            ActivationGate::Inactive => panic!("gate should be active"),
        }
    }
}
