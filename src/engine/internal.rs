// =============================================================================
// Internal trailing engine — simulated stop, close at market on breach
// =============================================================================
//
// No order rests at the venue. Each cycle the engine recomputes the stop for
// every tracked position, ratchets it, and when the level is breached submits
// a market close through the order gateway. The stop level itself only moves
// when both throttle gates pass, so downstream consumers of the stop-update
// events see a bounded stream.
//
// Collaborator failures are logged and never propagated; one broken identity
// never stalls the rest of the cycle.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::activation::{favorable_progress, ActivationGate};
use crate::bars::BarBuffer;
use crate::broker::{MarketData, OrderGateway};
use crate::calc::{self, ProfitLockInputs, TrailContext};
use crate::config::{ProfitUnit, TrailMode, TrailingConfig};
use crate::notify::{Notification, NotificationOutbox};
use crate::position::{PositionSnapshot, Side};
use crate::registry::{StopTracker, TrackerRegistry};
use crate::throttle;

/// Simulated-stop state for one position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalStop {
    pub entry_price: f64,
    /// Effective stop level; only moves on dispatch.
    pub stop_price: Option<f64>,
    /// Last stop level sent downstream.
    pub last_dispatched: Option<f64>,
    pub gate: ActivationGate,
    pub high_water: f64,
    pub low_water: f64,
    pub max_profit: f64,
    pub update_count: u32,
    pub last_update: Option<DateTime<Utc>>,
    /// Profit at the last dispatch, baseline for the dollar throttle.
    pub last_profit: f64,
    /// Price at the last dispatch, baseline for the pip/tick throttle.
    pub last_dispatch_price: Option<f64>,
}

impl InternalStop {
    pub fn new(entry_price: f64) -> Self {
        Self {
            entry_price,
            stop_price: None,
            last_dispatched: None,
            gate: ActivationGate::Inactive,
            high_water: entry_price,
            low_water: entry_price,
            max_profit: 0.0,
            update_count: 0,
            last_update: None,
            last_profit: 0.0,
            last_dispatch_price: None,
        }
    }
}

/// The engine itself: stateless apart from its collaborators.
pub struct InternalTrailingEngine {
    gateway: Arc<dyn OrderGateway>,
    market: Arc<dyn MarketData>,
    bars: Arc<BarBuffer>,
    outbox: NotificationOutbox,
}

impl InternalTrailingEngine {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        market: Arc<dyn MarketData>,
        bars: Arc<BarBuffer>,
        outbox: NotificationOutbox,
    ) -> Self {
        Self {
            gateway,
            market,
            bars,
            outbox,
        }
    }

    /// Run one engine cycle over every tracked identity.
    pub fn run_cycle(
        &self,
        cfg: &TrailingConfig,
        registry: &mut TrackerRegistry,
        positions: &[PositionSnapshot],
        now: DateTime<Utc>,
    ) {
        if !cfg.trailing_enabled || cfg.use_traditional_engine {
            return;
        }

        for tracker in registry.iter_mut() {
            let Some(position) = positions
                .iter()
                .find(|p| p.is_open() && p.matches(&tracker.base_id, &tracker.symbol, tracker.side))
            else {
                // Reconcile owns teardown; nothing to do this cycle.
                continue;
            };

            let Some(price) = self.market.last_price(&tracker.symbol) else {
                debug!(base_id = %tracker.base_id, symbol = %tracker.symbol, "no price, keeping stop");
                continue;
            };
            if !price.is_finite() || price <= 0.0 {
                continue;
            }

            // Attach the stop arm on first sight. A traditional arm under the
            // same identity belongs to the other engine.
            let stop = match &mut tracker.stop {
                Some(StopTracker::Internal(stop)) => stop,
                Some(StopTracker::Traditional(_)) => continue,
                slot @ None => {
                    *slot = Some(StopTracker::Internal(InternalStop::new(tracker.entry_price)));
                    match slot {
                        Some(StopTracker::Internal(stop)) => stop,
                        _ => unreachable!(),
                    }
                }
            };

            let profit = position.unrealized_pnl(price);
            stop.max_profit = stop.max_profit.max(profit);

            // Activation; on the transition, seed both water marks.
            let activated = stop.gate.update(
                &tracker.base_id,
                tracker.side,
                stop.entry_price,
                price,
                profit,
                &position.instrument,
                cfg.unit,
                cfg.trigger_value,
                now,
            );
            if activated {
                stop.high_water = price;
                stop.low_water = price;
            }
            if !stop.gate.is_active() {
                continue;
            }

            stop.high_water = stop.high_water.max(price);
            stop.low_water = stop.low_water.min(price);

            // Candidate, ratcheted against the current level.
            let candidate = match cfg.trail_mode {
                TrailMode::ProfitLock => calc::profit_lock_stop(&ProfitLockInputs {
                    side: tracker.side,
                    entry_price: stop.entry_price,
                    current_price: price,
                    profit,
                    quantity: position.quantity,
                    instrument: &position.instrument,
                    unit: cfg.unit,
                    trigger: cfg.trigger_value,
                    initial: cfg.stop_initial,
                    increment: cfg.stop_increment,
                }),
                _ => {
                    let progress_pips = favorable_progress(
                        tracker.side,
                        stop.entry_price,
                        price,
                        profit,
                        &position.instrument,
                        ProfitUnit::Pips,
                    );
                    calc::continuous_stop(
                        cfg,
                        &TrailContext {
                            side: tracker.side,
                            instrument: &position.instrument,
                            water_mark: match tracker.side {
                                Side::Short => stop.low_water,
                                _ => stop.high_water,
                            },
                            progress_pips,
                            dema: self.bars.dema(&tracker.symbol, cfg.dema_period),
                            atr: self.bars.atr(&tracker.symbol, cfg.atr_period),
                        },
                    )
                }
            };

            if let Some(candidate) = candidate {
                let candidate = calc::apply_ratchet(tracker.side, candidate, stop.stop_price);

                let unit_ok = throttle::should_dispatch(
                    cfg.update_unit,
                    cfg.update_value,
                    stop.last_update,
                    now,
                    profit - stop.last_profit,
                    price - stop.last_dispatch_price.unwrap_or(stop.entry_price),
                    &position.instrument,
                );
                let floor_ok = throttle::stop_change_due(
                    stop.last_dispatched,
                    candidate,
                    position.instrument.tick_size,
                    stop.last_update,
                    now,
                );

                if unit_ok && floor_ok {
                    stop.stop_price = Some(candidate);
                    stop.last_dispatched = Some(candidate);
                    stop.last_update = Some(now);
                    stop.last_profit = profit;
                    stop.last_dispatch_price = Some(price);
                    stop.update_count += 1;
                    info!(
                        base_id = %tracker.base_id,
                        stop = candidate,
                        price,
                        updates = stop.update_count,
                        "internal stop moved"
                    );
                    self.outbox
                        .dispatch(Notification::trailing_stop_update(&tracker.base_id, candidate, price));
                }
            }

            // Breach check against the effective level.
            if let Some(level) = stop.stop_price {
                let breached = match tracker.side {
                    Side::Long => price <= level,
                    Side::Short => price >= level,
                    Side::Flat => false,
                };
                if breached {
                    info!(
                        base_id = %tracker.base_id,
                        stop = level,
                        price,
                        "internal stop hit, closing at market"
                    );
                    match self.gateway.close_at_market(position, "trailing stop hit") {
                        Ok(()) => {
                            // Position close confirmation is the account's
                            // business; reconcile prunes the tracker.
                            tracker.stop = None;
                        }
                        Err(err) => {
                            // Keep the arm; the breach re-fires next cycle.
                            error!(base_id = %tracker.base_id, %err, "market close failed");
                        }
                    }
                }
            }
        }
    }
}
