// =============================================================================
// Traditional trailing engine — real stop orders, cancel-then-resubmit
// =============================================================================
//
// The stop is a resting stop-market order at the venue, one per identity.
// Moving it is always cancel-then-resubmit, never an amend: cancel, poll for
// the cancel acknowledgement (bounded), then submit at the new level. The
// `pending_modification` flag guards against re-entering a half-finished
// move.
//
// Venue-side failures get a bounded retry: an order that comes back
// Cancelled or Rejected outside a modification is resubmitted at its last
// level, and after three failed attempts the tracker is torn down rather
// than hammering the venue. Trackers whose position closed underneath them
// get their surviving order cancelled exactly once via the reconcile sweep.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::activation::favorable_progress;
use crate::broker::{MarketData, OrderGateway, OrderId, OrderState, StopOrderRequest};
use crate::calc::{self, ProfitLockInputs};
use crate::config::TrailingConfig;
use crate::instrument::Instrument;
use crate::notify::{Notification, NotificationOutbox};
use crate::position::{PositionSnapshot, Side};
use crate::registry::{PositionTracker, StopTracker, TrackerRegistry};
use crate::throttle::MIN_DISPATCH_MS;

/// Consecutive venue failures tolerated before the tracker is torn down.
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// How often the cancel acknowledgement is polled.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for a cancel acknowledgement before giving up on the
/// modification for this cycle.
const CANCEL_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker-stop state for one position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraditionalStop {
    pub entry_price: f64,
    /// Level of the currently resting (or last submitted) order.
    pub last_stop_price: f64,
    /// The live order, when one is resting.
    pub order: Option<OrderId>,
    pub modification_count: u32,
    /// A cancel-then-resubmit is in flight.
    pub pending_modification: bool,
    pub failed_attempts: u32,
    pub max_profit: f64,
    pub activation_time: DateTime<Utc>,
    pub activation_price: f64,
    pub last_modification: Option<DateTime<Utc>>,
}

pub struct TraditionalTrailingEngine {
    gateway: Arc<dyn OrderGateway>,
    market: Arc<dyn MarketData>,
    outbox: NotificationOutbox,
}

impl TraditionalTrailingEngine {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        market: Arc<dyn MarketData>,
        outbox: NotificationOutbox,
    ) -> Self {
        Self {
            gateway,
            market,
            outbox,
        }
    }

    /// Run one engine cycle over every tracked identity.
    pub async fn run_cycle(
        &self,
        cfg: &TrailingConfig,
        registry: &mut TrackerRegistry,
        positions: &[PositionSnapshot],
        now: DateTime<Utc>,
    ) {
        if !cfg.trailing_enabled || !cfg.use_traditional_engine {
            return;
        }

        let mut torn_down: Vec<String> = Vec::new();

        for base_id in registry.base_ids() {
            let Some(tracker) = registry.get_mut(&base_id) else {
                continue;
            };
            let Some(position) = positions
                .iter()
                .find(|p| p.is_open() && p.matches(&tracker.base_id, &tracker.symbol, tracker.side))
            else {
                continue;
            };
            let Some(price) = self.market.last_price(&tracker.symbol) else {
                debug!(%base_id, "no price, skipping cycle");
                continue;
            };
            if !price.is_finite() || price <= 0.0 {
                continue;
            }
            let profit = position.unrealized_pnl(price);

            match &mut tracker.stop {
                None => {
                    self.try_arm(cfg, tracker, position, price, profit, now);
                }
                Some(StopTracker::Internal(_)) => continue,
                Some(StopTracker::Traditional(_)) => {
                    if self
                        .manage_order(cfg, tracker, position, price, profit, now)
                        .await
                    {
                        torn_down.push(base_id);
                    }
                }
            }
        }

        for base_id in torn_down {
            registry.remove(&base_id);
        }
    }

    /// Attach a broker stop once the position has earned it.
    fn try_arm(
        &self,
        cfg: &TrailingConfig,
        tracker: &mut PositionTracker,
        position: &PositionSnapshot,
        price: f64,
        profit: f64,
        now: DateTime<Utc>,
    ) {
        let progress = favorable_progress(
            tracker.side,
            tracker.entry_price,
            price,
            profit,
            &position.instrument,
            cfg.unit,
        );
        if progress < cfg.trigger_value {
            return;
        }

        let Some(candidate) = calc::profit_lock_stop(&ProfitLockInputs {
            side: tracker.side,
            entry_price: tracker.entry_price,
            current_price: price,
            profit,
            quantity: position.quantity,
            instrument: &position.instrument,
            unit: cfg.unit,
            trigger: cfg.trigger_value,
            initial: cfg.stop_initial,
            increment: cfg.stop_increment,
        }) else {
            return;
        };
        // The first stop never locks a loss: worst case is breakeven.
        let stop_price = clamp_to_entry(tracker.side, candidate, tracker.entry_price, &position.instrument);

        let request = stop_request(tracker_view(tracker), position, stop_price);
        match self.gateway.submit_stop_order(&request) {
            Ok(order_id) => {
                info!(
                    base_id = %tracker.base_id,
                    %order_id,
                    stop = stop_price,
                    price,
                    "trailing stop order placed"
                );
                tracker.stop = Some(StopTracker::Traditional(TraditionalStop {
                    entry_price: tracker.entry_price,
                    last_stop_price: stop_price,
                    order: Some(order_id),
                    modification_count: 0,
                    pending_modification: false,
                    failed_attempts: 0,
                    max_profit: profit,
                    activation_time: now,
                    activation_price: price,
                    last_modification: None,
                }));
                self.outbox
                    .dispatch(Notification::trailing_stop_update(&tracker.base_id, stop_price, price));
            }
            Err(err) => {
                // Nothing armed yet; the next cycle tries again.
                error!(base_id = %tracker.base_id, %err, "stop order submission failed");
            }
        }
    }

    /// Drive the resting order through its lifecycle. Returns `true` when the
    /// tracker should be torn down.
    async fn manage_order(
        &self,
        cfg: &TrailingConfig,
        tracker: &mut PositionTracker,
        position: &PositionSnapshot,
        price: f64,
        profit: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(StopTracker::Traditional(stop)) = &mut tracker.stop else {
            return false;
        };
        stop.max_profit = stop.max_profit.max(profit);

        let state = match &stop.order {
            Some(order_id) => self.gateway.order_state(order_id),
            None => OrderState::Cancelled,
        };

        match state {
            OrderState::Filled => {
                info!(
                    base_id = %tracker.base_id,
                    stop = stop.last_stop_price,
                    max_profit = stop.max_profit,
                    "stop order filled, position stopped out"
                );
                return true;
            }
            OrderState::Cancelled | OrderState::Rejected if !stop.pending_modification => {
                stop.failed_attempts += 1;
                if stop.failed_attempts >= MAX_FAILED_ATTEMPTS {
                    error!(
                        base_id = %tracker.base_id,
                        attempts = stop.failed_attempts,
                        "stop order failed repeatedly, abandoning tracker"
                    );
                    return true;
                }
                warn!(
                    base_id = %tracker.base_id,
                    %state,
                    attempt = stop.failed_attempts,
                    "stop order lost, resubmitting"
                );
                let request = stop_request(tracker_view(tracker), position, level_of(tracker));
                let Some(StopTracker::Traditional(stop)) = &mut tracker.stop else {
                    return false;
                };
                match self.gateway.submit_stop_order(&request) {
                    Ok(order_id) => stop.order = Some(order_id),
                    Err(err) => {
                        error!(base_id = %tracker.base_id, %err, "resubmission failed");
                        stop.order = None;
                    }
                }
                return false;
            }
            OrderState::Submitted | OrderState::Working | OrderState::Accepted => {}
            // CancelPending, ChangePending, Unknown, or a terminal state
            // mid-modification: let it settle.
            _ => return false,
        }

        if stop.pending_modification {
            return false;
        }

        // Recompute and decide whether the move is worth a modification.
        let Some(candidate) = calc::profit_lock_stop(&ProfitLockInputs {
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
        }) else {
            return false;
        };
        let candidate = calc::apply_ratchet(tracker.side, candidate, Some(stop.last_stop_price));

        let min_move = if position.instrument.tick_size > 0.0 {
            position.instrument.tick_size
        } else {
            f64::EPSILON
        };
        let favorable = (candidate - stop.last_stop_price).abs() >= min_move - 1e-12;
        let aged = stop
            .last_modification
            .map_or(true, |last| (now - last).num_milliseconds() >= MIN_DISPATCH_MS);
        if !favorable || !aged {
            return false;
        }

        // Cancel, wait for the acknowledgement, resubmit at the new level.
        let Some(order_id) = stop.order.clone() else {
            return false;
        };
        stop.pending_modification = true;

        if let Err(err) = self.gateway.cancel_order(&order_id) {
            error!(base_id = %tracker.base_id, %err, "cancel for modification failed");
            stop.pending_modification = false;
            return false;
        }

        if !self.wait_for_cancel(&order_id).await {
            // Could be a late fill or a slow venue; settle it next cycle.
            warn!(base_id = %tracker.base_id, %order_id, "cancel not acknowledged in time");
            let Some(StopTracker::Traditional(stop)) = &mut tracker.stop else {
                return false;
            };
            stop.pending_modification = false;
            return false;
        }

        let request = stop_request(tracker_view(tracker), position, candidate);
        let base_id = tracker.base_id.clone();
        let Some(StopTracker::Traditional(stop)) = &mut tracker.stop else {
            return false;
        };
        match self.gateway.submit_stop_order(&request) {
            Ok(new_order_id) => {
                info!(
                    base_id = %base_id,
                    order_id = %new_order_id,
                    from = stop.last_stop_price,
                    to = candidate,
                    "trailing stop moved"
                );
                stop.order = Some(new_order_id);
                stop.last_stop_price = candidate;
                stop.modification_count += 1;
                stop.last_modification = Some(now);
                stop.pending_modification = false;
                self.outbox
                    .dispatch(Notification::trailing_stop_update(&base_id, candidate, price));
            }
            Err(err) => {
                // Cancelled but not replaced; the retry path re-arms it.
                error!(base_id = %base_id, %err, "resubmission after cancel failed");
                stop.order = None;
                stop.failed_attempts += 1;
                stop.pending_modification = false;
            }
        }
        false
    }

    /// Poll for the cancel acknowledgement, bounded by `CANCEL_ACK_TIMEOUT`.
    async fn wait_for_cancel(&self, order_id: &OrderId) -> bool {
        let deadline = tokio::time::Instant::now() + CANCEL_ACK_TIMEOUT;
        loop {
            match self.gateway.order_state(order_id) {
                OrderState::Cancelled => return true,
                OrderState::Filled | OrderState::Rejected => return false,
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
        }
    }

    /// Cancel surviving orders of trackers whose position closed underneath
    /// them. Each tracker passes through here exactly once, straight from the
    /// reconcile sweep.
    pub fn cleanup_orphans(&self, removed: &[PositionTracker]) {
        for tracker in removed {
            let Some(StopTracker::Traditional(stop)) = &tracker.stop else {
                continue;
            };
            let Some(order_id) = &stop.order else {
                continue;
            };
            if !self.gateway.order_state(order_id).is_live() {
                continue;
            }
            match self.gateway.cancel_order(order_id) {
                Ok(()) => {
                    info!(base_id = %tracker.base_id, %order_id, "orphaned stop order cancelled");
                }
                Err(err) => {
                    error!(base_id = %tracker.base_id, %order_id, %err, "orphan cancel failed");
                }
            }
        }
    }
}

fn stop_request(
    (base_id, side, symbol): (&str, Side, &str),
    position: &PositionSnapshot,
    stop_price: f64,
) -> StopOrderRequest {
    StopOrderRequest {
        name: format!("TRAIL_STOP_{base_id}"),
        base_id: base_id.to_string(),
        symbol: symbol.to_string(),
        position_side: side,
        quantity: position.quantity,
        stop_price,
    }
}

fn tracker_view(tracker: &PositionTracker) -> (&str, Side, &str) {
    (&tracker.base_id, tracker.side, &tracker.symbol)
}

fn level_of(tracker: &PositionTracker) -> f64 {
    match &tracker.stop {
        Some(StopTracker::Traditional(stop)) => stop.last_stop_price,
        _ => 0.0,
    }
}

fn clamp_to_entry(side: Side, candidate: f64, entry_price: f64, instrument: &Instrument) -> f64 {
    let clamped = match side {
        Side::Long => candidate.max(entry_price),
        Side::Short => candidate.min(entry_price),
        Side::Flat => candidate,
    };
    instrument.round_to_tick(clamped)
}
