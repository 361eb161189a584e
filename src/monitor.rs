// =============================================================================
// Periodic drivers — the trailing loop and the elastic loop
// =============================================================================
//
// Two `tokio::time::interval` loops share one tracker registry behind a tokio
// mutex:
//
//   trailing  (100 ms) — reconcile, orphan cleanup, then whichever trailing
//                        engine the config selects.
//   elastic   (1 s)    — reconcile, then the level-crossing profit sweep.
//
// Each tick runs to completion before the next; registry mutation is
// serialized by the mutex. Config reads clone under a short parking_lot read
// lock so a host can hot-swap settings between ticks. Nothing here persists
// across a restart.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::broker::{MarketData, PositionSource};
use crate::config::TrailingConfig;
use crate::engine::internal::InternalTrailingEngine;
use crate::engine::traditional::TraditionalTrailingEngine;
use crate::notify::{Notification, NotificationOutbox};
use crate::registry::TrackerRegistry;

pub const TRAILING_INTERVAL: Duration = Duration::from_millis(100);
pub const ELASTIC_INTERVAL: Duration = Duration::from_secs(1);

/// Shared state and collaborators for both driver loops.
pub struct TrailingMonitor {
    pub config: Arc<RwLock<TrailingConfig>>,
    pub registry: Arc<Mutex<TrackerRegistry>>,
    pub positions: Arc<dyn PositionSource>,
    pub market: Arc<dyn MarketData>,
    pub internal: InternalTrailingEngine,
    pub traditional: TraditionalTrailingEngine,
    pub outbox: NotificationOutbox,
}

impl TrailingMonitor {
    /// One trailing tick: reconcile, release orphaned orders, run the
    /// selected engine.
    pub async fn trailing_cycle(&self) {
        let cfg = self.config.read().clone();
        if !cfg.trailing_enabled {
            return;
        }
        let positions = self.positions.positions();
        let now = Utc::now();

        let mut registry = self.registry.lock().await;
        let removed = registry.reconcile(
            &positions,
            cfg.elastic_enabled,
            |symbol| self.market.last_price(symbol),
            now,
        );
        if !removed.is_empty() {
            self.traditional.cleanup_orphans(&removed);
        }

        self.internal
            .run_cycle(&cfg, &mut registry, &positions, now);
        self.traditional
            .run_cycle(&cfg, &mut registry, &positions, now)
            .await;
    }

    /// One elastic tick: reconcile, then sweep every elastic arm for level
    /// crossings.
    pub async fn elastic_cycle(&self) {
        let cfg = self.config.read().clone();
        if !cfg.elastic_enabled {
            return;
        }
        let positions = self.positions.positions();
        let now = Utc::now();

        let mut registry = self.registry.lock().await;
        let removed = registry.reconcile(
            &positions,
            cfg.elastic_enabled,
            |symbol| self.market.last_price(symbol),
            now,
        );
        if !removed.is_empty() {
            self.traditional.cleanup_orphans(&removed);
        }

        for tracker in registry.iter_mut() {
            let Some(elastic) = &mut tracker.elastic else {
                continue;
            };
            let Some(position) = positions
                .iter()
                .find(|p| p.is_open() && p.matches(&tracker.base_id, &tracker.symbol, tracker.side))
            else {
                continue;
            };
            let Some(price) = self.market.last_price(&tracker.symbol) else {
                debug!(base_id = %tracker.base_id, "no price for elastic sweep");
                continue;
            };
            let profit = position.unrealized_pnl(price);

            if let Some(crossing) = elastic.observe(
                profit,
                cfg.profit_update_threshold,
                cfg.min_profit_to_report,
                now,
            ) {
                info!(
                    base_id = %tracker.base_id,
                    profit = crossing.profit,
                    level = crossing.level,
                    "elastic profit level reached"
                );
                self.outbox.dispatch(Notification::elastic_update(
                    &tracker.base_id,
                    crossing.profit,
                    crossing.level,
                ));
            }
        }
    }
}

/// 100 ms trailing driver; runs until the task is aborted.
pub async fn run_trailing_monitor(monitor: Arc<TrailingMonitor>) {
    info!(interval_ms = TRAILING_INTERVAL.as_millis() as u64, "trailing monitor started");
    let mut interval = tokio::time::interval(TRAILING_INTERVAL);
    loop {
        interval.tick().await;
        monitor.trailing_cycle().await;
    }
}

/// 1 s elastic driver; runs until the task is aborted.
pub async fn run_elastic_monitor(monitor: Arc<TrailingMonitor>) {
    info!(interval_ms = ELASTIC_INTERVAL.as_millis() as u64, "elastic monitor started");
    let mut interval = tokio::time::interval(ELASTIC_INTERVAL);
    loop {
        interval.tick().await;
        monitor.elastic_cycle().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::BarBuffer;
    use crate::broker::{OrderGateway, OrderId, OrderState, StopOrderRequest};
    use crate::instrument::{Instrument, InstrumentKind};
    use crate::notify::{spawn_dispatcher, NotificationKind, NotificationTransport};
    use crate::position::{PositionSnapshot, Side};
    use anyhow::Result;
    use parking_lot::Mutex as PlMutex;

    struct FakeGateway {
        cancels: PlMutex<Vec<OrderId>>,
    }

    impl OrderGateway for FakeGateway {
        fn submit_stop_order(&self, _request: &StopOrderRequest) -> Result<OrderId> {
            Ok("ord-1".to_string())
        }
        fn cancel_order(&self, order_id: &OrderId) -> Result<()> {
            self.cancels.lock().push(order_id.clone());
            Ok(())
        }
        fn close_at_market(&self, _position: &PositionSnapshot, _reason: &str) -> Result<()> {
            Ok(())
        }
        fn order_state(&self, _order_id: &OrderId) -> OrderState {
            OrderState::Working
        }
    }

    struct FakeMarket {
        price: PlMutex<Option<f64>>,
    }

    impl MarketData for FakeMarket {
        fn last_price(&self, _symbol: &str) -> Option<f64> {
            *self.price.lock()
        }
    }

    struct FakePositions {
        open: PlMutex<Vec<PositionSnapshot>>,
    }

    impl PositionSource for FakePositions {
        fn positions(&self) -> Vec<PositionSnapshot> {
            self.open.lock().clone()
        }
    }

    struct RecordingTransport {
        sent: PlMutex<Vec<Notification>>,
    }

    impl NotificationTransport for RecordingTransport {
        fn send(&self, notification: &Notification) -> Result<(), String> {
            self.sent.lock().push(notification.clone());
            Ok(())
        }
    }

    fn position(entry: f64) -> PositionSnapshot {
        PositionSnapshot {
            base_id: Some("pos-1".to_string()),
            instrument: Instrument::new("TEST", InstrumentKind::Other, 0.01, 1.0),
            side: Side::Long,
            quantity: 1.0,
            entry_price: entry,
        }
    }

    struct Rig {
        monitor: TrailingMonitor,
        market: Arc<FakeMarket>,
        source: Arc<FakePositions>,
        transport: Arc<RecordingTransport>,
    }

    fn rig() -> Rig {
        let gateway = Arc::new(FakeGateway {
            cancels: PlMutex::new(Vec::new()),
        });
        let market = Arc::new(FakeMarket {
            price: PlMutex::new(Some(1000.0)),
        });
        let source = Arc::new(FakePositions {
            open: PlMutex::new(vec![position(1000.0)]),
        });
        let transport = Arc::new(RecordingTransport {
            sent: PlMutex::new(Vec::new()),
        });
        let (outbox, _handle) = spawn_dispatcher(transport.clone(), 64);

        let monitor = TrailingMonitor {
            config: Arc::new(RwLock::new(TrailingConfig::default())),
            registry: Arc::new(Mutex::new(TrackerRegistry::new())),
            positions: source.clone(),
            market: market.clone(),
            internal: InternalTrailingEngine::new(
                gateway.clone(),
                market.clone(),
                Arc::new(BarBuffer::new()),
                outbox.clone(),
            ),
            traditional: TraditionalTrailingEngine::new(gateway.clone(), market.clone(), outbox.clone()),
            outbox,
        };

        Rig {
            monitor,
            market,
            source,
            transport,
        }
    }

    async fn settle(_rig: &Rig) {
        // Give the dispatcher worker a chance to drain the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn elastic_events(rig: &Rig) -> Vec<(f64, i64)> {
        rig.transport
            .sent
            .lock()
            .iter()
            .filter_map(|n| match &n.kind {
                NotificationKind::ElasticUpdate { profit, level, .. } => Some((*profit, *level)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn elastic_cycle_adopts_and_reports_levels() {
        let rig = rig();
        // Profit path [5, 12, 48, 52, 90, 105] with threshold 50, floor 10:
        // only 52 and 105 cross a new level.
        for profit in [5.0, 12.0, 48.0, 52.0, 90.0, 105.0] {
            *rig.market.price.lock() = Some(1000.0 + profit);
            rig.monitor.elastic_cycle().await;
        }
        settle(&rig).await;

        let events = elastic_events(&rig);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, 1);
        assert_eq!(events[1].1, 2);
        assert!((events[0].0 - 52.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn elastic_cycle_respects_disable_flag() {
        let rig = rig();
        rig.monitor.config.write().elastic_enabled = false;
        *rig.market.price.lock() = Some(1105.0);
        rig.monitor.elastic_cycle().await;
        settle(&rig).await;
        assert!(elastic_events(&rig).is_empty());
    }

    #[tokio::test]
    async fn trailing_cycle_runs_reconcile_and_engine() {
        let rig = rig();
        *rig.market.price.lock() = Some(1137.0);
        rig.monitor.trailing_cycle().await;

        let registry = rig.monitor.registry.lock().await;
        assert_eq!(registry.len(), 1);
        let tracker = registry.iter().next().unwrap();
        assert!(tracker.stop.is_some());
        assert!(tracker.elastic.is_some());
    }

    #[tokio::test]
    async fn closed_position_is_pruned_by_either_cycle() {
        let rig = rig();
        *rig.market.price.lock() = Some(1137.0);
        rig.monitor.trailing_cycle().await;
        assert_eq!(rig.monitor.registry.lock().await.len(), 1);

        rig.source.open.lock().clear();
        rig.monitor.elastic_cycle().await;
        assert!(rig.monitor.registry.lock().await.is_empty());
    }
}
