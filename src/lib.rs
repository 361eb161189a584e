// =============================================================================
// trailguard — elastic profit monitoring and trailing-stop engines
// =============================================================================
//
// Embeddable subsystem that watches live positions and does two jobs:
//
//   1. Elastic profit notifications: report each time unrealized profit
//      crosses into a new level of a configured width.
//   2. Trailing stops: protect open profit with a ratcheting stop, either
//      simulated in memory (close at market on breach) or as a real resting
//      stop order moved by cancel-then-resubmit.
//
// The host supplies the collaborators (order gateway, price feed, position
// source, notification transport) and spawns the two driver loops from
// `monitor`. Everything in between is deterministic and unit-tested.
// =============================================================================

pub mod activation;
pub mod bars;
pub mod broker;
pub mod calc;
pub mod config;
pub mod elastic;
pub mod engine;
pub mod indicators;
pub mod instrument;
pub mod monitor;
pub mod notify;
pub mod position;
pub mod registry;
pub mod throttle;

pub use broker::{MarketData, OrderGateway, OrderId, OrderState, PositionSource, StopOrderRequest};
pub use config::{ProfitUnit, TrailMode, TrailingConfig};
pub use instrument::{Instrument, InstrumentKind};
pub use monitor::{run_elastic_monitor, run_trailing_monitor, TrailingMonitor};
pub use notify::{spawn_dispatcher, Notification, NotificationOutbox, NotificationTransport};
pub use position::{PositionSnapshot, Side};
pub use registry::{PositionTracker, StopTracker, TrackerRegistry};
