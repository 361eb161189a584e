// =============================================================================
// External collaborator seams — orders, prices, positions
// =============================================================================
//
// The engines never talk to a venue directly. Three narrow traits describe
// everything they need from the host process; tests plug in in-memory fakes
// and production wires whatever execution layer it runs against. All methods
// are synchronous — the async drivers call them between awaits and the fakes
// stay trivial.
// =============================================================================

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::position::{PositionSnapshot, Side};

pub type OrderId = String;

/// Lifecycle state of an order as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Submitted,
    Working,
    Accepted,
    Filled,
    CancelPending,
    ChangePending,
    Cancelled,
    Rejected,
    Unknown,
}

impl OrderState {
    /// The order is still resting at the venue and can be cancelled.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Submitted
                | Self::Working
                | Self::Accepted
                | Self::CancelPending
                | Self::ChangePending
        )
    }

    /// The order will never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "Submitted",
            Self::Working => "Working",
            Self::Accepted => "Accepted",
            Self::Filled => "Filled",
            Self::CancelPending => "CancelPending",
            Self::ChangePending => "ChangePending",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
            Self::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

/// Request to place a protective stop-market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopOrderRequest {
    /// Venue-visible order name, e.g. `TRAIL_STOP_{base_id}`.
    pub name: String,
    /// Identity of the position this stop protects.
    pub base_id: String,
    pub symbol: String,
    /// Side of the position being protected. The gateway submits the
    /// opposite-side stop.
    pub position_side: Side,
    pub quantity: f64,
    pub stop_price: f64,
}

/// Order entry and management.
pub trait OrderGateway: Send + Sync {
    fn submit_stop_order(&self, request: &StopOrderRequest) -> Result<OrderId>;

    fn cancel_order(&self, order_id: &OrderId) -> Result<()>;

    /// Flatten the position at market (used when a simulated stop is hit).
    fn close_at_market(&self, position: &PositionSnapshot, reason: &str) -> Result<()>;

    /// Poll the venue-reported state of an order. `Unknown` when the venue
    /// has no record of it.
    fn order_state(&self, order_id: &OrderId) -> OrderState;
}

/// Last-traded price lookup.
pub trait MarketData: Send + Sync {
    /// `None` when the symbol has no resolvable price this cycle.
    fn last_price(&self, symbol: &str) -> Option<f64>;
}

/// Live position snapshots from the account.
pub trait PositionSource: Send + Sync {
    fn positions(&self) -> Vec<PositionSnapshot>;
}
