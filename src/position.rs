// =============================================================================
// Position snapshots pulled from the account collaborator
// =============================================================================
//
// The engines never own a position — each cycle they read an immutable
// snapshot supplied by the account/order collaborator and derive profit and
// progress from it. Snapshots carry an optional natural identity (`base_id`);
// when the upstream fill registration missed, the registry matches by
// instrument + side instead and synthesizes an identity.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
    Flat,
}

impl Side {
    /// +1.0 for long, -1.0 for short, 0.0 for flat.
    pub fn direction(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Flat => 0.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
            Self::Flat => write!(f, "Flat"),
        }
    }
}

/// Read-only view of one live position, refreshed every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Natural identity propagated from the owning strategy, when available.
    pub base_id: Option<String>,
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: f64,
    /// Average entry price.
    pub entry_price: f64,
}

impl PositionSnapshot {
    /// Unrealized profit in account currency at the given price.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.direction() * (price - self.entry_price) * self.quantity
            * self.instrument.point_value
    }

    pub fn is_open(&self) -> bool {
        self.side != Side::Flat && self.quantity > 0.0
    }

    /// True when this snapshot is the position a tracker with the given
    /// identity/symbol/side is following. Natural id wins; instrument + side
    /// is the fallback.
    pub fn matches(&self, base_id: &str, symbol: &str, side: Side) -> bool {
        if let Some(id) = &self.base_id {
            return id == base_id;
        }
        self.instrument.symbol == symbol && self.side == side
    }
}
