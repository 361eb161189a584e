// =============================================================================
// Position tracker registry — one tracker per position identity
// =============================================================================
//
// A single map from `base_id` to a tracker holding the optional elastic arm
// and the optional stop arm (internal or traditional). One tracker per kind
// per identity, by construction.
//
// Trackers normally appear on fill registration. A reconcile sweep each cycle
// prunes trackers whose position has gone flat (returning them so the caller
// can release any live stop order) and synthesizes a tracker for any live
// position that arrived without one — manual entries, restarts — under a
// `MANUAL_{symbol}_{side}_{HHMMSS}` identity with its entry seeded from the
// current price.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::elastic::ElasticTracker;
use crate::engine::internal::InternalStop;
use crate::engine::traditional::TraditionalStop;
use crate::position::{PositionSnapshot, Side};

/// Stop arm of a tracker: either the internal simulated stop or a real broker
/// stop order managed by the traditional engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopTracker {
    Internal(InternalStop),
    Traditional(TraditionalStop),
}

/// Everything tracked for one position identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionTracker {
    pub base_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    /// True when the identity was synthesized by reconcile rather than
    /// registered on fill.
    pub synthetic: bool,
    pub elastic: Option<ElasticTracker>,
    pub stop: Option<StopTracker>,
}

/// Registry of all live trackers, keyed by `base_id`.
#[derive(Default)]
pub struct TrackerRegistry {
    trackers: HashMap<String, PositionTracker>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn get(&self, base_id: &str) -> Option<&PositionTracker> {
        self.trackers.get(base_id)
    }

    pub fn get_mut(&mut self, base_id: &str) -> Option<&mut PositionTracker> {
        self.trackers.get_mut(base_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionTracker> {
        self.trackers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PositionTracker> {
        self.trackers.values_mut()
    }

    pub fn base_ids(&self) -> Vec<String> {
        self.trackers.keys().cloned().collect()
    }

    /// Register a freshly filled position. Overwrites any stale tracker under
    /// the same identity. The elastic arm is created up front when enabled;
    /// stop arms are attached later by the engines.
    pub fn register_fill(&mut self, base_id: &str, snapshot: &PositionSnapshot, elastic_enabled: bool) {
        if self.trackers.contains_key(base_id) {
            warn!(base_id, "re-registering fill over an existing tracker");
        }
        let tracker = PositionTracker {
            base_id: base_id.to_string(),
            symbol: snapshot.instrument.symbol.clone(),
            side: snapshot.side,
            entry_price: snapshot.entry_price,
            synthetic: false,
            elastic: elastic_enabled.then(ElasticTracker::default),
            stop: None,
        };
        info!(
            base_id,
            symbol = %tracker.symbol,
            side = %tracker.side,
            entry = tracker.entry_price,
            "position tracker registered"
        );
        self.trackers.insert(base_id.to_string(), tracker);
    }

    /// Remove a tracker explicitly, returning it so the caller can release
    /// any live stop order.
    pub fn remove(&mut self, base_id: &str) -> Option<PositionTracker> {
        let removed = self.trackers.remove(base_id);
        if removed.is_some() {
            info!(base_id, "position tracker removed");
        }
        removed
    }

    /// Align trackers with the live position set.
    ///
    /// Prunes trackers whose position is gone or flat and returns them for
    /// orphan-order cleanup. Synthesizes a tracker for any live position that
    /// has none, preferring the snapshot's natural identity and falling back
    /// to a synthetic `MANUAL_` one seeded from the current price.
    pub fn reconcile(
        &mut self,
        positions: &[PositionSnapshot],
        elastic_enabled: bool,
        price_of: impl Fn(&str) -> Option<f64>,
        now: DateTime<Utc>,
    ) -> Vec<PositionTracker> {
        // --- Prune: tracker with no live position behind it ------------------
        let dead: Vec<String> = self
            .trackers
            .values()
            .filter(|t| {
                !positions
                    .iter()
                    .any(|p| p.is_open() && p.matches(&t.base_id, &t.symbol, t.side))
            })
            .map(|t| t.base_id.clone())
            .collect();

        let mut removed = Vec::with_capacity(dead.len());
        for base_id in dead {
            if let Some(tracker) = self.trackers.remove(&base_id) {
                info!(%base_id, synthetic = tracker.synthetic, "pruning tracker for closed position");
                removed.push(tracker);
            }
        }

        // --- Synthesize: live position with no tracker -----------------------
        for position in positions.iter().filter(|p| p.is_open()) {
            let tracked = self
                .trackers
                .values()
                .any(|t| position.matches(&t.base_id, &t.symbol, t.side));
            if tracked {
                continue;
            }

            let symbol = position.instrument.symbol.clone();
            let (base_id, synthetic) = match &position.base_id {
                Some(id) => (id.clone(), false),
                None => (
                    format!("MANUAL_{}_{}_{}", symbol, position.side, now.format("%H%M%S")),
                    true,
                ),
            };
            // Entry for adopted positions is seeded from the current price so
            // progress starts at zero; the real entry is unknowable here.
            let entry_price = if synthetic {
                match price_of(&symbol) {
                    Some(price) => price,
                    None => {
                        debug!(%symbol, "no price for untracked position, deferring adoption");
                        continue;
                    }
                }
            } else {
                position.entry_price
            };

            info!(
                %base_id,
                %symbol,
                side = %position.side,
                entry = entry_price,
                synthetic,
                "adopting untracked position"
            );
            self.trackers.insert(
                base_id.clone(),
                PositionTracker {
                    base_id,
                    symbol,
                    side: position.side,
                    entry_price,
                    synthetic,
                    elastic: elastic_enabled.then(ElasticTracker::default),
                    stop: None,
                },
            );
        }

        removed
    }
}
