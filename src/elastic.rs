// =============================================================================
// Elastic profit notifier — level-crossing profit reporting
// =============================================================================
//
// Profit space is divided into levels of `profit_update_threshold` currency
// each. A notification fires only when profit crosses into a strictly higher
// level than the last one reported, and only once profit has cleared the
// minimum-to-report floor. Oscillation inside one level is silent, as is any
// drawdown — levels are never reported downwards.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-position elastic reporting state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElasticTracker {
    /// Profit value at the last reported level boundary.
    pub last_reported: f64,
    /// Number of level notifications sent for this position.
    pub levels_sent: u32,
    /// When the last notification was emitted.
    pub last_update: Option<DateTime<Utc>>,
}

/// A level crossing worth notifying about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCrossing {
    pub profit: f64,
    pub level: i64,
}

impl ElasticTracker {
    /// Feed the current profit; returns the crossing when a new level was
    /// reached. `threshold <= 0` disables emission entirely.
    pub fn observe(
        &mut self,
        profit: f64,
        threshold: f64,
        min_profit_to_report: f64,
        now: DateTime<Utc>,
    ) -> Option<LevelCrossing> {
        if threshold <= 0.0 || !profit.is_finite() {
            return None;
        }
        if profit < min_profit_to_report {
            return None;
        }

        let level = (profit / threshold).floor() as i64;
        let last_level = (self.last_reported / threshold).floor() as i64;
        if level <= last_level {
            return None;
        }

        self.last_reported = level as f64 * threshold;
        self.levels_sent += 1;
        self.last_update = Some(now);
        debug!(profit, level, levels_sent = self.levels_sent, "elastic level crossed");

        Some(LevelCrossing { profit, level })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut ElasticTracker, profits: &[f64]) -> Vec<i64> {
        profits
            .iter()
            .filter_map(|&p| tracker.observe(p, 50.0, 10.0, Utc::now()))
            .map(|c| c.level)
            .collect()
    }

    #[test]
    fn reference_vector_emits_exactly_twice() {
        let mut t = ElasticTracker::default();
        let levels = feed(&mut t, &[5.0, 12.0, 48.0, 52.0, 90.0, 105.0]);
        // 52 crosses level 1, 105 crosses level 2; everything else is silent.
        assert_eq!(levels, vec![1, 2]);
        assert_eq!(t.levels_sent, 2);
        assert!((t.last_reported - 100.0).abs() < 1e-9);
    }

    #[test]
    fn oscillation_inside_a_level_is_silent() {
        let mut t = ElasticTracker::default();
        assert!(t.observe(60.0, 50.0, 10.0, Utc::now()).is_some());
        // Bouncing around level 1 after reporting it: nothing.
        let levels = feed(&mut t, &[55.0, 72.0, 99.0, 61.0]);
        assert!(levels.is_empty());
        assert_eq!(t.levels_sent, 1);
    }

    #[test]
    fn drawdown_never_reports_downwards() {
        let mut t = ElasticTracker::default();
        assert!(t.observe(120.0, 50.0, 10.0, Utc::now()).is_some());
        assert!(t.observe(30.0, 50.0, 10.0, Utc::now()).is_none());
        // Recovering to the already-reported level is still silent.
        assert!(t.observe(110.0, 50.0, 10.0, Utc::now()).is_none());
        // A genuinely new level fires again.
        let crossing = t.observe(155.0, 50.0, 10.0, Utc::now()).unwrap();
        assert_eq!(crossing.level, 3);
    }

    #[test]
    fn min_profit_floor_gates_first_report() {
        let mut t = ElasticTracker::default();
        // Level 1 crossed but the floor (75) is not met.
        assert!(t.observe(60.0, 50.0, 75.0, Utc::now()).is_none());
        assert!(t.observe(80.0, 50.0, 75.0, Utc::now()).is_some());
    }

    #[test]
    fn non_positive_threshold_disables() {
        let mut t = ElasticTracker::default();
        assert!(t.observe(500.0, 0.0, 0.0, Utc::now()).is_none());
        assert!(t.observe(500.0, -10.0, 0.0, Utc::now()).is_none());
        assert_eq!(t.levels_sent, 0);
    }

    #[test]
    fn multi_level_jump_reports_once_at_current_level() {
        let mut t = ElasticTracker::default();
        // Straight to level 4: one notification, anchored at 200.
        let crossing = t.observe(210.0, 50.0, 10.0, Utc::now()).unwrap();
        assert_eq!(crossing.level, 4);
        assert!((t.last_reported - 200.0).abs() < 1e-9);
        assert_eq!(t.levels_sent, 1);
    }
}
