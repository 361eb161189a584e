// =============================================================================
// Trailing & Elastic Configuration — Hot-reloadable settings with atomic save
// =============================================================================
//
// Every tunable for the elastic notifier and the two trailing engines lives
// here so a host process can reconfigure the subsystem at runtime without a
// restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// =============================================================================
// Unit systems & trail modes
// =============================================================================

/// Unit system for profit triggers, stop offsets, and throttle thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProfitUnit {
    #[default]
    Dollars,
    Pips,
    Ticks,
    Percent,
}

impl std::fmt::Display for ProfitUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dollars => write!(f, "Dollars"),
            Self::Pips => write!(f, "Pips"),
            Self::Ticks => write!(f, "Ticks"),
            Self::Percent => write!(f, "Percent"),
        }
    }
}

/// How the stop level is derived once a tracker is active.
///
/// `ProfitLock` is the stepped profit-locking ratchet; the remaining modes
/// trail continuously off the water marks (or the DEMA/ATR band).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrailMode {
    #[default]
    ProfitLock,
    DollarDistance,
    PipDistance,
    TickDistance,
    DemaAtr,
    Step,
}

impl std::fmt::Display for TrailMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfitLock => write!(f, "ProfitLock"),
            Self::DollarDistance => write!(f, "DollarDistance"),
            Self::PipDistance => write!(f, "PipDistance"),
            Self::TickDistance => write!(f, "TickDistance"),
            Self::DemaAtr => write!(f, "DemaAtr"),
            Self::Step => write!(f, "Step"),
        }
    }
}

// =============================================================================
// Step ladder
// =============================================================================

/// One rung of the step-trail ladder: once progress reaches `trigger_pips`,
/// trail at `distance_pips` behind the water mark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepLevel {
    pub trigger_pips: f64,
    pub distance_pips: f64,
}

/// Parse a step ladder from its CSV form, e.g. `"20:10,40:20,60:30"`.
///
/// Malformed pairs are skipped with a warning rather than failing the whole
/// ladder. Rungs are returned sorted ascending by trigger.
pub fn parse_step_levels(csv: &str) -> Vec<StepLevel> {
    let mut levels: Vec<StepLevel> = Vec::new();

    for pair in csv.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, ':');
        let trigger = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
        let distance = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
        match (trigger, distance) {
            (Some(t), Some(d)) if t.is_finite() && d.is_finite() && t >= 0.0 && d > 0.0 => {
                levels.push(StepLevel {
                    trigger_pips: t,
                    distance_pips: d,
                });
            }
            _ => {
                warn!(pair, "skipping malformed step-trail level");
            }
        }
    }

    levels.sort_by(|a, b| a.trigger_pips.total_cmp(&b.trigger_pips));
    levels
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_profit_update_threshold() -> f64 {
    50.0
}

fn default_min_profit_to_report() -> f64 {
    10.0
}

fn default_trigger_value() -> f64 {
    100.0
}

fn default_stop_initial() -> f64 {
    50.0
}

fn default_stop_increment() -> f64 {
    10.0
}

fn default_update_value() -> f64 {
    25.0
}

fn default_trail_distance() -> f64 {
    50.0
}

fn default_dema_atr_multiplier() -> f64 {
    1.5
}

fn default_atr_period() -> usize {
    14
}

fn default_dema_period() -> usize {
    21
}

fn default_step_levels() -> String {
    "20:10,40:20,60:30".to_string()
}

// =============================================================================
// TrailingConfig
// =============================================================================

/// Top-level configuration for the elastic notifier and trailing engines.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    // --- Elastic profit notifier ---------------------------------------------

    /// Whether elastic profit notifications are emitted at all.
    #[serde(default = "default_true")]
    pub elastic_enabled: bool,

    /// Currency width of one reporting level. A new notification fires each
    /// time profit crosses into a higher multiple of this. `<= 0` disables.
    #[serde(default = "default_profit_update_threshold")]
    pub profit_update_threshold: f64,

    /// Minimum currency profit before any elastic notification is sent.
    #[serde(default = "default_min_profit_to_report")]
    pub min_profit_to_report: f64,

    // --- Trailing stops ------------------------------------------------------

    /// Master switch for both trailing engines.
    #[serde(default = "default_true")]
    pub trailing_enabled: bool,

    /// When true, stops are real broker orders managed by the traditional
    /// engine; otherwise the internal engine simulates the stop and closes
    /// at market on breach.
    #[serde(default)]
    pub use_traditional_engine: bool,

    /// Stop derivation mode once active.
    #[serde(default)]
    pub trail_mode: TrailMode,

    /// Unit system for the activation trigger and profit-lock offsets.
    #[serde(default)]
    pub unit: ProfitUnit,

    /// Activation trigger in `unit`. Progress must reach this before any stop
    /// is computed or dispatched.
    #[serde(default = "default_trigger_value")]
    pub trigger_value: f64,

    /// Initial protected amount in `unit` once active (profit-lock mode).
    #[serde(default = "default_stop_initial")]
    pub stop_initial: f64,

    /// Ratchet step in `unit`: each time progress clears another increment,
    /// the protected amount grows by this much (profit-lock mode).
    #[serde(default = "default_stop_increment")]
    pub stop_increment: f64,

    // --- Dispatch throttle ---------------------------------------------------

    /// Unit system for the dispatch throttle. Percent is reinterpreted as a
    /// minimum interval in seconds.
    #[serde(default)]
    pub update_unit: ProfitUnit,

    /// Threshold in `update_unit` a change must reach before a stop update is
    /// dispatched.
    #[serde(default = "default_update_value")]
    pub update_value: f64,

    // --- Continuous-mode parameters ------------------------------------------

    /// Trail distance for the continuous distance modes, in the mode's own
    /// unit (dollars, pips, or ticks).
    #[serde(default = "default_trail_distance")]
    pub trail_distance: f64,

    /// ATR multiplier for the DEMA±ATR band.
    #[serde(default = "default_dema_atr_multiplier")]
    pub dema_atr_multiplier: f64,

    /// ATR look-back period for the DEMA±ATR band.
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// DEMA look-back period for the DEMA±ATR band.
    #[serde(default = "default_dema_period")]
    pub dema_period: usize,

    /// Step-trail ladder as CSV `trigger:distance` pairs in pips.
    #[serde(default = "default_step_levels")]
    pub step_levels: String,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            elastic_enabled: true,
            profit_update_threshold: default_profit_update_threshold(),
            min_profit_to_report: default_min_profit_to_report(),
            trailing_enabled: true,
            use_traditional_engine: false,
            trail_mode: TrailMode::ProfitLock,
            unit: ProfitUnit::Dollars,
            trigger_value: default_trigger_value(),
            stop_initial: default_stop_initial(),
            stop_increment: default_stop_increment(),
            update_unit: ProfitUnit::Dollars,
            update_value: default_update_value(),
            trail_distance: default_trail_distance(),
            dema_atr_multiplier: default_dema_atr_multiplier(),
            atr_period: default_atr_period(),
            dema_period: default_dema_period(),
            step_levels: default_step_levels(),
        }
    }
}

impl TrailingConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trailing config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse trailing config from {}", path.display()))?;

        info!(
            path = %path.display(),
            trail_mode = %config.trail_mode,
            unit = %config.unit,
            elastic_enabled = config.elastic_enabled,
            "trailing config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise trailing config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "trailing config saved (atomic)");
        Ok(())
    }

    /// The step ladder in parsed, sorted form.
    pub fn parsed_step_levels(&self) -> Vec<StepLevel> {
        parse_step_levels(&self.step_levels)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = TrailingConfig::default();
        assert!(cfg.elastic_enabled);
        assert!(cfg.trailing_enabled);
        assert!(!cfg.use_traditional_engine);
        assert_eq!(cfg.trail_mode, TrailMode::ProfitLock);
        assert_eq!(cfg.unit, ProfitUnit::Dollars);
        assert!((cfg.trigger_value - 100.0).abs() < f64::EPSILON);
        assert!((cfg.stop_initial - 50.0).abs() < f64::EPSILON);
        assert!((cfg.stop_increment - 10.0).abs() < f64::EPSILON);
        assert!((cfg.profit_update_threshold - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: TrailingConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.elastic_enabled);
        assert_eq!(cfg.trail_mode, TrailMode::ProfitLock);
        assert_eq!(cfg.update_unit, ProfitUnit::Dollars);
        assert!((cfg.update_value - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "trail_mode": "DemaAtr", "use_traditional_engine": true }"#;
        let cfg: TrailingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trail_mode, TrailMode::DemaAtr);
        assert!(cfg.use_traditional_engine);
        assert_eq!(cfg.atr_period, 14);
        assert_eq!(cfg.dema_period, 21);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = TrailingConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: TrailingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.trail_mode, cfg2.trail_mode);
        assert_eq!(cfg.unit, cfg2.unit);
        assert_eq!(cfg.step_levels, cfg2.step_levels);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trailing.json");

        let mut cfg = TrailingConfig::default();
        cfg.trigger_value = 250.0;
        cfg.trail_mode = TrailMode::Step;
        cfg.save(&path).unwrap();

        let loaded = TrailingConfig::load(&path).unwrap();
        assert!((loaded.trigger_value - 250.0).abs() < f64::EPSILON);
        assert_eq!(loaded.trail_mode, TrailMode::Step);
    }

    // ---- step ladder parsing ----------------------------------------------

    #[test]
    fn step_levels_parse_and_sort() {
        let levels = parse_step_levels("40:20, 20:10 ,60:30");
        assert_eq!(levels.len(), 3);
        assert!((levels[0].trigger_pips - 20.0).abs() < f64::EPSILON);
        assert!((levels[1].trigger_pips - 40.0).abs() < f64::EPSILON);
        assert!((levels[2].distance_pips - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_levels_skip_malformed_pairs() {
        let levels = parse_step_levels("20:10,garbage,40:,:,60:30,50:-5");
        assert_eq!(levels.len(), 2);
        assert!((levels[0].trigger_pips - 20.0).abs() < f64::EPSILON);
        assert!((levels[1].trigger_pips - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_levels_empty_string() {
        assert!(parse_step_levels("").is_empty());
        assert!(parse_step_levels(" , , ").is_empty());
    }
}
