//! Numeric knobs supplied at initialization.
//!
//! Every field has a default so a partial JSON document only needs to name
//! what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables shared by every settlement in one coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    /// Hard ceiling on units per settlement; capacity is the smaller of this
    /// and the settlement's stored ceiling.
    pub max_units_per_settlement: u32,
    /// Respawn keeps running while population is below this.
    pub initial_unit_amount: u32,
    /// Base respawn interval in seconds.
    pub respawn_interval_secs: i64,
    pub ticks_per_second: i64,
    /// Ticks taken off the respawn interval per anchor level.
    pub respawn_bonus_per_anchor_level: i64,
    pub cleanup_tick_increment: u64,
    pub happiness_tick_increment: u64,
    pub orphan_sweep_tick_increment: u64,
    /// Inner (owning) claim radius in cells.
    pub working_radius: i32,
    /// Width of the interest-only ring around the owning box.
    pub padding: i32,
    /// Cells this close to the centre are written directly when resident.
    pub load_immediately_distance: i32,
    /// Max distance from the settlement centre for building claims, 0 = no limit.
    pub dynamic_working_range: i32,
    pub well_saturated_limit: i64,
    pub guard_ratio_threshold: i64,
    pub happiness_factor: f64,
    pub orphan_distance_multiplier: i32,
    pub fix_orphaned_cells: bool,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            max_units_per_settlement: 50,
            initial_unit_amount: 4,
            respawn_interval_secs: 30,
            ticks_per_second: 20,
            respawn_bonus_per_anchor_level: 60,
            cleanup_tick_increment: 100,
            happiness_tick_increment: 24_000,
            orphan_sweep_tick_increment: 1_200,
            working_radius: 8,
            padding: 8,
            load_immediately_distance: 5,
            dynamic_working_range: 12,
            well_saturated_limit: 5,
            guard_ratio_threshold: 1,
            happiness_factor: 0.1,
            orphan_distance_multiplier: 5,
            fix_orphaned_cells: true,
        }
    }
}

impl ColonyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values that would make a cadence or the box geometry meaningless.
    ///
    /// A respawn interval that goes negative at high anchor levels is not
    /// rejected here; the coordinator reports it when it happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second <= 0 {
            return Err(ConfigError::Invalid("ticks_per_second must be positive".into()));
        }
        if self.cleanup_tick_increment == 0
            || self.happiness_tick_increment == 0
            || self.orphan_sweep_tick_increment == 0
        {
            return Err(ConfigError::Invalid("tick increments must be non-zero".into()));
        }
        if self.working_radius < 0 || self.padding < 0 || self.load_immediately_distance < 0 {
            return Err(ConfigError::Invalid("claim radii must not be negative".into()));
        }
        Ok(())
    }

    /// Respawn interval in ticks for an anchor level, unclamped.
    pub fn respawn_interval(&self, anchor_level: u32) -> i64 {
        self.respawn_interval_secs * self.ticks_per_second
            - self.respawn_bonus_per_anchor_level * anchor_level as i64
    }

    /// Interest entries for settlements farther than this are orphaned.
    pub fn orphan_distance(&self) -> f64 {
        (self.working_radius * 2 * self.orphan_distance_multiplier) as f64
    }
}
