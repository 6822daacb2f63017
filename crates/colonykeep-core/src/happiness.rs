//! Pure happiness logic - colony-wide morale trends from per-unit stats.
//!
//! The trend snapshot is recomputed from scratch on every evaluation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl Trend {
    /// Three-way comparison of `value` against `pivot`.
    pub fn compare(value: i64, pivot: i64) -> Self {
        match value.cmp(&pivot) {
            std::cmp::Ordering::Greater => Trend::Increasing,
            std::cmp::Ordering::Less => Trend::Decreasing,
            std::cmp::Ordering::Equal => Trend::Stable,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HappinessTrend {
    pub housing: Trend,
    pub saturation: Trend,
    pub guards: Trend,
    /// Penalty applied while workers outnumber guards.
    pub guard_modifier: f64,
}

impl HappinessTrend {
    pub fn stable() -> Self {
        Self::default()
    }
}

/// What one unit contributes to an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnitHappinessInput {
    /// Level of the workplace and whether it is a guard post.
    pub work: Option<(u32, bool)>,
    pub home_level: Option<u32>,
    pub saturation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HappinessThresholds {
    pub well_saturated_limit: i64,
    pub guard_ratio_threshold: i64,
    pub happiness_factor: f64,
}

impl From<&crate::config::ColonyConfig> for HappinessThresholds {
    fn from(config: &crate::config::ColonyConfig) -> Self {
        Self {
            well_saturated_limit: config.well_saturated_limit,
            guard_ratio_threshold: config.guard_ratio_threshold,
            happiness_factor: config.happiness_factor,
        }
    }
}

/// Derive the colony trend from its units.
///
/// Guard and worker sums start at 1 so the relation never divides by zero.
/// An empty population has nothing to trend and comes back all stable.
pub fn evaluate(units: &[UnitHappinessInput], thresholds: &HappinessThresholds) -> HappinessTrend {
    if units.is_empty() {
        return HappinessTrend::stable();
    }

    let mut guards: i64 = 1;
    let mut workers: i64 = 1;
    let mut housing: i64 = 0;
    let mut saturation = 0.0;

    for unit in units {
        match unit.work {
            Some((level, true)) => guards += level as i64,
            Some((level, false)) => workers += level as i64,
            None => {}
        }
        if let Some(level) = unit.home_level {
            housing += level as i64;
        }
        saturation += unit.saturation;
    }

    let count = units.len().max(1) as i64;
    let average_housing = housing / count;
    let average_saturation = (saturation / count as f64) as i64;
    let relation = workers / guards;

    let guards_trend = match relation.cmp(&thresholds.guard_ratio_threshold) {
        std::cmp::Ordering::Greater => Trend::Decreasing,
        std::cmp::Ordering::Less => Trend::Increasing,
        std::cmp::Ordering::Equal => Trend::Stable,
    };
    let guard_modifier = if guards_trend == Trend::Decreasing {
        relation as f64 * thresholds.happiness_factor
    } else {
        0.0
    };

    HappinessTrend {
        housing: Trend::compare(average_housing, 1),
        saturation: Trend::compare(average_saturation, thresholds.well_saturated_limit),
        guards: guards_trend,
        guard_modifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HappinessThresholds {
        HappinessThresholds {
            well_saturated_limit: 5,
            guard_ratio_threshold: 1,
            happiness_factor: 0.1,
        }
    }

    fn unit(work: Option<(u32, bool)>, home_level: Option<u32>, saturation: f64) -> UnitHappinessInput {
        UnitHappinessInput {
            work,
            home_level,
            saturation,
        }
    }

    #[test]
    fn test_empty_population_is_stable() {
        let trend = evaluate(&[], &thresholds());
        assert_eq!(trend, HappinessTrend::stable());
    }

    #[test]
    fn test_housing_trend() {
        let t = thresholds();
        let well_housed = [unit(None, Some(2), 5.0), unit(None, Some(3), 5.0)];
        assert_eq!(evaluate(&well_housed, &t).housing, Trend::Increasing);

        let level_one = [unit(None, Some(1), 5.0)];
        assert_eq!(evaluate(&level_one, &t).housing, Trend::Stable);

        // 1 / 2 rounds down to zero.
        let homeless = [unit(None, Some(1), 5.0), unit(None, None, 5.0)];
        assert_eq!(evaluate(&homeless, &t).housing, Trend::Decreasing);
    }

    #[test]
    fn test_saturation_truncates_average() {
        let t = thresholds();
        // Average 5.9 truncates to 5 which equals the limit.
        let units = [unit(None, None, 5.9), unit(None, None, 5.9)];
        assert_eq!(evaluate(&units, &t).saturation, Trend::Stable);

        let hungry = [unit(None, None, 2.0)];
        assert_eq!(evaluate(&hungry, &t).saturation, Trend::Decreasing);

        let fed = [unit(None, None, 9.0)];
        assert_eq!(evaluate(&fed, &t).saturation, Trend::Increasing);
    }

    #[test]
    fn test_too_few_guards_lowers_guard_trend() {
        let t = thresholds();
        // workers = 1 + 3 + 3 = 7, guards = 1 + 1 = 2, relation = 3.
        let units = [
            unit(Some((3, false)), None, 5.0),
            unit(Some((3, false)), None, 5.0),
            unit(Some((1, true)), None, 5.0),
        ];
        let trend = evaluate(&units, &t);
        assert_eq!(trend.guards, Trend::Decreasing);
        assert!((trend.guard_modifier - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_guard_heavy_colony_raises_guard_trend() {
        let t = thresholds();
        // workers = 1, guards = 1 + 4, relation = 0.
        let units = [unit(Some((4, true)), None, 5.0)];
        let trend = evaluate(&units, &t);
        assert_eq!(trend.guards, Trend::Increasing);
        assert_eq!(trend.guard_modifier, 0.0);
    }

    #[test]
    fn test_balanced_guards_is_stable() {
        let t = thresholds();
        let units = [unit(Some((2, false)), None, 5.0), unit(Some((2, true)), None, 5.0)];
        assert_eq!(evaluate(&units, &t).guards, Trend::Stable);
    }
}
