//! Exit configuration and regime-adjusted thresholds.
//!
//! Breakeven threshold and offset scale by `breakeven_mult`; trailing
//! distance and trailing minimum profit scale by `trailing_mult`. Scaled
//! values are rounded to whole ticks and floored so no regime can produce
//! an exit that triggers on noise.

use serde::{Deserialize, Serialize};

use crate::regime::{MultiplierSource, RegimeLabel, RegimeMultipliers};

/// Hard floor for the breakeven threshold, in ticks.
pub const MIN_BREAKEVEN_TICKS: f64 = 5.0;
/// Hard floor for the trailing distance, in ticks.
pub const MIN_TRAILING_DISTANCE_TICKS: f64 = 6.0;
/// Hard floor for the profit required before trailing starts, in ticks.
pub const MIN_TRAILING_PROFIT_TICKS: f64 = 5.0;

/// Tighten the stop once a fraction of the maximum hold has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDecayStage {
    /// Fraction of `max_hold_minutes` (0.5 = halfway).
    pub elapsed_fraction: f64,
    /// Fraction by which the close-to-stop distance shrinks when the stage is
    /// reached. The trailing distance stays scaled by it from then on.
    pub tighten_fraction: f64,
}

/// Close part of the remaining position at an R-multiple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialExitMilestone {
    pub r_multiple: f64,
    /// Fraction of the *remaining* quantity; 1.0 closes everything left.
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub initial_stop_ticks: f64,
    pub target_ticks: f64,
    pub breakeven_threshold_ticks: f64,
    pub breakeven_offset_ticks: f64,
    pub trailing_distance_ticks: f64,
    pub trailing_min_profit_ticks: f64,
    pub time_decay_stages: Vec<TimeDecayStage>,
    pub partial_exits: Vec<PartialExitMilestone>,
    pub max_hold_minutes: f64,
}

impl ExitConfig {
    /// Trailing distance scale after `stages_reached` time-decay stages.
    pub fn trailing_decay_factor(&self, stages_reached: usize) -> f64 {
        stages_reached
            .checked_sub(1)
            .and_then(|i| self.time_decay_stages.get(i))
            .map_or(1.0, |stage| 1.0 - stage.tighten_fraction)
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            initial_stop_ticks: 8.0,
            target_ticks: 48.0,
            breakeven_threshold_ticks: 8.0,
            breakeven_offset_ticks: 1.0,
            trailing_distance_ticks: 10.0,
            trailing_min_profit_ticks: 12.0,
            time_decay_stages: vec![
                TimeDecayStage {
                    elapsed_fraction: 0.5,
                    tighten_fraction: 0.10,
                },
                TimeDecayStage {
                    elapsed_fraction: 0.75,
                    tighten_fraction: 0.20,
                },
                TimeDecayStage {
                    elapsed_fraction: 0.90,
                    tighten_fraction: 0.30,
                },
            ],
            partial_exits: vec![
                PartialExitMilestone {
                    r_multiple: 2.0,
                    fraction: 0.33,
                },
                PartialExitMilestone {
                    r_multiple: 3.0,
                    fraction: 0.50,
                },
                PartialExitMilestone {
                    r_multiple: 5.0,
                    fraction: 1.0,
                },
            ],
            max_hold_minutes: 240.0,
        }
    }
}

/// Thresholds in force for one bar, after regime scaling and floors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveThresholds {
    pub regime: RegimeLabel,
    pub breakeven_threshold_ticks: f64,
    pub breakeven_offset_ticks: f64,
    pub trailing_distance_ticks: f64,
    pub trailing_min_profit_ticks: f64,
}

impl EffectiveThresholds {
    pub fn derive(config: &ExitConfig, mult: RegimeMultipliers) -> Self {
        let breakeven_threshold_ticks =
            (config.breakeven_threshold_ticks * mult.breakeven_mult)
                .round()
                .max(MIN_BREAKEVEN_TICKS);
        // The offset must stay below the threshold, or arming would lock in
        // more profit than the position has.
        let breakeven_offset_ticks = (config.breakeven_offset_ticks * mult.breakeven_mult)
            .round()
            .clamp(0.0, breakeven_threshold_ticks - 1.0);
        let trailing_distance_ticks = (config.trailing_distance_ticks * mult.trailing_mult)
            .round()
            .max(MIN_TRAILING_DISTANCE_TICKS);
        let trailing_min_profit_ticks = (config.trailing_min_profit_ticks * mult.trailing_mult)
            .round()
            .max(MIN_TRAILING_PROFIT_TICKS);

        Self {
            regime: RegimeLabel::Normal,
            breakeven_threshold_ticks,
            breakeven_offset_ticks,
            trailing_distance_ticks,
            trailing_min_profit_ticks,
        }
    }

    /// Look the multipliers up for `regime` and derive.
    pub fn for_regime(
        config: &ExitConfig,
        source: &dyn MultiplierSource,
        regime: RegimeLabel,
    ) -> Self {
        Self {
            regime,
            ..Self::derive(config, source.multipliers(regime))
        }
    }
}
