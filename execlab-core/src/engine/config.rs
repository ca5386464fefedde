//! Engine configuration and its validation.

use serde::{Deserialize, Serialize};

use crate::domain::Instrument;
use crate::execution::CostModel;
use crate::exits::ExitConfig;
use crate::microstructure::MicrostructureConfig;
use crate::regime::{MultiplierTable, RegimeConfig, RegimeLabel};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be finite and not negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0} must be at least 1")]
    Zero(&'static str),

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        value: usize,
        min: usize,
    },

    #[error("regime window {window} is shorter than min_bars {min_bars}")]
    RegimeWindow { window: usize, min_bars: usize },

    #[error("low volatility threshold {low} must be below high threshold {high}")]
    VolatilityBands { low: f64, high: f64 },

    #[error("volatile spread ratio {volatile} must be below stressed ratio {stressed}")]
    SpreadRatios { volatile: f64, stressed: f64 },

    #[error("multipliers for {0} must be positive and finite")]
    Multiplier(RegimeLabel),

    #[error("{list}[{index}] must come strictly after the previous entry")]
    NotIncreasing { list: &'static str, index: usize },
}

// ─── Flatten retries ─────────────────────────────────────────────────

/// Retry schedule for forced time flattens that fail to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenRetryPolicy {
    pub max_attempts: u32,
    /// Bars to wait after the first failure; doubles after each further one.
    pub base_backoff_bars: u32,
}

impl Default for FlattenRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_bars: 1,
        }
    }
}

impl FlattenRetryPolicy {
    /// Bars to wait after `failed` consecutive failures (1-based).
    pub fn backoff_bars(&self, failed: u32) -> usize {
        let shift = failed.saturating_sub(1).min(16);
        (self.base_backoff_bars as usize).saturating_mul(1usize << shift)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

// ─── Engine configuration ────────────────────────────────────────────

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Contract specification shared by every replayed symbol.
    pub instrument: Instrument,
    pub costs: CostModel,
    pub exits: ExitConfig,
    pub regime: RegimeConfig,
    pub multipliers: MultiplierTable,
    pub microstructure: MicrostructureConfig,
    /// Contracts per entry before spread-aware sizing.
    pub base_contracts: u32,
    pub initial_capital: f64,
    pub flatten_retry: FlattenRetryPolicy,
    /// Route fills through the quote stream when quotes are supplied.
    pub book_aware: bool,
    /// Entry decisions below this confidence are ignored.
    pub min_confidence: f64,
    pub allow_short: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instrument: Instrument::es(),
            costs: CostModel::default(),
            exits: ExitConfig::default(),
            regime: RegimeConfig::default(),
            multipliers: MultiplierTable::default(),
            microstructure: MicrostructureConfig::default(),
            base_contracts: 1,
            initial_capital: 100_000.0,
            flatten_retry: FlattenRetryPolicy::default(),
            book_aware: false,
            min_confidence: 0.0,
            allow_short: true,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn within(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::Zero(field))
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("instrument.tick_size", self.instrument.tick_size)?;
        positive("instrument.tick_value", self.instrument.tick_value)?;
        non_negative("costs.slippage_ticks", self.costs.slippage_ticks)?;
        non_negative(
            "costs.commission_per_contract",
            self.costs.commission_per_contract,
        )?;

        self.validate_exits()?;
        self.validate_regime()?;
        self.validate_microstructure()?;

        at_least_one("base_contracts", self.base_contracts.into())?;
        positive("initial_capital", self.initial_capital)?;
        within("min_confidence", self.min_confidence, 0.0, 1.0)?;
        at_least_one("flatten_retry.max_attempts", self.flatten_retry.max_attempts.into())?;
        at_least_one(
            "flatten_retry.base_backoff_bars",
            self.flatten_retry.base_backoff_bars.into(),
        )?;
        Ok(())
    }

    fn validate_exits(&self) -> Result<(), ConfigError> {
        let exits = &self.exits;
        positive("exits.initial_stop_ticks", exits.initial_stop_ticks)?;
        positive("exits.target_ticks", exits.target_ticks)?;
        positive("exits.breakeven_threshold_ticks", exits.breakeven_threshold_ticks)?;
        non_negative("exits.breakeven_offset_ticks", exits.breakeven_offset_ticks)?;
        positive("exits.trailing_distance_ticks", exits.trailing_distance_ticks)?;
        positive("exits.trailing_min_profit_ticks", exits.trailing_min_profit_ticks)?;
        positive("exits.max_hold_minutes", exits.max_hold_minutes)?;

        let mut previous = 0.0;
        for (index, stage) in exits.time_decay_stages.iter().enumerate() {
            within(
                "exits.time_decay_stages.elapsed_fraction",
                stage.elapsed_fraction,
                0.0,
                1.0,
            )?;
            within(
                "exits.time_decay_stages.tighten_fraction",
                stage.tighten_fraction,
                0.0,
                1.0,
            )?;
            if stage.elapsed_fraction <= previous {
                return Err(ConfigError::NotIncreasing {
                    list: "exits.time_decay_stages",
                    index,
                });
            }
            previous = stage.elapsed_fraction;
        }

        let mut previous = 0.0;
        for (index, milestone) in exits.partial_exits.iter().enumerate() {
            positive("exits.partial_exits.r_multiple", milestone.r_multiple)?;
            within("exits.partial_exits.fraction", milestone.fraction, 0.0, 1.0)?;
            positive("exits.partial_exits.fraction", milestone.fraction)?;
            if milestone.r_multiple <= previous {
                return Err(ConfigError::NotIncreasing {
                    list: "exits.partial_exits",
                    index,
                });
            }
            previous = milestone.r_multiple;
        }
        Ok(())
    }

    fn validate_regime(&self) -> Result<(), ConfigError> {
        let regime = &self.regime;
        if regime.min_bars < 2 {
            return Err(ConfigError::TooSmall {
                field: "regime.min_bars",
                value: regime.min_bars,
                min: 2,
            });
        }
        if regime.window < regime.min_bars {
            return Err(ConfigError::RegimeWindow {
                window: regime.window,
                min_bars: regime.min_bars,
            });
        }
        non_negative("regime.low_vol_atr_pct", regime.low_vol_atr_pct)?;
        positive("regime.high_vol_atr_pct", regime.high_vol_atr_pct)?;
        if regime.low_vol_atr_pct >= regime.high_vol_atr_pct {
            return Err(ConfigError::VolatilityBands {
                low: regime.low_vol_atr_pct,
                high: regime.high_vol_atr_pct,
            });
        }
        within("regime.trend_threshold", regime.trend_threshold, 0.0, 100.0)?;
        if let Some(label) = self.multipliers.first_invalid() {
            return Err(ConfigError::Multiplier(label));
        }
        Ok(())
    }

    fn validate_microstructure(&self) -> Result<(), ConfigError> {
        let micro = &self.microstructure;
        at_least_one(
            "microstructure.condition.baseline_window",
            micro.condition.baseline_window as u64,
        )?;
        positive("microstructure.condition.volatile_ratio", micro.condition.volatile_ratio)?;
        if micro.condition.volatile_ratio >= micro.condition.stressed_ratio {
            return Err(ConfigError::SpreadRatios {
                volatile: micro.condition.volatile_ratio,
                stressed: micro.condition.stressed_ratio,
            });
        }
        positive(
            "microstructure.fill_probability.timeout_secs",
            micro.fill_probability.timeout_secs,
        )?;
        within(
            "microstructure.fill_probability.min_probability",
            micro.fill_probability.min_probability,
            0.0,
            1.0,
        )?;
        non_negative(
            "microstructure.fill_probability.depletion_rate_per_sec",
            micro.fill_probability.depletion_rate_per_sec,
        )?;
        at_least_one(
            "microstructure.queue.poll_interval_ms",
            micro.queue.poll_interval_ms,
        )?;
        positive("microstructure.queue.timeout_secs", micro.queue.timeout_secs)?;
        positive("microstructure.queue.stale_ticks", micro.queue.stale_ticks)?;
        within(
            "microstructure.max_cost_fraction",
            micro.max_cost_fraction,
            f64::MIN_POSITIVE,
            1.0,
        )?;
        non_negative(
            "microstructure.assumed_spread_ticks",
            micro.assumed_spread_ticks,
        )?;
        Ok(())
    }
}
