//! TOML backtest configuration.
//!
//! Every table and field is optional; missing values take the engine
//! defaults. The file is parsed, translated to an [`EngineConfig`] and
//! validated before any data is read.
//!
//! ```toml
//! [instrument]
//! symbol = "ES"
//! tick_size = 0.25
//! tick_value = 12.5
//!
//! [costs]
//! slippage_ticks = 1.0
//! commission_per_contract = 2.5
//!
//! [exits]
//! initial_stop_ticks = 8.0
//! trailing_distance_ticks = 10.0
//!
//! [regime]
//! window = 50
//!
//! [regime.multiplier_overrides.HIGH_VOL_CHOPPY]
//! breakeven_mult = 1.4
//! trailing_mult = 1.6
//!
//! [engine]
//! base_contracts = 2
//! book_aware = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use execlab_core::domain::Instrument;
use execlab_core::engine::{EngineConfig, FlattenRetryPolicy};
use execlab_core::execution::CostModel;
use execlab_core::exits::ExitConfig;
use execlab_core::fingerprint::json_digest;
use execlab_core::microstructure::MicrostructureConfig;
use execlab_core::regime::{MultiplierTable, RegimeConfig, RegimeLabel, RegimeMultipliers};

/// Trade returns are annualized as if one trade happened per trading day.
pub const DEFAULT_ANNUALIZATION: f64 = 252.0;

/// Errors from reading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("[regime.multiplier_overrides]: {0}")]
    UnknownRegime(#[from] execlab_core::regime::UnknownRegime),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] execlab_core::engine::ConfigError),

    #[error("engine.annualization must be positive and finite, got {0}")]
    Annualization(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSection {
    pub symbol: String,
    pub tick_size: f64,
    pub tick_value: f64,
}

impl Default for InstrumentSection {
    fn default() -> Self {
        let es = Instrument::es();
        Self {
            symbol: es.symbol,
            tick_size: es.tick_size,
            tick_value: es.tick_value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeSection {
    #[serde(flatten)]
    pub classifier: RegimeConfig,
    /// Keyed by regime name (`HIGH_VOL_CHOPPY`, case-insensitive).
    pub multiplier_overrides: BTreeMap<String, RegimeMultipliers>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub base_contracts: u32,
    pub initial_capital: f64,
    pub book_aware: bool,
    pub min_confidence: f64,
    pub allow_short: bool,
    /// Sharpe annualization factor for the summary.
    pub annualization: f64,
    pub flatten_retry: FlattenRetryPolicy,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            base_contracts: engine.base_contracts,
            initial_capital: engine.initial_capital,
            book_aware: engine.book_aware,
            min_confidence: engine.min_confidence,
            allow_short: engine.allow_short,
            annualization: DEFAULT_ANNUALIZATION,
            flatten_retry: engine.flatten_retry,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub instrument: InstrumentSection,
    pub costs: CostModel,
    pub exits: ExitConfig,
    pub regime: RegimeSection,
    pub microstructure: MicrostructureConfig,
    pub engine: EngineSection,
}

impl BacktestConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolve overrides and validate. Fails on the first bad field.
    pub fn into_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut overrides: BTreeMap<RegimeLabel, RegimeMultipliers> = BTreeMap::new();
        for (name, mult) in &self.regime.multiplier_overrides {
            overrides.insert(name.parse()?, *mult);
        }

        let config = EngineConfig {
            instrument: Instrument::new(
                self.instrument.symbol.clone(),
                self.instrument.tick_size,
                self.instrument.tick_value,
            ),
            costs: self.costs,
            exits: self.exits.clone(),
            regime: self.regime.classifier.clone(),
            multipliers: MultiplierTable::with_overrides(&overrides),
            microstructure: self.microstructure.clone(),
            base_contracts: self.engine.base_contracts,
            initial_capital: self.engine.initial_capital,
            flatten_retry: self.engine.flatten_retry,
            book_aware: self.engine.book_aware,
            min_confidence: self.engine.min_confidence,
            allow_short: self.engine.allow_short,
        };
        config.validate()?;

        let ann = self.engine.annualization;
        if !(ann.is_finite() && ann > 0.0) {
            return Err(ConfigError::Annualization(ann));
        }
        Ok(config)
    }

    /// Deterministic identity of this configuration.
    pub fn config_id(&self) -> String {
        json_digest(self)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_engine_defaults() {
        let config = BacktestConfig::from_toml_str("").unwrap();
        let engine = config.into_engine_config().unwrap();
        assert_eq!(engine, EngineConfig::default());
        assert_eq!(config.engine.annualization, DEFAULT_ANNUALIZATION);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = BacktestConfig::from_toml_str(
            r#"
            [instrument]
            symbol = "NQ"
            tick_value = 5.0

            [exits]
            trailing_distance_ticks = 6.0

            [engine]
            base_contracts = 3
            book_aware = true
            "#,
        )
        .unwrap();
        let engine = config.into_engine_config().unwrap();
        assert_eq!(engine.instrument, Instrument::nq());
        assert_eq!(engine.exits.trailing_distance_ticks, 6.0);
        assert_eq!(engine.exits.initial_stop_ticks, ExitConfig::default().initial_stop_ticks);
        assert_eq!(engine.base_contracts, 3);
        assert!(engine.book_aware);
    }

    #[test]
    fn regime_overrides_replace_single_entries() {
        let config = BacktestConfig::from_toml_str(
            r#"
            [regime]
            window = 40

            [regime.multiplier_overrides.high_vol_choppy]
            breakeven_mult = 2.0
            trailing_mult = 3.0
            "#,
        )
        .unwrap();
        let engine = config.into_engine_config().unwrap();
        assert_eq!(engine.regime.window, 40);
        assert_eq!(
            engine.multipliers.get(RegimeLabel::HighVolChoppy),
            RegimeMultipliers::new(2.0, 3.0)
        );
        assert_eq!(
            engine.multipliers.get(RegimeLabel::Normal),
            MultiplierTable::default().get(RegimeLabel::Normal)
        );
    }

    #[test]
    fn unknown_regime_name_is_rejected() {
        let config = BacktestConfig::from_toml_str(
            r#"
            [regime.multiplier_overrides.SIDEWAYS]
            breakeven_mult = 1.0
            trailing_mult = 1.0
            "#,
        )
        .unwrap();
        let err = config.into_engine_config().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRegime(_)));
        assert!(err.to_string().contains("SIDEWAYS"));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = BacktestConfig::from_toml_str("[costs]\nslippage_ticks = -1.0\n").unwrap();
        let err = config.into_engine_config().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("costs.slippage_ticks"));
    }

    #[test]
    fn zero_annualization_is_rejected() {
        let config = BacktestConfig::from_toml_str("[engine]\nannualization = 0.0\n").unwrap();
        assert!(matches!(
            config.into_engine_config(),
            Err(ConfigError::Annualization(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = BacktestConfig::from_toml_str("[engine\nbase_contracts = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn config_id_tracks_content() {
        let a = BacktestConfig::default();
        let mut b = a.clone();
        assert_eq!(a.config_id(), b.config_id());
        b.exits.trailing_distance_ticks = 7.0;
        assert_ne!(a.config_id(), b.config_id());
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let mut config = BacktestConfig::default();
        config.engine.base_contracts = 4;
        config
            .regime
            .multiplier_overrides
            .insert("NORMAL".into(), RegimeMultipliers::new(1.1, 1.2));
        let text = config.to_toml_string().unwrap();
        assert_eq!(BacktestConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = BacktestConfig::load(Path::new("/nonexistent/execlab.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/execlab.toml"));
    }
}
