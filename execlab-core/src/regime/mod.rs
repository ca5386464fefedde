//! Market regime — a coarse volatility × trend label derived from recent bars.
//!
//! The classifier is a pure function of the last N bars. There is no shared
//! detector instance: each engine run constructs its own `RegimeClassifier`
//! and passes it where needed.
//!
//! - [`classifier`] — ATR percent + directional strength → [`RegimeLabel`]
//! - [`multipliers`] — per-regime `{breakeven_mult, trailing_mult}` lookup

pub mod classifier;
pub mod multipliers;

pub use classifier::{
    directional_strength, true_range, RegimeClassifier, RegimeConfig, RegimeSnapshot,
    RegimeTracker, TrendClass, VolatilityClass,
};
pub use multipliers::{MultiplierSource, MultiplierTable, RegimeMultipliers};

use serde::{Deserialize, Serialize};

/// The six regime labels (volatility × trend).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeLabel {
    #[default]
    Normal,
    NormalTrending,
    HighVolTrending,
    HighVolChoppy,
    LowVolTrending,
    LowVolRanging,
}

impl RegimeLabel {
    pub const ALL: [RegimeLabel; 6] = [
        RegimeLabel::Normal,
        RegimeLabel::NormalTrending,
        RegimeLabel::HighVolTrending,
        RegimeLabel::HighVolChoppy,
        RegimeLabel::LowVolTrending,
        RegimeLabel::LowVolRanging,
    ];

    /// Cross product of volatility class and trend class.
    pub fn combine(volatility: VolatilityClass, trend: TrendClass) -> Self {
        match (volatility, trend) {
            (VolatilityClass::High, TrendClass::Trending) => RegimeLabel::HighVolTrending,
            (VolatilityClass::High, TrendClass::Choppy) => RegimeLabel::HighVolChoppy,
            (VolatilityClass::Low, TrendClass::Trending) => RegimeLabel::LowVolTrending,
            (VolatilityClass::Low, TrendClass::Choppy) => RegimeLabel::LowVolRanging,
            (VolatilityClass::Normal, TrendClass::Trending) => RegimeLabel::NormalTrending,
            (VolatilityClass::Normal, TrendClass::Choppy) => RegimeLabel::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegimeLabel::Normal => "NORMAL",
            RegimeLabel::NormalTrending => "NORMAL_TRENDING",
            RegimeLabel::HighVolTrending => "HIGH_VOL_TRENDING",
            RegimeLabel::HighVolChoppy => "HIGH_VOL_CHOPPY",
            RegimeLabel::LowVolTrending => "LOW_VOL_TRENDING",
            RegimeLabel::LowVolRanging => "LOW_VOL_RANGING",
        }
    }
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized regime name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown regime label '{0}'")]
pub struct UnknownRegime(pub String);

impl std::str::FromStr for RegimeLabel {
    type Err = UnknownRegime;

    /// Case-insensitive; accepts `high_vol_choppy` as well as `HIGH_VOL_CHOPPY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        RegimeLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| UnknownRegime(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_covers_all_six_labels() {
        use TrendClass::*;
        use VolatilityClass::*;
        let labels: Vec<RegimeLabel> = [High, Normal, Low]
            .iter()
            .flat_map(|v| [Trending, Choppy].map(|t| RegimeLabel::combine(*v, t)))
            .collect();
        for label in RegimeLabel::ALL {
            assert!(labels.contains(&label), "missing {label}");
        }
    }

    #[test]
    fn label_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&RegimeLabel::HighVolChoppy).unwrap();
        assert_eq!(json, "\"HIGH_VOL_CHOPPY\"");
        let back: RegimeLabel = serde_json::from_str("\"LOW_VOL_TRENDING\"").unwrap();
        assert_eq!(back, RegimeLabel::LowVolTrending);
    }

    #[test]
    fn parses_names_in_either_case() {
        assert_eq!("high_vol_choppy".parse(), Ok(RegimeLabel::HighVolChoppy));
        assert_eq!("NORMAL".parse(), Ok(RegimeLabel::Normal));
        assert_eq!(
            "sideways".parse::<RegimeLabel>(),
            Err(UnknownRegime("sideways".into()))
        );
    }
}
