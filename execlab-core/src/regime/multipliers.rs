//! Per-regime exit multipliers.
//!
//! The exit state machine scales its breakeven and trailing thresholds by the
//! multipliers of the regime at entry. The default table is static; learned
//! values can be layered on top through [`MultiplierTable::with_overrides`]
//! or supplied wholesale by another [`MultiplierSource`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RegimeLabel;

/// Scale factors applied to the breakeven and trailing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeMultipliers {
    pub breakeven_mult: f64,
    pub trailing_mult: f64,
}

impl RegimeMultipliers {
    pub const fn new(breakeven_mult: f64, trailing_mult: f64) -> Self {
        Self {
            breakeven_mult,
            trailing_mult,
        }
    }

    /// No scaling.
    pub const fn identity() -> Self {
        Self::new(1.0, 1.0)
    }

    pub fn is_valid(&self) -> bool {
        self.breakeven_mult.is_finite()
            && self.trailing_mult.is_finite()
            && self.breakeven_mult > 0.0
            && self.trailing_mult > 0.0
    }
}

impl Default for RegimeMultipliers {
    fn default() -> Self {
        Self::identity()
    }
}

/// Anything that can answer "which multipliers apply in this regime?".
pub trait MultiplierSource: Send + Sync {
    fn multipliers(&self, regime: RegimeLabel) -> RegimeMultipliers;
}

/// Lookup table keyed by regime. Missing entries fall back to identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierTable {
    entries: BTreeMap<RegimeLabel, RegimeMultipliers>,
}

impl MultiplierTable {
    /// An empty table: every regime resolves to identity.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The default table with `overrides` replacing individual regimes.
    pub fn with_overrides(overrides: &BTreeMap<RegimeLabel, RegimeMultipliers>) -> Self {
        let mut table = Self::default();
        for (regime, mult) in overrides {
            table.set(*regime, *mult);
        }
        table
    }

    pub fn set(&mut self, regime: RegimeLabel, multipliers: RegimeMultipliers) {
        self.entries.insert(regime, multipliers);
    }

    pub fn get(&self, regime: RegimeLabel) -> RegimeMultipliers {
        self.entries.get(&regime).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegimeLabel, &RegimeMultipliers)> {
        self.entries.iter()
    }

    /// First regime whose multipliers are non-positive or non-finite.
    pub fn first_invalid(&self) -> Option<RegimeLabel> {
        self.entries
            .iter()
            .find(|(_, m)| !m.is_valid())
            .map(|(r, _)| *r)
    }
}

impl Default for MultiplierTable {
    fn default() -> Self {
        let entries = BTreeMap::from([
            (RegimeLabel::Normal, RegimeMultipliers::new(1.0, 1.0)),
            (RegimeLabel::NormalTrending, RegimeMultipliers::new(1.0, 1.1)),
            (RegimeLabel::HighVolTrending, RegimeMultipliers::new(1.1, 1.25)),
            (RegimeLabel::HighVolChoppy, RegimeMultipliers::new(0.75, 0.7)),
            (RegimeLabel::LowVolTrending, RegimeMultipliers::new(1.0, 1.15)),
            (RegimeLabel::LowVolRanging, RegimeMultipliers::new(0.85, 0.8)),
        ]);
        Self { entries }
    }
}

impl MultiplierSource for MultiplierTable {
    fn multipliers(&self, regime: RegimeLabel) -> RegimeMultipliers {
        self.get(regime)
    }
}
