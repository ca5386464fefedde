//! Adaptive exits — breakeven, trailing, time decay and partial profit-taking
//! for one open position, with thresholds scaled by the current regime.
//!
//! The manager never holds per-position state: it mutates the
//! [`ExitState`](crate::domain::ExitState) embedded in the position it is
//! given. Stops obey the ratchet invariant and may only tighten.

pub mod state_machine;
pub mod thresholds;

pub use state_machine::{AdaptiveExitManager, BarOutcome, StopMove};
pub use thresholds::{
    EffectiveThresholds, ExitConfig, PartialExitMilestone, TimeDecayStage, MIN_BREAKEVEN_TICKS,
    MIN_TRAILING_DISTANCE_TICKS, MIN_TRAILING_PROFIT_TICKS,
};
