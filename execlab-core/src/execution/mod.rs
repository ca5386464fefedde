//! Execution — converts order intents into fills against bars or quotes.
//!
//! The simulator is stateless: it carries only the instrument and the cost
//! model. A venue is built per bar and borrows the simulator plus, when
//! book-aware, that bar's quotes.

pub mod cost_model;
pub mod fill_simulator;
pub mod venue;

pub use cost_model::CostModel;
pub use fill_simulator::{
    BracketLeg, BracketResolution, Execution, FillOutcome, FillSimulator, NoFillReason,
    PriceSource,
};
pub use venue::{BookContext, ExecutionVenue, SimulatedVenue, VenueFill};
