//! ExecLab Core — bar-replay trade execution simulator.
//!
//! This crate contains the heart of the simulator:
//! - Domain types (bars, quotes, orders, positions, trades, instruments)
//! - Market regime classifier and regime-scaled exit multipliers
//! - Order fill simulation against bars or top-of-book quotes
//! - Bid/ask microstructure: liquidity conditions, sizing, exit routing
//! - Adaptive exit state machine with the stop ratchet invariant
//! - Per-symbol backtest engine with data-quality gating

pub mod domain;
pub mod engine;
pub mod execution;
pub mod exits;
pub mod fingerprint;
pub mod microstructure;
pub mod regime;
pub mod signal;
