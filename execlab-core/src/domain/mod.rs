//! Domain types: market data, orders, positions and trades.

pub mod bar;
pub mod instrument;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::{Bar, Quote};
pub use instrument::{round_to_tick, Instrument};
pub use order::{OrderIntent, OrderSide, OrderStyle, OrderType};
pub use position::{ExitLeg, ExitState, Position, PositionSide, StopSource};
pub use trade::{ExitReason, Trade};
