//! Strongly-typed records delivered through the ticker callbacks.
//!
//! ## Organization
//!
//! - [`tick`] — Decoded market-data ticks (modes, OHLC, market depth)
//! - [`order`] — Order-update messages passed through from the server
//!
//! The commonly used types are re-exported at the module root.

pub mod order;
pub mod tick;

pub use order::Order;
pub use tick::{Depth, DepthItem, Mode, Ohlc, Tick};
