//! The ticker WebSocket client.
//!
//! - [`codec`] — Binary tick frame decoding and JSON control messages.
//! - [`Ticker`] / [`TickerHandle`] — Connection lifecycle, callbacks, and
//!   subscription management.

pub mod codec;

mod callbacks;
mod client;
mod subscription;
mod transport;

pub use client::{Ticker, TickerHandle, TickerState};
