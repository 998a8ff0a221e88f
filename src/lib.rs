//! # kiteticker-rs
//!
//! An async Rust client for the Kite real-time market-data WebSocket feed.
//!
//! The client keeps a persistent, authenticated WebSocket open to the
//! broker, decodes the binary tick feed into [`Tick`](types::tick::Tick)
//! records, routes out-of-band order updates, and recovers from network
//! failures with exponential-backoff reconnection and automatic
//! resubscription.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kiteticker_rs::{Mode, Ticker};
//!
//! #[tokio::main]
//! async fn main() -> kiteticker_rs::Result<()> {
//!     let mut ticker = Ticker::new("your-user-id", "your-enctoken");
//!     let handle = ticker.handle();
//!
//!     ticker.on_connect(move || {
//!         let _ = handle.subscribe(&[256265, 5633]);
//!         let _ = handle.set_mode(Mode::Full, &[5633]);
//!     });
//!     ticker.on_tick(|tick| println!("{tick:?}"));
//!     ticker.on_order_update(|order| println!("order {} → {}", order.order_id, order.status));
//!
//!     ticker.serve().await
//! }
//! ```

pub mod constants;
pub mod error;
pub mod ticker;
pub mod types;

/// Re-export the main client types at crate root for convenience.
pub use ticker::{Ticker, TickerHandle, TickerState};
/// Re-export the callback payload types.
pub use types::{Mode, Order, Tick};
/// Re-export the error type and Result alias.
pub use error::{Result, TickerError};
