//! Error types for the `kiteticker-rs` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, TickerError>`.
//!
//! [`TickerError`] covers:
//! - **WebSocket errors** — Connection, TLS, and protocol failures
//! - **Decode errors** — Malformed or truncated binary tick packets
//! - **JSON errors** — Control-message encoding and order-update parsing
//! - **URL errors** — Malformed feed URL construction
//! - **Timeouts** — Connect, read, and write deadlines
//! - **Invalid arguments** — Client-side validation errors

/// All possible errors produced by the ticker client.
#[derive(Debug, thiserror::Error)]
pub enum TickerError {
    /// A WebSocket transport or protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A binary tick frame or packet that could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Failed to serialize a control message or deserialize an order update.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing the feed URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// An I/O deadline expired. The payload names the operation.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The caller provided an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TickerError>;
