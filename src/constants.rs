//! Constants for the Kite ticker WebSocket protocol.
//!
//! Contains the feed endpoint, default client tuning values, exchange-segment
//! codes, and binary packet lengths. These are used internally by
//! [`Ticker`](crate::ticker::Ticker) and the wire codec, but are also
//! exported for advanced usage.

// ---------------------------------------------------------------------------
// WebSocket URL
// ---------------------------------------------------------------------------

/// WebSocket endpoint for the live tick feed (binary) and order updates (JSON).
pub const WS_TICKER_URL: &str = "wss://ws.zerodha.com";

/// API key sent as a query parameter when authenticating with an enctoken.
pub const DEFAULT_API_KEY: &str = "kitefront";

// ---------------------------------------------------------------------------
// Client defaults
// ---------------------------------------------------------------------------

/// Default tuning values for the ticker client.
pub mod defaults {
    /// Seconds to wait for the WebSocket handshake to complete.
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    /// Seconds of wire silence after which the connection is considered dead.
    /// The server heartbeats roughly every 5 seconds.
    pub const READ_TIMEOUT_SECS: u64 = 5;
    /// Seconds to wait for an outbound frame to be written.
    pub const WRITE_TIMEOUT_SECS: u64 = 5;
    /// Base reconnect delay in seconds; doubles on every consecutive failure.
    pub const RECONNECT_BASE_DELAY_SECS: u64 = 2;
    /// Upper bound on the reconnect delay in seconds.
    pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;
    /// Consecutive failed reconnect attempts before giving up.
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 50;
    /// Maximum buffered outbound commands before older same-token entries
    /// are coalesced.
    pub const COMMAND_QUEUE_CAPACITY: usize = 128;
    /// Seconds to wait for the server to echo our close frame on shutdown.
    pub const CLOSE_HANDSHAKE_TIMEOUT_SECS: u64 = 1;
}

// ---------------------------------------------------------------------------
// Exchange segments
// ---------------------------------------------------------------------------

/// Exchange-segment codes carried in the low byte of every instrument token.
///
/// The segment selects the price divisor applied to raw integer price fields.
pub mod segments {
    /// NSE equity cash.
    pub const NSE: u8 = 1;
    /// BSE equity cash.
    pub const BSE: u8 = 2;
    /// NSE currency derivatives. Prices are scaled by 1e7.
    pub const NSE_CD: u8 = 3;
    /// BSE currency derivatives. Prices are scaled by 1e7.
    pub const BSE_CD: u8 = 6;
    /// MCX commodity.
    pub const MCX: u8 = 8;
    /// Exchange indices. Index instruments are not tradable.
    pub const INDICES: u8 = 9;
}

// ---------------------------------------------------------------------------
// Binary packet lengths
// ---------------------------------------------------------------------------

/// Payload lengths of the binary tick packets. The packet length is the only
/// mode discriminator on the wire.
pub mod packet {
    /// LTP packet: token + last price.
    pub const LTP_LENGTH: usize = 8;
    /// Index quote packet: token, last price, OHLC, price change.
    pub const INDEX_QUOTE_LENGTH: usize = 28;
    /// Index full packet: index quote + exchange timestamp.
    pub const INDEX_FULL_LENGTH: usize = 32;
    /// Quote packet: LTP + traded quantities, average price, volume, OHLC.
    pub const QUOTE_LENGTH: usize = 44;
    /// Full packet: quote + last trade time, OI, timestamp, market depth.
    pub const FULL_LENGTH: usize = 184;
    /// One market-depth entry: quantity, price, orders, padding.
    pub const DEPTH_ENTRY_LENGTH: usize = 12;
}
