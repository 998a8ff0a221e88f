//! Order-update messages delivered out-of-band on the ticker socket.

use serde::{Deserialize, Serialize};

/// An individual order update pushed by the server.
///
/// The fields mirror the upstream order structure and are passed through
/// unchanged; every field is tolerant of being absent or null, since the
/// server populates different subsets depending on the order's lifecycle
/// stage. Timestamps are kept in their wire string form
/// (`"2006-01-02 15:04:05"`).
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub account_id: String,
    pub placed_by: String,

    pub order_id: String,
    pub exchange_order_id: Option<String>,
    pub parent_order_id: Option<String>,
    /// Order status (`"OPEN"`, `"COMPLETE"`, `"CANCELLED"`, `"REJECTED"`, …).
    pub status: String,
    pub status_message: Option<String>,
    pub status_message_raw: Option<String>,
    pub order_timestamp: Option<String>,
    pub exchange_update_timestamp: Option<String>,
    pub exchange_timestamp: Option<String>,
    pub variety: String,
    pub modified: bool,
    /// Free-form metadata attached by the upstream API.
    pub meta: Option<serde_json::Value>,

    pub exchange: String,
    pub tradingsymbol: String,
    pub instrument_token: u32,

    pub order_type: String,
    pub transaction_type: String,
    pub validity: String,
    pub validity_ttl: i32,
    pub product: String,
    pub quantity: f64,
    pub disclosed_quantity: f64,
    pub price: f64,
    pub trigger_price: f64,

    pub average_price: f64,
    pub filled_quantity: f64,
    pub pending_quantity: f64,
    pub cancelled_quantity: f64,

    pub auction_number: Option<String>,

    pub tag: Option<String>,
    pub tags: Option<Vec<String>>,
}
