//! Market-data tick types decoded from the binary feed.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Subscription mode
// ---------------------------------------------------------------------------

/// Verbosity of data requested per instrument.
///
/// The wire representation is the lowercase string used in `mode` control
/// messages (`"ltp"`, `"quote"`, `"full"`). Newly subscribed instruments
/// stream in [`Mode::Quote`] until a mode command says otherwise.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Last-traded price only.
    Ltp,
    /// LTP plus OHLC and volume snapshot.
    #[default]
    Quote,
    /// Quote plus market depth and open interest.
    Full,
}

impl Mode {
    /// The wire string for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OHLC and market depth
// ---------------------------------------------------------------------------

/// Open, high, low, and close prices for the day.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    /// Token of the instrument this OHLC belongs to. Not serialized.
    #[serde(skip)]
    pub instrument_token: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A single market-depth entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthItem {
    pub price: f64,
    pub quantity: u32,
    pub orders: u32,
}

/// Five levels of buy and sell depth, best (index 0) to worst (index 4).
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    pub buy: [DepthItem; 5],
    pub sell: [DepthItem; 5],
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One decoded market-data record from one binary packet.
///
/// `mode` and `is_index` together determine which fields the packet carried;
/// fields absent for the mode hold their zero defaults. Timestamps are
/// seconds since the unix epoch, `None` when the wire sent zero.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub mode: Mode,
    pub instrument_token: u32,
    pub is_tradable: bool,
    pub is_index: bool,
    pub last_price: f64,
    pub last_traded_quantity: u32,
    pub average_trade_price: f64,
    pub volume_traded: u32,
    pub total_buy_quantity: u32,
    pub total_sell_quantity: u32,
    pub ohlc: Ohlc,
    /// Change of the last price against the previous close.
    pub net_change: f64,
    /// Time of the last trade. Quote and full packets only.
    pub last_trade_time: Option<u32>,
    pub oi: u32,
    pub oi_day_high: u32,
    pub oi_day_low: u32,
    /// Exchange timestamp. Full packets only.
    pub timestamp: Option<u32>,
    pub depth: Depth,
}
