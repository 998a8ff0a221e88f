//! Wire codec for the ticker protocol.
//!
//! The tick feed arrives as binary WebSocket frames packing one or more
//! variable-length packets, all fields big-endian. Control messages travel
//! in the other direction as small JSON envelopes, and the server pushes
//! order updates as JSON text frames on the same socket.
//!
//! # Frame layout
//!
//! ```text
//! ┌────────────┬──────────────┬───────────────┬──────────────┬─────┐
//! │ count: u16 │ len(0): u16  │ packet 0      │ len(1): u16  │ ... │
//! └────────────┴──────────────┴───────────────┴──────────────┴─────┘
//! ```
//!
//! A frame shorter than 2 bytes is a server heartbeat: it carries no packets
//! and only proves liveness. Every packet starts with the `u32` instrument
//! token; the remaining length is the only mode discriminator (see
//! [`crate::constants::packet`]).

use serde::{Deserialize, Serialize};

use crate::constants::{packet, segments};
use crate::error::{Result, TickerError};
use crate::types::order::Order;
use crate::types::tick::{DepthItem, Mode, Ohlc, Tick};

// ---------------------------------------------------------------------------
// Big-endian read helpers
// ---------------------------------------------------------------------------

/// Read a big-endian `u16` from `data` at `offset`. Advances `offset` by 2.
#[inline(always)]
fn read_u16_be(data: &[u8], offset: &mut usize) -> u16 {
    let v = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;
    v
}

/// Read a big-endian `u32` from `data` at `offset`. Advances `offset` by 4.
#[inline(always)]
fn read_u32_be(data: &[u8], offset: &mut usize) -> u32 {
    let v = u32::from_be_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    v
}

/// Read a big-endian `i32` from `data` at `offset`. Advances `offset` by 4.
#[inline(always)]
fn read_i32_be(data: &[u8], offset: &mut usize) -> i32 {
    let v = i32::from_be_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    v
}

/// Read a raw integer price and scale it by the segment divisor.
#[inline(always)]
fn read_price(data: &[u8], offset: &mut usize, divisor: f64) -> f64 {
    f64::from(read_u32_be(data, offset)) / divisor
}

/// Epoch-second fields use zero to mean "absent".
#[inline(always)]
fn epoch(raw: u32) -> Option<u32> {
    (raw != 0).then_some(raw)
}

/// Divisor applied to every raw integer price field of the given segment.
fn price_divisor(segment: u8) -> f64 {
    match segment {
        segments::NSE_CD | segments::BSE_CD => 10_000_000.0,
        _ => 100.0,
    }
}

// ---------------------------------------------------------------------------
// Binary frame parsing
// ---------------------------------------------------------------------------

/// Split a binary frame into its packet payloads, without copying.
///
/// Heartbeat frames (shorter than the 2-byte packet count) yield an empty
/// vec. A declared packet length that overruns the frame is a decode error
/// and yields no packets at all.
pub fn split_packets(frame: &[u8]) -> Result<Vec<&[u8]>> {
    if frame.len() < 2 {
        return Ok(Vec::new());
    }

    let mut off = 0;
    let count = read_u16_be(frame, &mut off) as usize;
    let mut packets = Vec::with_capacity(count);

    for _ in 0..count {
        if off + 2 > frame.len() {
            return Err(TickerError::Decode(format!(
                "frame truncated at packet header, offset {off}"
            )));
        }
        let length = read_u16_be(frame, &mut off) as usize;
        if off + length > frame.len() {
            return Err(TickerError::Decode(format!(
                "declared packet length {length} overruns frame of {} bytes",
                frame.len()
            )));
        }
        packets.push(&frame[off..off + length]);
        off += length;
    }

    Ok(packets)
}

/// Parse one packet payload into a [`Tick`].
///
/// The packet length selects the layout; the token's low byte selects the
/// exchange segment, and with it the price divisor and the index flag.
pub fn parse_packet(data: &[u8]) -> Result<Tick> {
    if data.len() < packet::LTP_LENGTH {
        return Err(TickerError::Decode(format!(
            "packet too short: {} bytes",
            data.len()
        )));
    }

    let mut off = 0;
    let instrument_token = read_u32_be(data, &mut off);
    if instrument_token == 0 {
        return Err(TickerError::Decode("packet with zero instrument token".into()));
    }

    let segment = (instrument_token & 0xff) as u8;
    let divisor = price_divisor(segment);
    let is_index = segment == segments::INDICES;

    let mut tick = Tick {
        instrument_token,
        is_tradable: !is_index,
        is_index,
        ..Tick::default()
    };

    match data.len() {
        packet::LTP_LENGTH => {
            tick.mode = Mode::Ltp;
            tick.last_price = read_price(data, &mut off, divisor);
        }

        packet::INDEX_QUOTE_LENGTH | packet::INDEX_FULL_LENGTH => {
            tick.last_price = read_price(data, &mut off, divisor);
            let high = read_price(data, &mut off, divisor);
            let low = read_price(data, &mut off, divisor);
            let open = read_price(data, &mut off, divisor);
            let close = read_price(data, &mut off, divisor);
            tick.ohlc = Ohlc {
                instrument_token,
                open,
                high,
                low,
                close,
            };
            // Index packets carry the day's price change on the wire.
            tick.net_change = f64::from(read_i32_be(data, &mut off)) / divisor;

            if data.len() == packet::INDEX_FULL_LENGTH {
                tick.mode = Mode::Full;
                tick.timestamp = epoch(read_u32_be(data, &mut off));
            } else {
                tick.mode = Mode::Quote;
            }
        }

        packet::QUOTE_LENGTH | packet::FULL_LENGTH => {
            tick.last_price = read_price(data, &mut off, divisor);
            tick.last_traded_quantity = read_u32_be(data, &mut off);
            tick.average_trade_price = read_price(data, &mut off, divisor);
            tick.volume_traded = read_u32_be(data, &mut off);
            tick.total_buy_quantity = read_u32_be(data, &mut off);
            tick.total_sell_quantity = read_u32_be(data, &mut off);
            let open = read_price(data, &mut off, divisor);
            let high = read_price(data, &mut off, divisor);
            let low = read_price(data, &mut off, divisor);
            let close = read_price(data, &mut off, divisor);
            tick.ohlc = Ohlc {
                instrument_token,
                open,
                high,
                low,
                close,
            };
            tick.net_change = tick.last_price - close;

            if data.len() == packet::FULL_LENGTH {
                tick.mode = Mode::Full;
                tick.last_trade_time = epoch(read_u32_be(data, &mut off));
                tick.oi = read_u32_be(data, &mut off);
                tick.oi_day_high = read_u32_be(data, &mut off);
                tick.oi_day_low = read_u32_be(data, &mut off);
                tick.timestamp = epoch(read_u32_be(data, &mut off));

                // 10 depth entries of 12 bytes: 5 buy levels then 5 sell.
                for level in 0..10 {
                    let quantity = read_u32_be(data, &mut off);
                    let price = read_price(data, &mut off, divisor);
                    let orders = u32::from(read_u16_be(data, &mut off));
                    off += 2; // struct padding on the wire
                    let entry = DepthItem {
                        price,
                        quantity,
                        orders,
                    };
                    if level < 5 {
                        tick.depth.buy[level] = entry;
                    } else {
                        tick.depth.sell[level - 5] = entry;
                    }
                }
            } else {
                tick.mode = Mode::Quote;
            }
        }

        other => {
            return Err(TickerError::Decode(format!(
                "unknown packet length: {other} bytes"
            )));
        }
    }

    Ok(tick)
}

// ---------------------------------------------------------------------------
// Control messages (outbound text JSON)
// ---------------------------------------------------------------------------

/// JSON control envelope sent over the WebSocket.
#[derive(Debug, Serialize)]
struct ControlRequest<T: Serialize> {
    a: &'static str,
    v: T,
}

fn require_tokens(tokens: &[u32]) -> Result<()> {
    if tokens.is_empty() {
        return Err(TickerError::InvalidArgument("empty token list".into()));
    }
    Ok(())
}

/// Encode a subscribe command for the given tokens.
pub fn encode_subscribe(tokens: &[u32]) -> Result<String> {
    require_tokens(tokens)?;
    Ok(serde_json::to_string(&ControlRequest {
        a: "subscribe",
        v: tokens,
    })?)
}

/// Encode an unsubscribe command for the given tokens.
pub fn encode_unsubscribe(tokens: &[u32]) -> Result<String> {
    require_tokens(tokens)?;
    Ok(serde_json::to_string(&ControlRequest {
        a: "unsubscribe",
        v: tokens,
    })?)
}

/// Encode a mode command setting `mode` for the given tokens.
pub fn encode_mode(mode: Mode, tokens: &[u32]) -> Result<String> {
    require_tokens(tokens)?;
    Ok(serde_json::to_string(&ControlRequest {
        a: "mode",
        v: (mode, tokens),
    })?)
}

// ---------------------------------------------------------------------------
// Inbound text messages
// ---------------------------------------------------------------------------

/// Envelope of an inbound text frame.
#[derive(Debug, Deserialize)]
struct TextEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// A classified inbound text frame.
#[derive(Debug)]
pub enum TextMessage {
    /// An order-update envelope; the payload is passed through unchanged.
    OrderUpdate(Box<Order>),
    /// Anything else. Postbacks and informational messages are ignored.
    Other,
}

/// Classify an inbound text frame.
///
/// Only `{"type":"order","data":{…}}` envelopes are meaningful; all other
/// text, including unparseable text, is [`TextMessage::Other`]. An order
/// envelope whose `data` does not deserialize is an error.
pub fn parse_text_message(text: &str) -> Result<TextMessage> {
    let envelope: TextEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => return Ok(TextMessage::Other),
    };

    if envelope.kind.as_deref() == Some("order") {
        if let Some(data) = envelope.data {
            let order: Order = serde_json::from_value(data)?;
            return Ok(TextMessage::OrderUpdate(Box::new(order)));
        }
    }

    Ok(TextMessage::Other)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
