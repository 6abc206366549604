//! Parser module for Binance depth messages
//!
//! Depth updates are parsed level by level: a malformed level is rejected on
//! its own and the rest of the message is kept. Snapshots are parsed strictly.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use tracing::warn;

use crate::error::{MarketDataError, Result};
use crate::orderbook::{PriceLevel, Side};

/// Binance depth update message
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawDepthUpdate")]
pub struct DepthUpdate {
    /// Event type
    pub event_type: String,

    /// Event time (milliseconds)
    pub event_time: u64,

    /// Symbol
    pub symbol: String,

    /// First update ID in event
    pub first_update_id: u64,

    /// Final update ID in event
    pub final_update_id: u64,

    /// Bids to update
    pub bids: Vec<PriceLevel>,

    /// Asks to update
    pub asks: Vec<PriceLevel>,

    /// Levels dropped while parsing because they were malformed
    pub rejected_levels: usize,
}

impl DepthUpdate {
    /// All level changes carried by the update, bids first
    pub fn changes(&self) -> impl Iterator<Item = (Side, &PriceLevel)> + '_ {
        self.bids
            .iter()
            .map(|level| (Side::Bid, level))
            .chain(self.asks.iter().map(|level| (Side::Ask, level)))
    }
}

/// Wire shape of a depth update before per-level validation
#[derive(Debug, Deserialize)]
struct RawDepthUpdate {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "b", default)]
    bids: Vec<Vec<String>>,
    #[serde(rename = "a", default)]
    asks: Vec<Vec<String>>,
}

impl From<RawDepthUpdate> for DepthUpdate {
    fn from(raw: RawDepthUpdate) -> Self {
        let mut rejected_levels = 0;
        let mut parse_side = |levels: Vec<Vec<String>>| -> Vec<PriceLevel> {
            levels
                .iter()
                .filter_map(|pair| match parse_level(pair) {
                    Ok(level) => Some(level),
                    Err(e) => {
                        warn!(symbol = %raw.symbol, error = %e, "Rejected price level");
                        rejected_levels += 1;
                        None
                    }
                })
                .collect()
        };

        let bids = parse_side(raw.bids);
        let asks = parse_side(raw.asks);

        DepthUpdate {
            event_type: raw.event_type,
            event_time: raw.event_time,
            symbol: raw.symbol,
            first_update_id: raw.first_update_id,
            final_update_id: raw.final_update_id,
            bids,
            asks,
            rejected_levels,
        }
    }
}

/// Order book snapshot from REST API
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    /// Bids
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    /// Stream name
    pub stream: String,

    /// Data payload
    pub data: serde_json::Value,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    DepthUpdate(DepthUpdate),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        // Combined streams wrap the payload
        if let Ok(stream_msg) = serde_json::from_value::<StreamMessage>(value.clone()) {
            return Self::parse_stream_data(&stream_msg.stream, stream_msg.data);
        }

        if value.get("e").and_then(|e| e.as_str()) == Some("depthUpdate") {
            let depth: DepthUpdate = serde_json::from_value(value)?;
            return Ok(ParsedMessage::DepthUpdate(depth));
        }

        Ok(ParsedMessage::Unknown(raw.to_string()))
    }

    fn parse_stream_data(stream: &str, data: serde_json::Value) -> Result<Self> {
        if stream.contains("@depth") {
            let depth: DepthUpdate = serde_json::from_value(data)?;
            Ok(ParsedMessage::DepthUpdate(depth))
        } else {
            Ok(ParsedMessage::Unknown(data.to_string()))
        }
    }
}

/// Parse a `[price, quantity]` string pair
fn parse_level(pair: &[String]) -> Result<PriceLevel> {
    let [price, quantity] = pair else {
        return Err(MarketDataError::InvalidLevel(format!(
            "expected [price, quantity], got {} fields",
            pair.len()
        )));
    };
    let price = Decimal::from_str(price)
        .map_err(|e| MarketDataError::InvalidLevel(format!("price {:?}: {}", price, e)))?;
    let quantity = Decimal::from_str(quantity)
        .map_err(|e| MarketDataError::InvalidLevel(format!("quantity {:?}: {}", quantity, e)))?;
    Ok(PriceLevel::new(price, quantity))
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_price_levels<'de, D>(deserializer: D) -> std::result::Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.iter()
        .map(|pair| parse_level(pair).map_err(serde::de::Error::custom))
        .collect()
}
