//! Order book module
//!
//! Maintains synchronized order book state from Binance snapshots and depth updates.

mod book;
mod levels;
mod metrics;
mod registry;

pub use book::InstrumentBook;
pub use levels::{AskLevels, BidLevels, PriceKey, PriceLevelMap};
pub use metrics::{BookMetrics, VolumeSnapshot};
pub use registry::{BookHandle, BookRegistry};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    /// Notional value of the level (price * quantity), saturating at `Decimal::MAX`
    pub fn notional(&self) -> Decimal {
        self.price.saturating_mul(self.quantity)
    }
}

/// Synchronization state of an instrument book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// No trusted base state; updates are buffered
    Unsynced,
    /// A snapshot request is outstanding; updates are buffered
    Syncing,
    /// Snapshot installed and updates applied in real time
    Synced,
}

impl SyncState {
    /// Numeric code exported as a gauge
    pub fn code(self) -> i64 {
        match self {
            SyncState::Unsynced => 0,
            SyncState::Syncing => 1,
            SyncState::Synced => 2,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Unsynced => "UNSYNCED",
            SyncState::Syncing => "SYNCING",
            SyncState::Synced => "SYNCED",
        };
        f.write_str(name)
    }
}

/// Consistent copy of one book, taken under a single read lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    pub symbol: String,
    pub sync_state: SyncState,
    pub last_update_id: Option<u64>,
    pub event_time: u64,
    /// Highest price first
    pub bids: Vec<PriceLevel>,
    /// Lowest price first
    pub asks: Vec<PriceLevel>,
}
