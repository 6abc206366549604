//! Order book metrics calculation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BookView, PriceLevel};

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetrics {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Sum of price * quantity over bids
    pub bid_notional: Decimal,

    /// Sum of price * quantity over asks
    pub ask_notional: Decimal,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl BookMetrics {
    pub fn from_view(view: &BookView) -> Self {
        let best_bid = view.bids.first().map(|level| level.price);
        let best_ask = view.asks.first().map(|level| level.price);

        let mid_price = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => bid.checked_add(ask).map(|sum| sum / Decimal::TWO),
            _ => None,
        };
        let spread_bps = match (best_bid, best_ask, mid_price) {
            (Some(bid), Some(ask), Some(mid)) if mid > Decimal::ZERO => {
                Some((ask - bid) / mid * Decimal::from(10000))
            }
            _ => None,
        };

        Self {
            best_bid,
            best_ask,
            mid_price,
            spread_bps,
            bid_notional: notional(&view.bids),
            ask_notional: notional(&view.asks),
            bid_levels: view.bids.len(),
            ask_levels: view.asks.len(),
        }
    }

    /// Notional volume over both sides
    pub fn total_notional(&self) -> Decimal {
        self.bid_notional.saturating_add(self.ask_notional)
    }

    /// Check if the order book is healthy (has both sides and is not crossed)
    pub fn is_healthy(&self) -> bool {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => bid < ask,
            _ => false,
        }
    }
}

/// Total notional of one instrument at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub symbol: String,
    pub total_notional: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl VolumeSnapshot {
    /// Change relative to the previous observation; the first one counts from zero
    pub fn delta(&self, previous: Option<Decimal>) -> Decimal {
        self.total_notional - previous.unwrap_or(Decimal::ZERO)
    }
}

fn notional(levels: &[PriceLevel]) -> Decimal {
    levels
        .iter()
        .fold(Decimal::ZERO, |acc, level| acc.saturating_add(level.notional()))
}
