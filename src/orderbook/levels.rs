//! Sorted price levels for one side of a book
//!
//! Uses BTreeMap for efficient sorted price level management. Bids are keyed
//! by `Reverse<Decimal>` so both sides iterate best-first.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use super::PriceLevel;
use crate::error::{MarketDataError, Result};

/// Ordering key of a side: maps a price to the key whose ascending order is
/// the side's native (best-first) order.
pub trait PriceKey: Ord + Copy + fmt::Debug {
    fn from_price(price: Decimal) -> Self;
    fn price(self) -> Decimal;
}

impl PriceKey for Decimal {
    fn from_price(price: Decimal) -> Self {
        price
    }

    fn price(self) -> Decimal {
        self
    }
}

impl PriceKey for Reverse<Decimal> {
    fn from_price(price: Decimal) -> Self {
        Reverse(price)
    }

    fn price(self) -> Decimal {
        self.0
    }
}

/// Bids sorted by price descending (highest first)
pub type BidLevels = PriceLevelMap<Reverse<Decimal>>;
/// Asks sorted by price ascending (lowest first)
pub type AskLevels = PriceLevelMap<Decimal>;

/// Price -> quantity map holding only positive quantities
#[derive(Debug, Clone)]
pub struct PriceLevelMap<K: PriceKey> {
    levels: BTreeMap<K, Decimal>,
}

impl<K: PriceKey> Default for PriceLevelMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PriceKey> PriceLevelMap<K> {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert or replace the level at `price`; a zero quantity removes it.
    ///
    /// Negative quantities and non-positive prices are rejected and leave the
    /// map unchanged.
    pub fn upsert(&mut self, price: Decimal, quantity: Decimal) -> Result<()> {
        check_level(price, quantity)?;
        if quantity.is_zero() {
            self.remove(price);
        } else {
            self.levels.insert(K::from_price(price), quantity);
        }
        Ok(())
    }

    /// Remove the level at `price`. Returns whether a level was present.
    pub fn remove(&mut self, price: Decimal) -> bool {
        self.levels.remove(&K::from_price(price)).is_some()
    }

    /// Best level in native order: highest bid or lowest ask
    pub fn best_level(&self) -> Option<PriceLevel> {
        self.levels
            .first_key_value()
            .map(|(k, q)| PriceLevel::new(k.price(), *q))
    }

    /// Check a full set of levels without touching any map
    pub fn validate(levels: &[PriceLevel]) -> Result<()> {
        levels
            .iter()
            .try_for_each(|level| check_level(level.price, level.quantity))
    }

    /// Discard every level and install `levels`. Zero quantities are skipped;
    /// any invalid level rejects the whole set and keeps the current levels.
    pub fn snapshot_replace(&mut self, levels: &[PriceLevel]) -> Result<()> {
        Self::validate(levels)?;
        self.levels = levels
            .iter()
            .filter(|level| !level.quantity.is_zero())
            .map(|level| (K::from_price(level.price), level.quantity))
            .collect();
        Ok(())
    }

    /// Levels in native order
    pub fn iter(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.levels
            .iter()
            .map(|(k, q)| PriceLevel::new(k.price(), *q))
    }

    pub fn levels(&self) -> Vec<PriceLevel> {
        self.iter().collect()
    }

    pub fn get(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&K::from_price(price)).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Sum of price * quantity over all levels, saturating at `Decimal::MAX`
    pub fn notional(&self) -> Decimal {
        self.iter()
            .fold(Decimal::ZERO, |acc, level| acc.saturating_add(level.notional()))
    }

    pub fn total_quantity(&self) -> Decimal {
        self.levels
            .values()
            .fold(Decimal::ZERO, |acc, quantity| acc.saturating_add(*quantity))
    }
}

fn check_level(price: Decimal, quantity: Decimal) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(MarketDataError::InvalidLevel(format!(
            "non-positive price {}",
            price
        )));
    }
    if quantity < Decimal::ZERO {
        return Err(MarketDataError::InvalidLevel(format!(
            "negative quantity {} at price {}",
            quantity, price
        )));
    }
    if price.checked_mul(quantity).is_none() {
        return Err(MarketDataError::InvalidLevel(format!(
            "notional of {} at price {} is out of range",
            quantity, price
        )));
    }
    Ok(())
}
