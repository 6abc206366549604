//! Order book for a single instrument plus its synchronization state
//!
//! Level mutation goes through [`crate::sync::UpdateApplier`] and
//! [`crate::sync::SnapshotBootstrapper`]; this type owns the data and the
//! state transitions they drive.

use std::collections::VecDeque;
use tracing::{info, warn};

use super::{AskLevels, BidLevels, BookView, PriceLevel, Side, SyncState};
use crate::error::Result;
use crate::parser::DepthUpdate;

/// Order book for a single symbol
#[derive(Debug)]
pub struct InstrumentBook {
    symbol: String,
    bids: BidLevels,
    asks: AskLevels,
    sync_state: SyncState,
    /// Last applied update ID (snapshot ID right after a bootstrap)
    last_update_id: Option<u64>,
    /// Set after a snapshot install until the first update bridging it is applied
    bridging: bool,
    /// Updates received while not synced, in arrival order
    pending: VecDeque<DepthUpdate>,
    buffer_capacity: usize,
    /// Bumped on every sync round and disconnect; stale bootstraps compare against it
    epoch: u64,
    /// Event time of the last applied update
    last_event_time: u64,
}

impl InstrumentBook {
    /// Create a new empty, unsynced order book
    pub fn new(symbol: &str, buffer_capacity: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BidLevels::new(),
            asks: AskLevels::new(),
            sync_state: SyncState::Unsynced,
            last_update_id: None,
            bridging: false,
            pending: VecDeque::with_capacity(buffer_capacity.min(1024)),
            buffer_capacity: buffer_capacity.max(1),
            epoch: 0,
            last_event_time: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }

    pub fn last_update_id(&self) -> Option<u64> {
        self.last_update_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_bridging(&self) -> bool {
        self.bridging
    }

    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    pub fn bids(&self) -> &BidLevels {
        &self.bids
    }

    pub fn asks(&self) -> &AskLevels {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best_level()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best_level()
    }

    /// Start a sync round. Only an unsynced book can start one, so at most one
    /// bootstrap is outstanding per instrument. Returns the round's epoch.
    pub fn begin_sync(&mut self) -> Option<u64> {
        if self.sync_state != SyncState::Unsynced {
            return None;
        }
        self.sync_state = SyncState::Syncing;
        self.epoch += 1;
        Some(self.epoch)
    }

    /// Whether a bootstrap started at `epoch` may still install its snapshot
    pub fn accepts_snapshot(&self, epoch: u64) -> bool {
        self.sync_state == SyncState::Syncing && self.epoch == epoch
    }

    /// Buffer an update while unsynced. Returns true if the oldest buffered
    /// update had to be dropped to make room.
    pub fn buffer(&mut self, update: DepthUpdate) -> bool {
        self.pending.push_back(update);
        if self.pending.len() > self.buffer_capacity {
            if let Some(dropped) = self.pending.pop_front() {
                warn!(
                    symbol = %self.symbol,
                    capacity = self.buffer_capacity,
                    dropped_first_id = dropped.first_update_id,
                    dropped_final_id = dropped.final_update_id,
                    "Update buffer full, dropped oldest update"
                );
            }
            return true;
        }
        false
    }

    /// Levels are kept but no longer trusted; a new bootstrap is needed.
    pub fn mark_desynced(&mut self) {
        self.sync_state = SyncState::Unsynced;
        self.bridging = false;
    }

    /// The update stream went away: updates buffered so far can never be
    /// bridged to a later snapshot, and any outstanding bootstrap is void.
    pub fn mark_disconnected(&mut self) {
        let discarded = self.pending.len();
        self.pending.clear();
        self.sync_state = SyncState::Unsynced;
        self.bridging = false;
        self.epoch += 1;
        info!(
            symbol = %self.symbol,
            discarded,
            "Order book marked unsynced after disconnect"
        );
    }

    /// Replace both sides with a snapshot, all-or-nothing, and enter the
    /// synced state at `last_update_id`. The caller replays buffered updates.
    pub(crate) fn install_snapshot(
        &mut self,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        last_update_id: u64,
    ) -> Result<()> {
        BidLevels::validate(bids)?;
        AskLevels::validate(asks)?;
        self.bids.snapshot_replace(bids)?;
        self.asks.snapshot_replace(asks)?;

        self.last_update_id = Some(last_update_id);
        self.bridging = true;
        self.sync_state = SyncState::Synced;
        Ok(())
    }

    pub(crate) fn take_pending(&mut self) -> VecDeque<DepthUpdate> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn upsert(&mut self, side: Side, level: &PriceLevel) -> Result<()> {
        match side {
            Side::Bid => self.bids.upsert(level.price, level.quantity),
            Side::Ask => self.asks.upsert(level.price, level.quantity),
        }
    }

    /// Record a fully applied update
    pub(crate) fn advance(&mut self, final_update_id: u64, event_time: u64) {
        self.last_update_id = Some(final_update_id);
        self.last_event_time = event_time;
        self.bridging = false;
    }

    /// Get a consistent copy for reporting
    pub fn view(&self) -> BookView {
        BookView {
            symbol: self.symbol.clone(),
            sync_state: self.sync_state,
            last_update_id: self.last_update_id,
            event_time: self.last_event_time,
            bids: self.bids.levels(),
            asks: self.asks.levels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn update(first: u64, last: u64) -> DepthUpdate {
        DepthUpdate {
            event_type: "depthUpdate".to_string(),
            event_time: 0,
            symbol: "BTCUSDT".to_string(),
            first_update_id: first,
            final_update_id: last,
            bids: vec![],
            asks: vec![],
            rejected_levels: 0,
        }
    }

    #[test]
    fn test_new_book_is_unsynced() {
        let book = InstrumentBook::new("BTCUSDT", 10);
        assert_eq!(book.symbol(), "BTCUSDT");
        assert_eq!(book.sync_state(), SyncState::Unsynced);
        assert_eq!(book.last_update_id(), None);
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn test_begin_sync_is_exclusive() {
        let mut book = InstrumentBook::new("BTCUSDT", 10);

        let epoch = book.begin_sync().unwrap();
        assert_eq!(book.sync_state(), SyncState::Syncing);
        assert!(book.begin_sync().is_none());
        assert!(book.accepts_snapshot(epoch));
    }

    #[test]
    fn test_disconnect_voids_outstanding_bootstrap() {
        let mut book = InstrumentBook::new("BTCUSDT", 10);
        let epoch = book.begin_sync().unwrap();
        book.buffer(update(1, 1));

        book.mark_disconnected();

        assert_eq!(book.sync_state(), SyncState::Unsynced);
        assert_eq!(book.buffered_len(), 0);
        assert!(!book.accepts_snapshot(epoch));

        let next = book.begin_sync().unwrap();
        assert!(next > epoch);
    }

    #[test]
    fn test_buffer_drops_oldest_on_overflow() {
        let mut book = InstrumentBook::new("BTCUSDT", 2);

        assert!(!book.buffer(update(1, 1)));
        assert!(!book.buffer(update(2, 2)));
        assert!(book.buffer(update(3, 3)));

        let pending: Vec<u64> = book
            .take_pending()
            .iter()
            .map(|u| u.first_update_id)
            .collect();
        assert_eq!(pending, vec![2, 3]);
    }

    #[test]
    fn test_install_snapshot_is_all_or_nothing() {
        let mut book = InstrumentBook::new("BTCUSDT", 10);
        book.begin_sync();

        let result = book.install_snapshot(
            &[PriceLevel::new(dec!(100), dec!(1))],
            &[PriceLevel::new(dec!(101), dec!(-1))],
            7,
        );

        assert!(result.is_err());
        assert!(book.bids().is_empty());
        assert_eq!(book.sync_state(), SyncState::Syncing);
        assert_eq!(book.last_update_id(), None);
    }

    #[test]
    fn test_install_snapshot_and_view() {
        let mut book = InstrumentBook::new("BTCUSDT", 10);
        book.begin_sync();
        book.install_snapshot(
            &[
                PriceLevel::new(dec!(99), dec!(1)),
                PriceLevel::new(dec!(100), dec!(2)),
            ],
            &[PriceLevel::new(dec!(101), dec!(1))],
            42,
        )
        .unwrap();

        assert!(book.is_synced());
        assert!(book.is_bridging());
        assert_eq!(book.last_update_id(), Some(42));
        assert_eq!(book.bids().notional() + book.asks().notional(), dec!(400));

        let view = book.view();
        assert_eq!(view.bids[0].price, dec!(100));
        assert_eq!(view.asks.len(), 1);
        assert_eq!(view.last_update_id, Some(42));
    }

    #[test]
    fn test_mark_desynced_keeps_levels() {
        let mut book = InstrumentBook::new("BTCUSDT", 10);
        book.begin_sync();
        book.install_snapshot(&[PriceLevel::new(dec!(100), dec!(2))], &[], 1)
            .unwrap();

        book.mark_desynced();

        assert_eq!(book.sync_state(), SyncState::Unsynced);
        assert_eq!(book.best_bid(), Some(PriceLevel::new(dec!(100), dec!(2))));
    }
}
