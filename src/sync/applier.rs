//! Incremental update application
//!
//! Version relation (Binance depth stream, `U` = first id, `u` = final id):
//! - steady state: `U == last + 1`, anything else is a desync;
//! - first update after a snapshot `S`: `u <= S` is stale, otherwise it must
//!   satisfy `U <= S + 1 <= u`.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{MarketDataError, Result};
use crate::orderbook::{BookRegistry, InstrumentBook, SyncState};
use crate::parser::DepthUpdate;
use crate::telemetry::Telemetry;

/// What happened to one update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// All level changes were applied and the version advanced
    Applied,
    /// The book is not synced; the update waits for a snapshot
    Buffered { needs_bootstrap: bool },
    /// Already covered by the installed snapshot
    Stale,
    /// Version discontinuity; the book is now unsynced
    Desynced { expected: u64, got: u64 },
}

impl ApplyOutcome {
    pub fn needs_bootstrap(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Buffered {
                needs_bootstrap: true
            } | ApplyOutcome::Desynced { .. }
        )
    }
}

/// Applies depth updates to instrument books
pub struct UpdateApplier {
    telemetry: Arc<Telemetry>,
}

impl UpdateApplier {
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        Self { telemetry }
    }

    /// Apply one update to a book the caller has locked for writing.
    ///
    /// The whole update runs under that single lock, so readers see either
    /// none or all of its changes.
    pub fn apply(&self, book: &mut InstrumentBook, update: DepthUpdate) -> ApplyOutcome {
        if !book.is_synced() {
            let needs_bootstrap = book.sync_state() == SyncState::Unsynced;
            self.buffer(book, update);
            return ApplyOutcome::Buffered { needs_bootstrap };
        }

        // A synced book always has a version
        let last = book.last_update_id().unwrap_or_default();
        // None at u64::MAX: nothing can follow
        let expected = last.checked_add(1);

        let in_sequence = if book.is_bridging() {
            if update.final_update_id <= last {
                debug!(
                    symbol = %book.symbol(),
                    final_update_id = update.final_update_id,
                    snapshot_id = last,
                    "Dropping update covered by snapshot"
                );
                self.telemetry
                    .updates_stale
                    .with_label_values(&[book.symbol()])
                    .inc();
                return ApplyOutcome::Stale;
            }
            expected.map_or(false, |next| update.first_update_id <= next)
        } else {
            expected == Some(update.first_update_id)
        };

        if !in_sequence {
            return self.desync(book, update, expected.unwrap_or(last));
        }

        let mut rejected = 0u64;
        for (side, level) in update.changes() {
            if let Err(e) = book.upsert(side, level) {
                warn!(symbol = %book.symbol(), side = ?side, error = %e, "Rejected price level");
                rejected += 1;
            }
        }
        book.advance(update.final_update_id, update.event_time);

        let symbol = book.symbol();
        if rejected > 0 {
            self.telemetry
                .invalid_levels
                .with_label_values(&[symbol])
                .inc_by(rejected);
        }
        self.telemetry
            .updates_applied
            .with_label_values(&[symbol])
            .inc();

        ApplyOutcome::Applied
    }

    /// Lock the update's book and apply it
    pub async fn apply_to(&self, registry: &BookRegistry, update: DepthUpdate) -> Result<ApplyOutcome> {
        let handle = registry.get(&update.symbol)?;
        let mut book = handle.write().await;
        let outcome = self.apply(&mut book, update);
        self.telemetry.set_sync_state(book.symbol(), book.sync_state());
        Ok(outcome)
    }

    fn buffer(&self, book: &mut InstrumentBook, update: DepthUpdate) {
        let overflowed = book.buffer(update);
        let symbol = book.symbol();
        self.telemetry
            .updates_buffered
            .with_label_values(&[symbol])
            .inc();
        if overflowed {
            self.telemetry
                .buffer_overflows
                .with_label_values(&[symbol])
                .inc();
        }
    }

    fn desync(&self, book: &mut InstrumentBook, update: DepthUpdate, expected: u64) -> ApplyOutcome {
        let got = update.first_update_id;
        let err = MarketDataError::Desync {
            symbol: book.symbol().to_string(),
            expected,
            got,
        };
        warn!(
            error = %err,
            final_update_id = update.final_update_id,
            "Depth sequence broken, book needs a new snapshot"
        );
        self.telemetry
            .desyncs
            .with_label_values(&[book.symbol()])
            .inc();

        book.mark_desynced();
        // Newer than anything applied; a later snapshot may still need it
        self.buffer(book, update);

        ApplyOutcome::Desynced { expected, got }
    }
}
