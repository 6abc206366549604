//! Snapshot bootstrap
//!
//! Installs a REST snapshot into an instrument book and replays the updates
//! that were buffered while it was in flight. Retries with backoff until the
//! book is synced or the round is superseded by a disconnect.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{ApplyOutcome, SnapshotSource, UpdateApplier};
use crate::backoff::Backoff;
use crate::error::{MarketDataError, Result};
use crate::orderbook::{BookHandle, BookRegistry, InstrumentBook};
use crate::parser::OrderBookSnapshot;
use crate::telemetry::Telemetry;

/// Result of installing one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Book is synced; `replayed` buffered updates applied, `discarded` older than the snapshot
    Synced { replayed: usize, discarded: usize },
    /// A buffered update did not follow the snapshot; the book is unsynced again
    Desynced,
    /// The sync round this snapshot belonged to is no longer current
    Superseded,
}

pub struct SnapshotBootstrapper {
    registry: Arc<BookRegistry>,
    source: Arc<dyn SnapshotSource>,
    applier: Arc<UpdateApplier>,
    telemetry: Arc<Telemetry>,
    retry_delay_ms: u64,
    max_backoff_ms: u64,
}

impl SnapshotBootstrapper {
    pub fn new(
        registry: Arc<BookRegistry>,
        source: Arc<dyn SnapshotSource>,
        applier: Arc<UpdateApplier>,
        telemetry: Arc<Telemetry>,
        retry_delay_ms: u64,
        max_backoff_ms: u64,
    ) -> Self {
        Self {
            registry,
            source,
            applier,
            telemetry,
            retry_delay_ms,
            max_backoff_ms,
        }
    }

    /// Install `snapshot` into a book locked for writing and replay its
    /// buffered updates, all under that one lock.
    pub fn install(
        &self,
        book: &mut InstrumentBook,
        epoch: u64,
        snapshot: &OrderBookSnapshot,
    ) -> Result<InstallOutcome> {
        if !book.accepts_snapshot(epoch) {
            return Ok(InstallOutcome::Superseded);
        }

        book.install_snapshot(&snapshot.bids, &snapshot.asks, snapshot.last_update_id)
            .map_err(|e| MarketDataError::BootstrapFailure {
                symbol: book.symbol().to_string(),
                reason: e.to_string(),
            })?;

        let mut replayed = 0;
        let mut discarded = 0;
        for update in book.take_pending() {
            if update.final_update_id <= snapshot.last_update_id {
                discarded += 1;
                continue;
            }
            if self.applier.apply(book, update) == ApplyOutcome::Applied {
                replayed += 1;
            }
        }

        if !book.is_synced() {
            return Ok(InstallOutcome::Desynced);
        }

        self.telemetry
            .bootstraps_completed
            .with_label_values(&[book.symbol()])
            .inc();
        info!(
            symbol = %book.symbol(),
            snapshot_id = snapshot.last_update_id,
            last_update_id = ?book.last_update_id(),
            bid_levels = book.bids().len(),
            ask_levels = book.asks().len(),
            replayed,
            discarded,
            "Order book synchronized"
        );

        Ok(InstallOutcome::Synced {
            replayed,
            discarded,
        })
    }

    /// Bootstrap `symbol` on the current task. Returns false if the book
    /// was not unsynced (a bootstrap is already running, or it is synced).
    pub async fn bootstrap(&self, symbol: &str) -> Result<bool> {
        let Some((handle, epoch)) = self.begin(symbol).await? else {
            return Ok(false);
        };
        self.run(symbol, handle, epoch).await;
        Ok(true)
    }

    /// Bootstrap `symbol` on a background task, unless one is outstanding
    pub async fn schedule(self: &Arc<Self>, symbol: &str) -> Result<bool> {
        let Some((handle, epoch)) = self.begin(symbol).await? else {
            debug!(symbol = %symbol, "Bootstrap already outstanding");
            return Ok(false);
        };

        let this = Arc::clone(self);
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            this.run(&symbol, handle, epoch).await;
        });
        Ok(true)
    }

    async fn begin(&self, symbol: &str) -> Result<Option<(BookHandle, u64)>> {
        let handle = self.registry.get(symbol)?;
        let epoch = {
            let mut book = handle.write().await;
            let epoch = book.begin_sync();
            self.telemetry.set_sync_state(symbol, book.sync_state());
            epoch
        };
        Ok(epoch.map(|epoch| (handle, epoch)))
    }

    async fn run(&self, symbol: &str, handle: BookHandle, mut epoch: u64) {
        let mut backoff = Backoff::from_millis(self.retry_delay_ms, self.max_backoff_ms);

        loop {
            match self.source.fetch(symbol).await {
                Ok(snapshot) => {
                    let mut book = handle.write().await;
                    let result = self.install(&mut book, epoch, &snapshot);
                    match result {
                        Ok(InstallOutcome::Synced { .. }) | Ok(InstallOutcome::Superseded) => {
                            self.telemetry.set_sync_state(symbol, book.sync_state());
                            return;
                        }
                        Ok(InstallOutcome::Desynced) => {
                            warn!(
                                symbol = %symbol,
                                snapshot_id = snapshot.last_update_id,
                                "Buffered updates do not follow snapshot, fetching a newer one"
                            );
                            match book.begin_sync() {
                                Some(next) => epoch = next,
                                None => return,
                            }
                        }
                        Err(e) => self.record_failure(symbol, e, backoff.attempt()),
                    }
                    self.telemetry.set_sync_state(symbol, book.sync_state());
                }
                Err(e) => {
                    let err = MarketDataError::BootstrapFailure {
                        symbol: symbol.to_string(),
                        reason: e.to_string(),
                    };
                    self.record_failure(symbol, err, backoff.attempt());
                }
            }

            sleep(backoff.next_delay()).await;

            if !handle.read().await.accepts_snapshot(epoch) {
                debug!(symbol = %symbol, epoch, "Bootstrap superseded");
                return;
            }
        }
    }

    fn record_failure(&self, symbol: &str, err: MarketDataError, attempt: u32) {
        self.telemetry
            .bootstrap_failures
            .with_label_values(&[symbol])
            .inc();
        warn!(error = %err, attempt, "Snapshot bootstrap failed, retrying");
    }
}
