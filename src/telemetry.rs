//! Prometheus counters for book synchronization
//!
//! Each `Telemetry` owns its own registry so independent instances (tests,
//! multiple handlers in one process) never collide on registration.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::Result;
use crate::orderbook::SyncState;

const NAMESPACE: &str = "market_depth";

pub struct Telemetry {
    registry: Registry,
    pub updates_applied: IntCounterVec,
    pub updates_buffered: IntCounterVec,
    pub updates_stale: IntCounterVec,
    pub buffer_overflows: IntCounterVec,
    pub desyncs: IntCounterVec,
    pub bootstraps_completed: IntCounterVec,
    pub bootstrap_failures: IntCounterVec,
    pub stream_disconnects: IntCounterVec,
    pub invalid_levels: IntCounterVec,
    pub sync_state: IntGaugeVec,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounterVec> {
            let vec = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &["symbol"])?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let updates_applied = counter("updates_applied_total", "Depth updates applied to a book")?;
        let updates_buffered = counter(
            "updates_buffered_total",
            "Depth updates buffered while the book was not synced",
        )?;
        let updates_stale = counter(
            "updates_stale_total",
            "Depth updates already covered by the installed snapshot",
        )?;
        let buffer_overflows = counter(
            "buffer_overflows_total",
            "Buffered updates dropped because the buffer was full",
        )?;
        let desyncs = counter("desyncs_total", "Version discontinuities detected")?;
        let bootstraps_completed =
            counter("bootstraps_completed_total", "Snapshots installed successfully")?;
        let bootstrap_failures = counter(
            "bootstrap_failures_total",
            "Snapshot fetches or installs that failed",
        )?;
        let stream_disconnects =
            counter("stream_disconnects_total", "Update stream disconnections")?;
        let invalid_levels = counter("invalid_levels_total", "Price levels rejected as malformed")?;

        let sync_state = IntGaugeVec::new(
            Opts::new(
                "sync_state",
                "Book sync state (0 = unsynced, 1 = syncing, 2 = synced)",
            )
            .namespace(NAMESPACE),
            &["symbol"],
        )?;
        registry.register(Box::new(sync_state.clone()))?;

        Ok(Self {
            registry,
            updates_applied,
            updates_buffered,
            updates_stale,
            buffer_overflows,
            desyncs,
            bootstraps_completed,
            bootstrap_failures,
            stream_disconnects,
            invalid_levels,
            sync_state,
        })
    }

    pub fn set_sync_state(&self, symbol: &str, state: SyncState) {
        self.sync_state.with_label_values(&[symbol]).set(state.code());
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::MarketDataError::MetricsError(e.to_string()))
    }
}
