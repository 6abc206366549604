//! Market Depth - live limit order book library
//!
//! Keeps per-symbol order books in sync with Binance by combining a REST
//! depth snapshot with the diff depth WebSocket stream, and periodically
//! reports the notional volume resting on each book.

use std::sync::Arc;

pub mod backoff;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod parser;
pub mod publisher;
pub mod reporter;
pub mod sync;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use orderbook::{
    BookMetrics, BookRegistry, BookView, InstrumentBook, PriceLevel, Side, SyncState,
    VolumeSnapshot,
};
pub use parser::{DepthUpdate, OrderBookSnapshot, ParsedMessage};
pub use publisher::Publisher;
pub use reporter::{MetricsReporter, VolumeReport};
pub use sync::{
    ApplyOutcome, InstallOutcome, RestSnapshotClient, SnapshotBootstrapper, SnapshotSource,
    UpdateApplier,
};
pub use telemetry::Telemetry;
pub use websocket::WebSocketManager;

/// Application state shared across components
pub struct AppState {
    pub registry: Arc<BookRegistry>,
    pub applier: Arc<UpdateApplier>,
    pub bootstrapper: Arc<SnapshotBootstrapper>,
    pub telemetry: Arc<Telemetry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the books, applier and bootstrapper for every configured symbol
    pub fn new(config: Config, source: Arc<dyn SnapshotSource>) -> Result<Self> {
        config.validate()?;

        let telemetry = Arc::new(Telemetry::new()?);
        let registry = Arc::new(BookRegistry::new(&config.symbols, config.buffer_capacity));
        let applier = Arc::new(UpdateApplier::new(telemetry.clone()));
        let bootstrapper = Arc::new(SnapshotBootstrapper::new(
            registry.clone(),
            source,
            applier.clone(),
            telemetry.clone(),
            config.bootstrap_retry_delay_ms,
            config.max_backoff_ms,
        ));

        for symbol in registry.symbols() {
            telemetry.set_sync_state(&symbol, SyncState::Unsynced);
        }

        Ok(Self {
            registry,
            applier,
            bootstrapper,
            telemetry,
            config: Arc::new(config),
        })
    }
}
