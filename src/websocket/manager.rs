//! WebSocket connection manager
//!
//! Owns one symbol's depth stream: reconnects with backoff, requests a
//! snapshot on every (re)connect, feeds updates to the book and marks it
//! unsynced whenever the stream drops.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use super::WebSocketClient;
use crate::backoff::Backoff;
use crate::error::{MarketDataError, Result};
use crate::orderbook::SyncState;
use crate::parser::ParsedMessage;
use crate::AppState;

/// A connection that lived this long resets the backoff (5 minutes)
const RECONNECT_COOLDOWN_SECS: u64 = 300;
/// No frame within this window triggers a keepalive probe
const RECV_TIMEOUT_SECS: u64 = 45;
/// Ping if only control frames arrived for this long
const KEEPALIVE_SECS: u64 = 30;

/// Manages one symbol's depth stream with automatic reconnection
pub struct WebSocketManager {
    symbol: String,
    state: Arc<AppState>,
    client: WebSocketClient,
    backoff: Backoff,
    shutdown: watch::Receiver<bool>,
}

impl WebSocketManager {
    /// Create a new WebSocket manager
    pub fn new(state: Arc<AppState>, symbol: &str, shutdown: watch::Receiver<bool>) -> Self {
        let client = WebSocketClient::new(&state.config.ws_endpoint, symbol);
        let backoff = Backoff::from_millis(state.config.reconnect_delay_ms, state.config.max_backoff_ms);

        Self {
            symbol: symbol.to_string(),
            state,
            client,
            backoff,
            shutdown,
        }
    }

    /// Run until shutdown, reconnecting after every failure
    pub async fn run(&mut self) -> Result<()> {
        info!(symbol = %self.symbol, "Starting depth stream");

        while !*self.shutdown.borrow() {
            let connected_at = Instant::now();

            let delay = match self.connect_and_process().await {
                Ok(()) => break,
                Err(e) => {
                    error!(symbol = %self.symbol, error = %e, "Depth stream error");
                    self.handle_disconnect().await;

                    if connected_at.elapsed() > Duration::from_secs(RECONNECT_COOLDOWN_SECS)
                        && self.backoff.attempt() > 0
                    {
                        info!(
                            symbol = %self.symbol,
                            previous_attempts = self.backoff.attempt(),
                            "Resetting reconnect counter after stable connection"
                        );
                        self.backoff.reset();
                    }

                    let delay = self.backoff.next_delay();
                    warn!(
                        symbol = %self.symbol,
                        attempt = self.backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );
                    delay
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }

        // Release the book: nothing will keep it current any more
        self.client.close().await;
        self.handle_disconnect().await;
        info!(symbol = %self.symbol, "Depth stream stopped");
        Ok(())
    }

    /// Connect and process messages. Returns `Ok` only on shutdown.
    async fn connect_and_process(&mut self) -> Result<()> {
        self.client.connect().await?;

        // Updates buffer from here on; the snapshot is bridged to them
        self.state.bootstrapper.schedule(&self.symbol).await?;

        let mut last_message = Instant::now();
        let keepalive = Duration::from_secs(KEEPALIVE_SECS);

        loop {
            let received = tokio::select! {
                _ = self.shutdown.changed() => None,
                received = timeout(Duration::from_secs(RECV_TIMEOUT_SECS), self.client.recv()) => Some(received),
            };

            let Some(received) = received else {
                info!(symbol = %self.symbol, "Shutdown requested, closing depth stream");
                self.client.close().await;
                return Ok(());
            };

            match received {
                Ok(Ok(Some(text))) => {
                    last_message = Instant::now();
                    if let Err(e) = self.process_message(&text).await {
                        warn!(symbol = %self.symbol, error = %e, "Failed to process message");
                    }
                }
                Ok(Ok(None)) => {
                    // Control frame only
                    if last_message.elapsed() > keepalive {
                        if let Err(e) = self.client.ping().await {
                            warn!(error = %e, "Failed to send keepalive ping");
                        }
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        symbol = %self.symbol,
                        last_message_secs = last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = self.client.ping().await {
                        warn!(error = %e, "Failed to send keepalive ping, reconnecting");
                        return Err(MarketDataError::ConnectionTimeout);
                    }
                }
            }
        }
    }

    /// Process a single WebSocket message
    async fn process_message(&self, raw: &str) -> Result<()> {
        match ParsedMessage::parse(raw)? {
            ParsedMessage::DepthUpdate(update) => {
                if update.symbol != self.symbol {
                    debug!(expected = %self.symbol, got = %update.symbol, "Ignoring update for other symbol");
                    return Ok(());
                }
                if update.rejected_levels > 0 {
                    self.state
                        .telemetry
                        .invalid_levels
                        .with_label_values(&[&self.symbol])
                        .inc_by(update.rejected_levels as u64);
                }

                let outcome = self
                    .state
                    .applier
                    .apply_to(&self.state.registry, update)
                    .await?;
                trace!(symbol = %self.symbol, outcome = ?outcome, "Depth update processed");

                if outcome.needs_bootstrap() {
                    self.state.bootstrapper.schedule(&self.symbol).await?;
                }
            }
            ParsedMessage::Unknown(msg) => {
                trace!(msg = %msg, "Unknown message type");
            }
        }

        Ok(())
    }

    async fn handle_disconnect(&self) {
        self.state
            .telemetry
            .stream_disconnects
            .with_label_values(&[&self.symbol])
            .inc();
        if let Err(e) = self.state.registry.mark_disconnected(&self.symbol).await {
            warn!(symbol = %self.symbol, error = %e, "Failed to mark book unsynced");
        }
        self.state
            .telemetry
            .set_sync_state(&self.symbol, SyncState::Unsynced);
    }
}
