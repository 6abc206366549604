//! WebSocket client for one Binance depth stream
//!
//! Handles connection and message reception.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single symbol's depth stream
pub struct WebSocketClient {
    stream: Option<WsStream>,
    endpoint: String,
    symbol: String,
}

impl WebSocketClient {
    /// Create a new WebSocket client
    pub fn new(endpoint: &str, symbol: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Raw stream URL for the symbol's 100ms diff depth stream
    pub fn url(&self) -> String {
        format!("{}/{}@depth@100ms", self.endpoint, self.symbol.to_lowercase())
    }

    /// Connect to the WebSocket endpoint
    pub async fn connect(&mut self) -> Result<()> {
        let url = self.url();

        info!(symbol = %self.symbol, url = %url, "Connecting to Binance WebSocket");

        let (ws_stream, response) = connect_async(&url).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(symbol = %self.symbol, status = ?response.status(), "WebSocket connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Receive the next message
    ///
    /// `Ok(None)` means a control frame was handled; close, error and end of
    /// stream all surface as `StreamDisconnect`.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.disconnect_error("not connected"));
        };

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Err(e) = stream.send(Message::Pong(data)).await {
                    warn!(symbol = %self.symbol, error = %e, "Failed to answer ping");
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(symbol = %self.symbol, frame = ?frame, "Received close frame");
                self.stream = None;
                Err(self.disconnect_error("connection closed"))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(symbol = %self.symbol, error = %e, "WebSocket error");
                self.stream = None;
                Err(self.disconnect_error(&e.to_string()))
            }
            None => {
                warn!(symbol = %self.symbol, "WebSocket stream ended");
                self.stream = None;
                Err(self.disconnect_error("stream ended"))
            }
        }
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Ping(vec![]))
                .await
                .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;
        }
        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }

    fn disconnect_error(&self, reason: &str) -> MarketDataError {
        MarketDataError::StreamDisconnect {
            symbol: self.symbol.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        let client = WebSocketClient::new("wss://stream.binance.com:9443/ws/", "BTCUSDT");
        assert_eq!(
            client.url(),
            "wss://stream.binance.com:9443/ws/btcusdt@depth@100ms"
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_recv_without_connection_is_disconnect() {
        let mut client = WebSocketClient::new("wss://example.invalid/ws", "ETHUSDT");
        assert!(matches!(
            client.recv().await,
            Err(MarketDataError::StreamDisconnect { .. })
        ));
    }
}
