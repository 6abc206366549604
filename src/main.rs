//! Market Depth - order book synchronizer
//!
//! Connects one Binance depth stream per configured symbol, keeps the books
//! in sync with REST snapshots, and reports resting notional volume.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_depth::{
    AppState, Config, MetricsReporter, Publisher, RestSnapshotClient, WebSocketManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Market Depth synchronizer");

    // Load configuration
    let config = Config::load()?;
    info!(symbols = ?config.symbols, "Configuration loaded");

    let source = Arc::new(RestSnapshotClient::new(
        &config.rest_endpoint,
        config.depth_levels,
    )?);
    let state = Arc::new(AppState::new(config, source)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start health check server
    let health_state = state.clone();
    let health_shutdown = shutdown_rx.clone();
    let health = tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_shutdown).await {
            warn!(error = %e, "Health server error");
        }
    });

    // One stream per symbol
    let mut streams = Vec::with_capacity(state.registry.len());
    for symbol in state.registry.symbols() {
        let mut manager = WebSocketManager::new(state.clone(), &symbol, shutdown_rx.clone());
        streams.push(tokio::spawn(async move {
            if let Err(e) = manager.run().await {
                error!(symbol = %symbol, error = %e, "Depth stream failed");
            }
        }));
    }

    // Periodic volume reports
    let mut reporter = MetricsReporter::new(
        state.registry.clone(),
        Duration::from_secs(state.config.report_interval_secs),
    );
    if let Some(path) = state.config.ipc_socket_path.as_deref() {
        reporter = reporter.with_publisher(Arc::new(Publisher::new(path).await?));
    }
    let reporting = tokio::spawn(reporter.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    if shutdown_tx.send(true).is_err() {
        warn!("All tasks already stopped");
    }

    for stream in streams {
        if let Err(e) = stream.await {
            warn!(error = %e, "Depth stream task panicked");
        }
    }
    if let Err(e) = reporting.await {
        warn!(error = %e, "Reporter task panicked");
    }
    if let Err(e) = health.await {
        warn!(error = %e, "Health server task panicked");
    }

    info!("Market Depth synchronizer stopped");
    Ok(())
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = state.config.health_addr.parse()?;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let books: serde_json::Map<String, serde_json::Value> = state
        .registry
        .sync_states()
        .await
        .into_iter()
        .map(|(symbol, sync_state)| (symbol, serde_json::json!(sync_state)))
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "component": "market-depth",
        "books": books,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, (StatusCode, String)> {
    state
        .telemetry
        .encode()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
