// =============================================================================
// Kline Viewer — Main Entry Point
// =============================================================================
//
// Streams live candlesticks for one (symbol, interval) pair, keeps a bounded
// per-pair series, and serves the active series to a renderer over HTTP and
// WebSocket. The stream heals itself: faults reconnect after a fixed delay.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod market_data;
mod runtime_config;
mod stream;
mod supervisor;
mod types;
mod view_state;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::runtime_config::ViewerConfig;
use crate::stream::WsConnector;
use crate::supervisor::Supervisor;

const CONFIG_PATH: &str = "viewer_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Kline Viewer — starting up");

    let mut config = ViewerConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ViewerConfig::default()
    });
    config.apply_env_overrides();

    info!(
        stream_base = %config.stream_base,
        initial_key = %config.initial_key(),
        ping_interval_ms = config.ping_interval_ms,
        reconnect_delay_ms = config.reconnect_delay_ms,
        series_cap = config.series_cap,
        "Viewer configured"
    );

    // ── 2. Stream supervisor ─────────────────────────────────────────────
    let (supervisor, supervisor_task) = Supervisor::spawn(Arc::new(WsConnector), &config);

    // ── 3. Presentation API ──────────────────────────────────────────────
    let app = api::rest::router(supervisor.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "API server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    supervisor.shutdown().await;
    if let Err(e) = supervisor_task.await {
        error!(error = %e, "Supervisor task ended abnormally");
    }
    server.abort();

    info!("Kline Viewer shut down complete.");
    Ok(())
}
