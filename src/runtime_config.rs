// =============================================================================
// Viewer Configuration — stream endpoint, timers and presentation bind address
// =============================================================================
//
// Every field carries `#[serde(default = "...")]` so a partial (or absent)
// config file still yields a complete configuration. The defaults are the
// exchange's public stream host and the fixed keep-alive / reconnect timings.
//
// The configuration is read-only at runtime: nothing is written back to disk.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::DEFAULT_SERIES_CAP;
use crate::types::{Interval, Symbol, SubscriptionKey};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_stream_base() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_series_cap() -> usize {
    DEFAULT_SERIES_CAP
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// ViewerConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Stream host path; the stream name is appended after a `/`.
    #[serde(default = "default_stream_base")]
    pub stream_base: String,

    /// Keep-alive period while a session is open.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Delay between a transport fault and the replacement session.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Handshake deadline; exceeding it counts as a transport fault.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum candles retained per subscription key.
    #[serde(default = "default_series_cap")]
    pub series_cap: usize,

    #[serde(default)]
    pub initial_symbol: Symbol,

    #[serde(default)]
    pub initial_interval: Interval,

    /// Listen address of the presentation API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            stream_base: default_stream_base(),
            ping_interval_ms: default_ping_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            series_cap: default_series_cap(),
            initial_symbol: Symbol::default(),
            initial_interval: Interval::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl ViewerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read viewer config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse viewer config from {}", path.display()))?;

        info!(
            path = %path.display(),
            stream_base = %config.stream_base,
            initial_key = %config.initial_key(),
            "viewer config loaded"
        );

        Ok(config)
    }

    /// Apply `KLINE_VIEWER_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("KLINE_VIEWER_BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr.trim().to_string();
            }
        }
        if let Ok(base) = std::env::var("KLINE_VIEWER_STREAM_BASE") {
            if !base.trim().is_empty() {
                self.stream_base = base.trim().to_string();
            }
        }
    }

    pub fn initial_key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.initial_symbol, self.initial_interval)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}
