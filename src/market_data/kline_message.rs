use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::market_data::Candle;
use crate::types::SubscriptionKey;

/// Build the single-stream kline URL for one subscription key.
///
/// `base` is the stream host path, e.g. `wss://stream.binance.com:9443/ws`;
/// a trailing slash is tolerated.
pub fn kline_stream_url(base: &str, key: &SubscriptionKey) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.stream_name())
}

/// Application-level keep-alive frame.
#[derive(Debug, Serialize)]
struct PingFrame {
    method: &'static str,
}

/// Serialised `{"method":"ping"}` keep-alive message.
pub fn ping_message() -> String {
    serde_json::to_string(&PingFrame { method: "ping" })
        .unwrap_or_else(|_| r#"{"method":"ping"}"#.to_string())
}

/// Parse one inbound stream message.
///
/// Returns `Ok(None)` for any message that is not a kline event (subscription
/// acks, pongs, errors from the exchange). Malformed JSON or a kline with a
/// missing/unparsable field is an error.
///
/// Expected shape (single stream; the combined `{stream, data}` envelope is
/// unwrapped too):
/// ```json
/// { "e": "kline", "s": "ETHUSDT", "k": { "t": 1700000000000, "o": "1", "h": "2", "l": "0.5", "c": "1.5" } }
/// ```
pub fn parse_kline_message(text: &str) -> Result<Option<Candle>> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = match root.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => &root,
    };

    if data.get("e").and_then(|e| e.as_str()) != Some("kline") {
        return Ok(None);
    }

    let k = data.get("k").context("missing field k")?;

    let open_time_ms = k["t"].as_i64().context("missing field k.t")?;

    let candle = Candle {
        time: open_time_ms.div_euclid(1000),
        open: parse_string_f64(&k["o"], "k.o")?,
        high: parse_string_f64(&k["h"], "k.h")?,
        low: parse_string_f64(&k["l"], "k.l")?,
        close: parse_string_f64(&k["c"], "k.c")?,
    };

    Ok(Some(candle))
}

/// Binance sends prices as JSON strings inside kline objects.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    let parsed = match val {
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}"))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64"))?,
        serde_json::Value::Null => bail!("missing field {name}"),
        _ => bail!("field {name} has unexpected JSON type"),
    };

    if !parsed.is_finite() {
        bail!("field {name} is not finite: {parsed}");
    }
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
