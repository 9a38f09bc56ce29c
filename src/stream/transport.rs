use std::future::Future;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// What a transport yields to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The remote end closed the stream (close frame or end of stream).
    Closed { code: Option<u16>, reason: String },
    /// Transport-level read error; the connection is unusable afterwards.
    Error(String),
}

/// One established connection.
///
/// `next_inbound` must be cancel-safe: sessions poll it inside `select!`.
pub trait Transport: Send + 'static {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<()>> + Send;

    fn next_inbound(&mut self) -> impl Future<Output = Inbound> + Send;

    /// Best-effort graceful close.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens transports to a stream URL.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Transport>> + Send;
}

// ---------------------------------------------------------------------------
// tokio-tungstenite implementation
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

pub struct WsTransport {
    stream: WsStream,
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &str) -> Result<WsTransport> {
        let (stream, _response) = connect_async(url)
            .await
            .context("failed to connect to kline WebSocket")?;
        Ok(WsTransport { stream })
    }
}

impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .context("failed to send WebSocket frame")
    }

    async fn next_inbound(&mut self) -> Inbound {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Inbound::Text(text),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, "no close frame".to_string()),
                    };
                    return Inbound::Closed { code, reason };
                }
                // Pong replies to server pings are queued by tungstenite itself.
                Some(Ok(other)) => {
                    debug!(kind = ?frame_kind(&other), "non-text WebSocket frame ignored");
                }
                Some(Err(e)) => return Inbound::Error(e.to_string()),
                None => {
                    return Inbound::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}

fn frame_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
