//! In-memory connector for lifecycle tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::stream::transport::{Connector, Inbound, Transport};

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// A minimal kline event for `open_time_ms` with every price set to `price`.
pub fn kline_json(open_time_ms: i64, price: &str) -> String {
    format!(
        r#"{{"e":"kline","s":"ETHUSDT","k":{{"t":{open_time_ms},"o":"{price}","h":"{price}","l":"{price}","c":"{price}"}}}}"#
    )
}

/// Server side of one mock connection.
#[derive(Clone)]
pub struct MockLink {
    to_client: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockLink {
    pub fn push_text(&self, text: &str) {
        let _ = self.to_client.send(Inbound::Text(text.to_string()));
    }

    pub fn push_close(&self, code: Option<u16>, reason: &str) {
        let _ = self.to_client.send(Inbound::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn push_error(&self, error: &str) {
        let _ = self.to_client.send(Inbound::Error(error.to_string()));
    }

    /// Frames the client sent on this link.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    from_server: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    hang_close: bool,
}

impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("mock transport closed");
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_inbound(&mut self) -> Inbound {
        match self.from_server.recv().await {
            Some(inbound) => inbound,
            None => Inbound::Closed {
                code: None,
                reason: "mock server dropped".to_string(),
            },
        }
    }

    async fn close(&mut self) {
        if self.hang_close {
            std::future::pending::<()>().await;
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockState {
    urls: Vec<String>,
    links: Vec<MockLink>,
    fail: bool,
    hang: bool,
    hang_close: bool,
}

/// Records every connect attempt; each success creates a [`MockLink`].
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<MockState>,
}

impl MockConnector {
    /// Subsequent connects fail immediately.
    pub fn fail_connects(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// Subsequent connects never complete.
    pub fn hang_connects(&self, hang: bool) {
        self.state.lock().hang = hang;
    }

    /// Transports from subsequent connects never finish closing.
    pub fn hang_closes(&self, hang: bool) {
        self.state.lock().hang_close = hang;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    /// Link of the `idx`-th successful connect.
    pub fn link(&self, idx: usize) -> MockLink {
        self.state.lock().links[idx].clone()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport> {
        let (fail, hang, hang_close) = {
            let mut state = self.state.lock();
            state.urls.push(url.to_string());
            (state.fail, state.hang, state.hang_close)
        };

        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            bail!("connection refused");
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.state.lock().links.push(MockLink {
            to_client,
            sent: sent.clone(),
            closed: closed.clone(),
        });

        Ok(MockTransport {
            from_server,
            sent,
            closed,
            hang_close,
        })
    }
}
