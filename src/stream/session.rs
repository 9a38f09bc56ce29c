// =============================================================================
// Stream Session — one kline connection bound to one subscription key
// =============================================================================
//
// Each session runs as its own task:
//   1. Connect (bounded by the connect timeout).
//   2. While open: dispatch inbound frames, send `{"method":"ping"}` on every
//      keep-alive tick.
//   3. On fault or remote close: report Closing → Reconnecting and exit. The
//      supervisor owns the reconnect delay.
//   4. On dispose: close the transport and exit without reconnecting.
//
// The supervisor receives everything through a per-session channel. Disposing
// a session drops that receiver before signalling the task, so nothing the
// task emits afterwards can reach a series.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::market_data::{kline_stream_url, parse_kline_message, ping_message, Candle};
use crate::runtime_config::ViewerConfig;
use crate::stream::state::{CloseCause, SessionState, Transition};
use crate::stream::transport::{Connector, Inbound, Transport};
use crate::types::SubscriptionKey;

/// Per-session settings derived from [`ViewerConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub stream_base: String,
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
}

impl From<&ViewerConfig> for SessionConfig {
    fn from(cfg: &ViewerConfig) -> Self {
        Self {
            stream_base: cfg.stream_base.clone(),
            ping_interval: cfg.ping_interval(),
            connect_timeout: cfg.connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Transport,
    Protocol,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

/// Reported by a session task to its supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(SessionState),
    Candle(Candle),
    Fault { kind: FaultKind, message: String },
}

// ---------------------------------------------------------------------------
// Supervisor-side handle
// ---------------------------------------------------------------------------

pub struct SessionHandle {
    id: Uuid,
    key: SubscriptionKey,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn a session task for `key`. It starts connecting immediately.
    pub fn spawn<C: Connector>(
        connector: Arc<C>,
        key: SubscriptionKey,
        config: &SessionConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = SessionTask {
            id,
            key,
            url: kline_stream_url(&config.stream_base, &key),
            ping_interval: config.ping_interval,
            connect_timeout: config.connect_timeout,
            state: SessionState::Idle,
            events: event_tx,
        };
        let task = tokio::spawn(task.run(connector, shutdown_rx));

        Self {
            id,
            key,
            events: Some(event_rx),
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> SubscriptionKey {
        self.key
    }

    /// Next event from the session; pending forever once the channel is
    /// detached or the task has finished.
    pub async fn next_event(&mut self) -> SessionEvent {
        match self.events.as_mut() {
            Some(rx) => match rx.recv().await {
                Some(event) => event,
                None => {
                    self.events = None;
                    std::future::pending().await
                }
            },
            None => std::future::pending().await,
        }
    }

    /// Discard the session: detach its event channel, then tell the task to
    /// close its transport. Never reconnects. Returns the task handle so a
    /// caller can wait for the close to finish.
    pub fn dispose(mut self) -> JoinHandle<()> {
        drop(self.events.take());
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        debug!(session_id = %self.id, key = %self.key, "session disposed");
        self.task
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

struct SessionTask {
    id: Uuid,
    key: SubscriptionKey,
    url: String,
    ping_interval: Duration,
    connect_timeout: Duration,
    state: SessionState,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionTask {
    async fn run<C: Connector>(mut self, connector: Arc<C>, mut shutdown: oneshot::Receiver<()>) {
        self.advance(Transition::Connect);
        info!(session_id = %self.id, key = %self.key, url = %self.url, "connecting to kline WebSocket");

        let connect = tokio::time::timeout(self.connect_timeout, connector.connect(&self.url));
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            res = connect => Some(res),
        };

        let mut transport = match outcome {
            None => {
                self.advance(Transition::Dispose);
                self.advance(Transition::TransportClosed);
                return;
            }
            Some(Ok(Ok(transport))) => transport,
            Some(Ok(Err(e))) => {
                error!(session_id = %self.id, key = %self.key, error = %e, "kline WebSocket connect failed");
                self.fault(FaultKind::Transport, format!("connect failed: {e:#}"));
                self.close_after(CloseCause::TransportError);
                return;
            }
            Some(Err(_elapsed)) => {
                error!(
                    session_id = %self.id,
                    key = %self.key,
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "kline WebSocket connect timed out"
                );
                self.fault(FaultKind::Transport, "connect timed out".to_string());
                self.close_after(CloseCause::TransportError);
                return;
            }
        };

        self.advance(Transition::HandshakeOk);
        info!(session_id = %self.id, key = %self.key, "kline WebSocket connected");

        let cause = self.run_open(&mut transport, &mut shutdown).await;

        if cause == CloseCause::Replaced {
            self.advance(Transition::Dispose);
            if tokio::time::timeout(self.connect_timeout, transport.close()).await.is_err() {
                warn!(session_id = %self.id, key = %self.key, "kline WebSocket close timed out, dropping transport");
            }
            self.advance(Transition::TransportClosed);
            info!(session_id = %self.id, key = %self.key, "kline WebSocket closed on request");
        } else {
            self.close_after(cause);
        }
    }

    /// Dispatch loop for an open connection. Returns why it ended.
    async fn run_open<T: Transport>(
        &mut self,
        transport: &mut T,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> CloseCause {
        let mut keepalive =
            tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut *shutdown => return CloseCause::Replaced,

                inbound = transport.next_inbound() => match inbound {
                    Inbound::Text(text) => self.on_text(&text),
                    Inbound::Closed { code, reason } => {
                        warn!(session_id = %self.id, key = %self.key, code = ?code, reason = %reason, "kline WebSocket closed by remote");
                        self.fault(FaultKind::Transport, format!("remote closed ({code:?}): {reason}"));
                        return CloseCause::RemoteClosed;
                    }
                    Inbound::Error(e) => {
                        error!(session_id = %self.id, key = %self.key, error = %e, "kline WebSocket read error");
                        self.fault(FaultKind::Transport, format!("read error: {e}"));
                        return CloseCause::TransportError;
                    }
                },

                _ = keepalive.tick() => {
                    if !self.state.is_open() {
                        continue;
                    }
                    match transport.send_text(ping_message()).await {
                        Ok(()) => debug!(session_id = %self.id, key = %self.key, "keep-alive ping sent"),
                        Err(e) => warn!(session_id = %self.id, key = %self.key, error = %e, "keep-alive ping skipped"),
                    }
                }
            }
        }
    }

    fn on_text(&self, text: &str) {
        match parse_kline_message(text) {
            Ok(Some(candle)) => {
                debug!(
                    session_id = %self.id,
                    key = %self.key,
                    time = candle.time,
                    close = candle.close,
                    "candle update"
                );
                self.emit(SessionEvent::Candle(candle));
            }
            Ok(None) => {
                debug!(session_id = %self.id, key = %self.key, "non-kline message ignored");
            }
            Err(e) => {
                warn!(session_id = %self.id, key = %self.key, error = %e, "failed to parse kline message");
                self.fault(FaultKind::Protocol, format!("{e:#}"));
            }
        }
    }

    /// Closing(cause) then Reconnecting; the transport is already gone.
    fn close_after(&mut self, cause: CloseCause) {
        self.advance(Transition::Fault(cause));
        self.advance(Transition::TransportClosed);
    }

    fn advance(&mut self, input: Transition) {
        match self.state.next(input) {
            Some(next) => {
                debug!(session_id = %self.id, key = %self.key, from = %self.state, to = %next, "session state transition");
                self.state = next;
                self.emit(SessionEvent::State(next));
            }
            None => {
                warn!(session_id = %self.id, state = %self.state, input = ?input, "invalid session transition ignored");
            }
        }
    }

    fn fault(&self, kind: FaultKind, message: String) {
        self.emit(SessionEvent::Fault { kind, message });
    }

    /// Sends fail silently once the supervisor has detached this session.
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
