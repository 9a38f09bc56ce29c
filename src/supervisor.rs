// =============================================================================
// Session Supervisor — one active key, one active session
// =============================================================================
//
// Runs as a single task and is the only writer of the per-key series map.
// Work arrives as discrete events, handled one at a time:
//   - commands from the presentation layer (select key, shutdown),
//   - events from the current session (state, candle, fault),
//   - the reconnect timer.
//
// Disposing a session detaches its event channel inside the same event step,
// so a superseded session can never merge into any series. The reconnect
// timer is an owned `Sleep`; clearing the option cancels it.
// =============================================================================

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::market_data::CandleSeries;
use crate::runtime_config::ViewerConfig;
use crate::stream::{Connector, SessionConfig, SessionEvent, SessionHandle, SessionState};
use crate::types::SubscriptionKey;
use crate::view_state::{ViewState, ViewUpdate};

/// How long shutdown waits for the active session to close its transport.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Commands & errors
// =============================================================================

enum Command {
    Select {
        key: SubscriptionKey,
        reply: oneshot::Sender<Result<SubscriptionKey, SelectError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectError {
    /// A handshake is in flight; selection is disabled until it settles.
    Connecting,
    /// The supervisor has shut down.
    Unavailable,
}

impl std::fmt::Display for SelectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "selection is disabled while connecting"),
            Self::Unavailable => write!(f, "supervisor is not running"),
        }
    }
}

impl std::error::Error for SelectError {}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable front door to the supervisor task.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
    view: Arc<ViewState>,
}

impl SupervisorHandle {
    /// Make `key` the active subscription.
    pub async fn select(&self, key: SubscriptionKey) -> Result<SubscriptionKey, SelectError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Select { key, reply })
            .await
            .map_err(|_| SelectError::Unavailable)?;
        rx.await.map_err(|_| SelectError::Unavailable)?
    }

    /// Dispose the active session and stop the supervisor. Resolves once
    /// every timer is cancelled.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }
}

// =============================================================================
// Supervisor task
// =============================================================================

pub struct Supervisor<C: Connector> {
    connector: Arc<C>,
    session_config: SessionConfig,
    reconnect_delay: Duration,
    series_cap: usize,

    active_key: SubscriptionKey,
    series: HashMap<SubscriptionKey, CandleSeries>,
    session: Option<SessionHandle>,
    session_state: SessionState,
    reconnect: Option<Pin<Box<Sleep>>>,

    view: Arc<ViewState>,
    commands: mpsc::Receiver<Command>,
}

impl<C: Connector> Supervisor<C> {
    /// Spawn the supervisor; it activates the configured initial key at once.
    pub fn spawn(connector: Arc<C>, config: &ViewerConfig) -> (SupervisorHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let initial_key = config.initial_key();
        let view = Arc::new(ViewState::new(initial_key));

        let supervisor = Supervisor {
            connector,
            session_config: SessionConfig::from(config),
            reconnect_delay: config.reconnect_delay(),
            series_cap: config.series_cap,
            active_key: initial_key,
            series: HashMap::new(),
            session: None,
            session_state: SessionState::Idle,
            reconnect: None,
            view: view.clone(),
            commands: cmd_rx,
        };

        let task = tokio::spawn(supervisor.run());
        let handle = SupervisorHandle {
            commands: cmd_tx,
            view,
        };
        (handle, task)
    }

    async fn run(mut self) {
        self.activate(self.active_key);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Select { key, reply }) => {
                        let _ = reply.send(self.select(key));
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },

                event = next_session_event(&mut self.session) => self.on_session_event(event),

                () = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    info!(key = %self.active_key, "attempting to reconnect");
                    self.start_session();
                }
            }
        }
    }

    // ── Key selection ───────────────────────────────────────────────────

    fn select(&mut self, key: SubscriptionKey) -> Result<SubscriptionKey, SelectError> {
        if self.session_state.is_connecting() {
            debug!(requested = %key, active = %self.active_key, "selection rejected while connecting");
            return Err(SelectError::Connecting);
        }
        if key == self.active_key && (self.session.is_some() || self.reconnect.is_some()) {
            return Ok(key);
        }

        info!(from = %self.active_key, to = %key, "subscription key changed");
        self.activate(key);
        Ok(key)
    }

    /// Dispose whatever is running and start a fresh session for `key`.
    fn activate(&mut self, key: SubscriptionKey) {
        // The old task finishes closing its transport on its own.
        let _ = self.dispose_current();
        self.active_key = key;
        let cap = self.series_cap;
        self.series
            .entry(key)
            .or_insert_with(|| CandleSeries::new(cap));
        self.start_session();
    }

    fn start_session(&mut self) {
        let session = SessionHandle::spawn(
            self.connector.clone(),
            self.active_key,
            &self.session_config,
        );
        debug!(session_id = %session.id(), key = %self.active_key, "session created");
        self.session = Some(session);
        self.session_state = SessionState::Idle;
        self.publish();
    }

    /// Cancel the reconnect timer and discard the active session. Both are
    /// no-ops when nothing is pending.
    fn dispose_current(&mut self) -> Option<JoinHandle<()>> {
        self.reconnect = None;
        let task = self.session.take().map(SessionHandle::dispose);
        self.session_state = SessionState::Closed;
        task
    }

    // ── Session events ──────────────────────────────────────────────────

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::State(state) => {
                self.session_state = state;
                if state == SessionState::Reconnecting {
                    if let Some(session) = self.session.take() {
                        info!(
                            session_id = %session.id(),
                            key = %session.key(),
                            delay_ms = self.reconnect_delay.as_millis() as u64,
                            "session lost, reconnect scheduled"
                        );
                    }
                    self.reconnect = Some(Box::pin(tokio::time::sleep(self.reconnect_delay)));
                }
                self.publish();
            }
            SessionEvent::Candle(candle) => {
                let cap = self.series_cap;
                let series = self
                    .series
                    .entry(self.active_key)
                    .or_insert_with(|| CandleSeries::new(cap));
                series.merge(candle);
                debug!(key = %self.active_key, time = candle.time, series_len = series.len(), "candle merged");
                self.publish();
            }
            SessionEvent::Fault { kind, message } => {
                debug!(key = %self.active_key, kind = %kind, message = %message, "session fault recorded");
                self.view.push_fault(kind, self.active_key, message);
            }
        }
    }

    fn publish(&self) {
        let candles = self
            .series
            .get(&self.active_key)
            .map(CandleSeries::to_vec)
            .unwrap_or_default();
        self.view.publish(ViewUpdate {
            key: self.active_key,
            session_state: self.session_state,
            session_id: self.session.as_ref().map(|s| s.id().to_string()),
            candles,
        });
    }

    // ── Shutdown ────────────────────────────────────────────────────────

    async fn shutdown(&mut self) {
        info!(key = %self.active_key, "supervisor shutting down");
        let task = self.dispose_current();
        self.publish();

        if let Some(task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("session did not close within the shutdown grace period");
            }
        }
    }
}

async fn next_session_event(session: &mut Option<SessionHandle>) -> SessionEvent {
    match session.as_mut() {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Tests
// =============================================================================
