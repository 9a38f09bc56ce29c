// =============================================================================
// View State — what the presentation layer sees
// =============================================================================
//
// The supervisor is the only writer: after every state transition or merge
// it publishes a fresh snapshot of the active key. Readers (REST handlers,
// WebSocket push loops) take cheap clones and subscribe to a version channel
// that ticks on every publish.
//
// Thread safety:
//   - parking_lot::RwLock around the snapshot and the fault log.
//   - tokio::sync::watch for change notification.
// =============================================================================

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use crate::market_data::Candle;
use crate::stream::{FaultKind, SessionState};
use crate::types::SubscriptionKey;

/// Maximum number of recent faults to retain.
const MAX_RECENT_FAULTS: usize = 50;

// =============================================================================
// Fault Record
// =============================================================================

/// A transport or protocol fault reported by a session.
#[derive(Debug, Clone, Serialize)]
pub struct FaultRecord {
    /// `transport` or `protocol`.
    pub kind: String,
    pub key: SubscriptionKey,
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub version: u64,
    pub key: SubscriptionKey,
    /// True from Connecting until Open or disposal.
    pub connecting: bool,
    pub session_state: SessionState,
    pub session_id: Option<String>,
    /// Series of the active key, oldest first.
    pub candles: Vec<Candle>,
    pub updated_at: String,
}

/// Everything the supervisor hands over on publish.
pub struct ViewUpdate {
    pub key: SubscriptionKey,
    pub session_state: SessionState,
    pub session_id: Option<String>,
    pub candles: Vec<Candle>,
}

// =============================================================================
// ViewState
// =============================================================================

pub struct ViewState {
    snapshot: RwLock<ViewSnapshot>,
    recent_faults: RwLock<VecDeque<FaultRecord>>,
    version: watch::Sender<u64>,
    start_time: std::time::Instant,
}

impl ViewState {
    pub fn new(key: SubscriptionKey) -> Self {
        let (version, _rx) = watch::channel(0);
        Self {
            snapshot: RwLock::new(ViewSnapshot {
                version: 0,
                key,
                connecting: false,
                session_state: SessionState::Idle,
                session_id: None,
                candles: Vec::new(),
                updated_at: Utc::now().to_rfc3339(),
            }),
            recent_faults: RwLock::new(VecDeque::with_capacity(MAX_RECENT_FAULTS)),
            version,
            start_time: std::time::Instant::now(),
        }
    }

    // ── Publishing ──────────────────────────────────────────────────────

    /// Replace the snapshot and notify subscribers. Returns the new version.
    pub fn publish(&self, update: ViewUpdate) -> u64 {
        let version = {
            let mut snap = self.snapshot.write();
            snap.version += 1;
            snap.key = update.key;
            snap.connecting = update.session_state.is_connecting();
            snap.session_state = update.session_state;
            snap.session_id = update.session_id;
            snap.candles = update.candles;
            snap.updated_at = Utc::now().to_rfc3339();
            snap.version
        };
        self.version.send_replace(version);
        version
    }

    /// Record a fault. The log is capped at [`MAX_RECENT_FAULTS`]; oldest
    /// entries are evicted first.
    pub fn push_fault(&self, kind: FaultKind, key: SubscriptionKey, message: String) {
        let record = FaultRecord {
            kind: kind.to_string(),
            key,
            message,
            at: Utc::now().to_rfc3339(),
        };

        let mut faults = self.recent_faults.write();
        faults.push_back(record);
        while faults.len() > MAX_RECENT_FAULTS {
            faults.pop_front();
        }
    }

    // ── Reading ─────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshot.read().clone()
    }

    pub fn active_key(&self) -> SubscriptionKey {
        self.snapshot.read().key
    }

    pub fn is_connecting(&self) -> bool {
        self.snapshot.read().connecting
    }

    pub fn current_version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Change notification: the receiver observes every published version.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn recent_faults(&self) -> Vec<FaultRecord> {
        self.recent_faults.read().iter().cloned().collect()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Interval, Symbol};

    fn key() -> SubscriptionKey {
        SubscriptionKey::new(Symbol::EthUsdt, Interval::OneMinute)
    }

    fn update(state: SessionState, candles: Vec<Candle>) -> ViewUpdate {
        ViewUpdate {
            key: key(),
            session_state: state,
            session_id: Some("abc".to_string()),
            candles,
        }
    }

    #[test]
    fn publish_bumps_version_and_derives_connecting() {
        let view = ViewState::new(key());
        assert_eq!(view.current_version(), 0);

        assert_eq!(view.publish(update(SessionState::Connecting, vec![])), 1);
        assert!(view.is_connecting());

        assert_eq!(view.publish(update(SessionState::Open, vec![])), 2);
        assert!(!view.is_connecting());
        assert_eq!(view.snapshot().version, 2);
    }

    #[test]
    fn subscribers_see_changes() {
        let view = ViewState::new(key());
        let mut rx = view.subscribe();
        assert!(!rx.has_changed().unwrap());

        view.publish(update(SessionState::Open, vec![]));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn fault_log_is_bounded() {
        let view = ViewState::new(key());
        for i in 0..(MAX_RECENT_FAULTS + 7) {
            view.push_fault(FaultKind::Protocol, key(), format!("bad message {i}"));
        }
        let faults = view.recent_faults();
        assert_eq!(faults.len(), MAX_RECENT_FAULTS);
        assert_eq!(faults[0].message, "bad message 7");
        assert_eq!(faults[0].kind, "protocol");
    }
}
