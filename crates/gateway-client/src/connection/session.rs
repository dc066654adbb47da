//! Per-connection session record
//!
//! Shared between the receive loop (writer of state and sequence) and the heartbeat
//! task (reader). Every field sits behind its own lock; the state only moves through
//! [`Session::advance`], which rejects transitions the lifecycle does not allow.

use gateway_common::Credential;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of one gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is being opened
    Connecting,
    /// Transport open, waiting for op 10
    AwaitingHello,
    /// Hello received, identify in flight
    Identifying,
    /// Identified and heartbeating
    Active,
    /// Close frame sent, waiting for the server to finish the handshake
    ClosingGraceful,
    /// Transport being dropped without a handshake
    ClosingForced,
    Closed,
}

impl SessionState {
    /// Whether the lifecycle allows moving from `self` to `next`
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        use SessionState::{
            Active, AwaitingHello, Closed, ClosingForced, ClosingGraceful, Connecting, Identifying,
        };
        match (self, next) {
            (Connecting, AwaitingHello)
            | (AwaitingHello, Identifying)
            | (Identifying, Active)
            | (ClosingGraceful | ClosingForced, Closed) => true,
            (Connecting | AwaitingHello | Identifying | Active, ClosingGraceful | ClosingForced) => {
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
struct HeartbeatStats {
    last_sent: Option<Instant>,
    acked: bool,
    latency: Option<Duration>,
}

/// State of one gateway session
pub struct Session {
    connection_id: String,
    credential: Credential,
    state: RwLock<SessionState>,
    last_sequence: RwLock<Option<u64>>,
    heartbeat_interval: RwLock<Option<Duration>>,
    heartbeat: Mutex<HeartbeatStats>,
}

impl Session {
    pub fn new(credential: Credential) -> Arc<Self> {
        Arc::new(Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            credential,
            state: RwLock::new(SessionState::Connecting),
            last_sequence: RwLock::new(None),
            heartbeat_interval: RwLock::new(None),
            heartbeat: Mutex::new(HeartbeatStats {
                last_sent: None,
                acked: true,
                latency: None,
            }),
        })
    }

    /// Local identifier used in logs; the server never sees it
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Move to `next` if the lifecycle allows it; returns whether the move happened
    pub fn advance(&self, next: SessionState) -> bool {
        let mut state = self.state.write();
        if !state.can_advance_to(next) {
            tracing::trace!(
                connection_id = %self.connection_id,
                from = %*state,
                to = %next,
                "Ignoring session transition"
            );
            return false;
        }
        tracing::debug!(
            connection_id = %self.connection_id,
            from = %*state,
            to = %next,
            "Session state changed"
        );
        *state = next;
        true
    }

    /// Claim the hello for this connection
    ///
    /// Only the first caller while `AwaitingHello` wins; it moves the session to
    /// `Identifying` and records the interval. Every later hello gets `false`.
    pub fn begin_identify(&self, heartbeat_interval: Duration) -> bool {
        let mut state = self.state.write();
        if *state != SessionState::AwaitingHello {
            return false;
        }
        *state = SessionState::Identifying;
        *self.heartbeat_interval.write() = Some(heartbeat_interval);
        true
    }

    pub fn last_sequence(&self) -> Option<u64> {
        *self.last_sequence.read()
    }

    /// Commit a sequence number received from the server
    ///
    /// Lower values are ignored so the committed sequence never goes backwards.
    /// Returns whether the stored value changed.
    pub fn observe_sequence(&self, sequence: u64) -> bool {
        let mut last = self.last_sequence.write();
        match *last {
            Some(current) if current >= sequence => false,
            _ => {
                *last = Some(sequence);
                true
            }
        }
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        *self.heartbeat_interval.read()
    }

    /// Note a heartbeat about to go out; returns whether the previous one was acked
    pub fn record_heartbeat_sent(&self) -> bool {
        let mut stats = self.heartbeat.lock();
        let previous_acked = stats.acked;
        stats.last_sent = Some(Instant::now());
        stats.acked = false;
        previous_acked
    }

    /// Note an op 11; returns the round trip when a heartbeat was outstanding
    pub fn record_heartbeat_ack(&self) -> Option<Duration> {
        let mut stats = self.heartbeat.lock();
        if stats.acked {
            return None;
        }
        stats.acked = true;
        let latency = stats.last_sent.map(|sent| sent.elapsed());
        stats.latency = latency;
        latency
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.lock().latency
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("state", &self.state())
            .field("last_sequence", &self.last_sequence())
            .field("heartbeat_interval", &self.heartbeat_interval())
            .finish_non_exhaustive()
    }
}
