//! Session states and the owned call-session record
//!
//! One receiver process owns exactly one [`CallSession`]. The session
//! is never shared mutably: the event loop in `manager` is its sole
//! writer, which is what makes every transition atomic with respect
//! to the database callback, the push callback, transport events and
//! user actions.

use chrono::{DateTime, Utc};

/// Lifecycle state of the receiver's call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No call; the only state that accepts a new incoming signal
    Idle,
    /// A call record is claimed and the ring tone is playing
    Ringing,
    /// The user accepted; credential fetch and media-room join are in
    /// flight, or the room is joined and empty
    Connecting,
    /// Media is flowing with at least one remote participant
    Active,
    /// The transport dropped recoverably; a bounded rejoin loop runs
    Reconnecting,
    /// Best-effort cleanup before returning to Idle
    Terminating,
}

impl SessionState {
    /// Whether a call currently occupies the session
    ///
    /// A new incoming signal is only honored when this is false
    /// (at-most-one-active-call).
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// Whether media could be flowing in this state
    pub fn has_media(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Reconnecting)
    }

    /// Short name used in log fields and status displays
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Ringing => "ringing",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Terminating => "terminating",
        }
    }
}

/// The single in-memory call session owned by the receiver process
///
/// Invariants maintained by the event loop:
/// - `claimed_call_id` is `Some` if and only if the state is busy
/// - `epoch` increments on every return to Idle, so timer fires and
///   async task completions from a finished call are recognizably
///   stale and ignored
#[derive(Debug)]
pub struct CallSession {
    /// Current lifecycle state
    pub state: SessionState,
    /// Call record id this session owns, when busy
    pub claimed_call_id: Option<String>,
    /// Visitor display name from the claimed signal, for feedback
    pub caller_name: Option<String>,
    /// Guard value carried by timers and spawned tasks
    pub epoch: u64,
    /// Consecutive reconnect attempts since the last stable Active
    pub reconnect_attempts: u32,
    /// Remote participants currently observed in the joined room
    pub remote_participants: usize,
    /// When ringing started, for diagnostics
    pub ringing_since: Option<DateTime<Utc>>,
    /// When the call went Active, for diagnostics
    pub connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// A fresh idle session
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            claimed_call_id: None,
            caller_name: None,
            epoch: 0,
            reconnect_attempts: 0,
            remote_participants: 0,
            ringing_since: None,
            connected_at: None,
        }
    }

    /// Whether `call_id` is the call this session owns
    pub fn owns(&self, call_id: &str) -> bool {
        self.claimed_call_id.as_deref() == Some(call_id)
    }

    /// Reset to Idle, bumping the epoch so in-flight work for the old
    /// call becomes stale
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.claimed_call_id = None;
        self.caller_name = None;
        self.reconnect_attempts = 0;
        self.remote_participants = 0;
        self.ringing_since = None;
        self.connected_at = None;
        self.epoch += 1;
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}
