//! Session events and the presentation/feedback seam
//!
//! Every stimulus the session reacts to - signals, user actions,
//! timer fires, transport events, async task completions - is one
//! [`SessionEvent`] processed serially by the manager's event loop.
//! Modeling the inputs as a single alphabet is what makes each
//! transition atomic and independently testable.
//!
//! [`FeedbackSink`] is the boundary to the presentation layer (UI
//! state, ring tone, haptics). It consumes transitions and never
//! participates in the logic.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entrybell_signal_core::IncomingCallSignal;

use crate::error::SessionError;
use crate::state::SessionState;
use crate::timers::TimerKind;
use crate::transport::{RoomEvent, RoomHandle};

/// One stimulus for the session state machine
pub enum SessionEvent {
    /// A de-duplicated incoming-call signal (database or push path)
    Signal(IncomingCallSignal),
    /// User accepted the ringing call
    Accept,
    /// User rejected the ringing call
    Reject,
    /// User hung up the current call
    Hangup,
    /// User toggled the manual do-not-disturb flag
    SetDnd(bool),
    /// User toggled the local microphone
    SetMuted(bool),
    /// A named timer fired; stale when `epoch` does not match the
    /// current session epoch
    Timer {
        /// Which timer fired
        kind: TimerKind,
        /// Session epoch at the time the timer was armed
        epoch: u64,
    },
    /// The spawned join task finished
    JoinOutcome {
        /// Session epoch at the time the task was spawned
        epoch: u64,
        /// The joined room, or why joining failed
        result: Result<Box<dyn RoomHandle>, SessionError>,
    },
    /// One spawned reconnect attempt finished
    ReconnectOutcome {
        /// Session epoch at the time the attempt was spawned
        epoch: u64,
        /// The rejoined room, or why the attempt failed
        result: Result<Box<dyn RoomHandle>, SessionError>,
    },
    /// An event from a joined media room; stale when `generation` does
    /// not match the currently installed room
    Room {
        /// Which installed room's pump forwarded the event
        generation: u64,
        /// The event itself
        event: RoomEvent,
    },
    /// An end-call push: the visitor leg resolved this call
    EndCallPush {
        /// Call record id the push refers to
        call_id: String,
    },
    /// Stop the event loop after cleaning up
    Shutdown,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Signal(s) => f.debug_tuple("Signal").field(s).finish(),
            SessionEvent::Accept => write!(f, "Accept"),
            SessionEvent::Reject => write!(f, "Reject"),
            SessionEvent::Hangup => write!(f, "Hangup"),
            SessionEvent::SetDnd(on) => f.debug_tuple("SetDnd").field(on).finish(),
            SessionEvent::SetMuted(on) => f.debug_tuple("SetMuted").field(on).finish(),
            SessionEvent::Timer { kind, epoch } => f
                .debug_struct("Timer")
                .field("kind", kind)
                .field("epoch", epoch)
                .finish(),
            SessionEvent::JoinOutcome { epoch, result } => f
                .debug_struct("JoinOutcome")
                .field("epoch", epoch)
                .field("ok", &result.is_ok())
                .finish(),
            SessionEvent::ReconnectOutcome { epoch, result } => f
                .debug_struct("ReconnectOutcome")
                .field("epoch", epoch)
                .field("ok", &result.is_ok())
                .finish(),
            SessionEvent::Room { generation, event } => f
                .debug_struct("Room")
                .field("generation", generation)
                .field("event", event)
                .finish(),
            SessionEvent::EndCallPush { call_id } => f
                .debug_struct("EndCallPush")
                .field("call_id", call_id)
                .finish(),
            SessionEvent::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// A completed state transition, as reported to the feedback sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition
    pub previous: SessionState,
    /// State after the transition
    pub new_state: SessionState,
    /// Call the session owns, when busy
    pub call_id: Option<String>,
    /// Visitor display name, when known
    pub caller_name: Option<String>,
    /// Why the transition happened (log-friendly, not localized)
    pub reason: String,
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
}

/// Presentation adapter boundary
///
/// Implementations drive UI status, the audible ring, vibration and
/// similar device feedback. Callbacks run on the session event loop,
/// so they must return promptly; anything slow belongs on a task the
/// implementation spawns itself.
#[async_trait]
pub trait FeedbackSink: Send + Sync + 'static {
    /// The session moved to a new state
    async fn on_state_changed(&self, change: StateChange);

    /// The ring tone should start
    async fn on_ring_started(&self, call_id: &str, caller_name: Option<&str>);

    /// The ring tone should stop
    async fn on_ring_stopped(&self);

    /// A call was suppressed by do-not-disturb; show a muted status
    /// instead of ringing
    async fn on_muted_suppressed(&self, call_id: &str);

    /// An unrecoverable failure was surfaced; the session has been
    /// force-reset and is available again
    async fn on_fatal(&self, reason: &str);
}

/// Feedback sink that ignores everything; useful for headless tests
/// and embedders that poll the state watch instead
pub struct NullFeedback;

#[async_trait]
impl FeedbackSink for NullFeedback {
    async fn on_state_changed(&self, _change: StateChange) {}
    async fn on_ring_started(&self, _call_id: &str, _caller_name: Option<&str>) {}
    async fn on_ring_stopped(&self) {}
    async fn on_muted_suppressed(&self, _call_id: &str) {}
    async fn on_fatal(&self, _reason: &str) {}
}
