//! Named, state-scoped session timers
//!
//! Each stage of a call has its own bound - ring answer, room join,
//! empty room, total duration, remote hang-up grace - because every
//! external dependency can silently stall and a stuck stage must not
//! wedge the session in a busy state forever. Timers are owned by one
//! registry instead of loose handles: arming replaces any previous
//! timer of the same kind, transitions cancel what they must, and a
//! fire that outlives its call is dropped by the epoch check in the
//! event loop.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::events::SessionEvent;

/// The named timers a session can arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Unanswered ring auto-rejects when this fires
    Ring,
    /// Credential fetch + room join bound
    Ice,
    /// Joined room with zero remote participants bound
    EmptyRoom,
    /// Hard cap on total call duration
    MaxDuration,
    /// Grace delay after the last remote participant leaves
    DisconnectGrace,
}

impl TimerKind {
    /// Name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Ring => "ring",
            TimerKind::Ice => "ice",
            TimerKind::EmptyRoom => "empty-room",
            TimerKind::MaxDuration => "max-duration",
            TimerKind::DisconnectGrace => "disconnect-grace",
        }
    }
}

/// Owner of all pending session timers
pub struct TimerRegistry {
    event_tx: mpsc::Sender<SessionEvent>,
    pending: HashMap<TimerKind, JoinHandle<()>>,
}

impl TimerRegistry {
    /// Create a registry that posts fires into the session queue
    pub fn new(event_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            event_tx,
            pending: HashMap::new(),
        }
    }

    /// Arm `kind` to fire after `duration`, replacing any pending
    /// timer of the same kind
    ///
    /// The fire carries `epoch`; the event loop drops fires whose
    /// epoch no longer matches the session, so a timer that leaks past
    /// a transition is a guarded no-op even before it is aborted.
    pub fn arm(&mut self, kind: TimerKind, duration: Duration, epoch: u64) {
        self.cancel(kind);
        debug!(
            timer = kind.as_str(),
            duration_ms = duration.as_millis() as u64,
            epoch = epoch,
            "timer armed"
        );
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(SessionEvent::Timer { kind, epoch }).await;
        });
        self.pending.insert(kind, handle);
    }

    /// Cancel a pending timer, if armed
    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.pending.remove(&kind) {
            handle.abort();
            trace!(timer = kind.as_str(), "timer cancelled");
        }
    }

    /// Whether `kind` is currently armed
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.pending
            .get(&kind)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Cancel every pending timer; called on every return to Idle
    pub fn cancel_all(&mut self) {
        for (kind, handle) in self.pending.drain() {
            handle.abort();
            trace!(timer = kind.as_str(), "timer cancelled");
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
