//! Signal de-duplication boundary
//!
//! The database live query is at-least-once and the push channel can
//! deliver the same call again moments later; both paths funnel
//! through one deduper keyed by call id so the state machine sees at
//! most one signal per call within the suppression window. Dedup must
//! happen before any state transition - two near-simultaneous signals
//! for the same id must not double-claim.
//!
//! Uses `tokio::time::Instant` so paused-clock tests control the
//! window deterministically.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Default suppression window
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Suppresses repeated signals for the same call id
#[derive(Debug)]
pub struct SignalDeduper {
    window: Duration,
    seen: HashMap<String, Instant>,
}

impl SignalDeduper {
    /// Create a deduper with the given suppression window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Whether a signal for `call_id` should pass through now
    ///
    /// The first observation of an id passes and refreshes its window;
    /// repeats inside the window are suppressed (last-signal-wins: the
    /// suppressed repeat still refreshes the window so a burst of
    /// duplicates collapses to one ring). An id seen again after the
    /// window has elapsed passes again - by then the record itself
    /// decides whether it still rings.
    pub fn admit(&mut self, call_id: &str) -> bool {
        let now = Instant::now();
        self.prune(now);
        match self.seen.get_mut(call_id) {
            Some(last) => {
                *last = now;
                debug!(call_id = %call_id, "duplicate signal suppressed");
                false
            }
            None => {
                self.seen.insert(call_id.to_string(), now);
                true
            }
        }
    }

    /// Forget an id immediately, e.g. after its call fully resolved
    pub fn forget(&mut self, call_id: &str) {
        self.seen.remove(call_id);
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, last| now.duration_since(*last) < window);
    }
}

impl Default for SignalDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
