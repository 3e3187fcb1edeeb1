//! Do-not-disturb gate
//!
//! A pure predicate evaluated before a signal may enter Ringing: a
//! manually-toggled flag combined with a time-of-day quiet window.
//! When the gate is active the incoming call record is resolved
//! without ringing and the presentation layer shows a muted status.
//!
//! The predicate is evaluated per-signal against the wall clock - the
//! window result must never be cached across signals. The clock is a
//! seam so tests pin the time of day.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Local wall-clock seam for the quiet-hours check
pub trait LocalClock: Send + Sync + 'static {
    /// Current local time of day
    fn local_time(&self) -> NaiveTime;
}

/// System clock; what production uses
pub struct SystemLocalClock;

impl LocalClock for SystemLocalClock {
    fn local_time(&self) -> NaiveTime {
        chrono::Local::now().time()
    }
}

/// A daily quiet window; handles windows that wrap midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    /// Window start (inclusive)
    pub start: NaiveTime,
    /// Window end (exclusive)
    pub end: NaiveTime,
}

impl QuietHours {
    /// The deployment default, 20:00-08:00
    pub fn overnight() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(20, 0, 0).expect("valid time"),
            end: NaiveTime::from_hms_opt(8, 0, 0).expect("valid time"),
        }
    }

    /// Whether `now` falls inside the window
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            now >= self.start && now < self.end
        } else {
            // Wraps midnight: quiet when after start or before end.
            now >= self.start || now < self.end
        }
    }
}

/// The do-not-disturb predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DndGate {
    /// Manual override, persisted by the embedder
    pub manual: bool,
    /// Optional daily quiet window
    pub quiet_hours: Option<QuietHours>,
}

impl DndGate {
    /// Gate with no quiet hours and the manual flag off
    pub fn disabled() -> Self {
        Self {
            manual: false,
            quiet_hours: None,
        }
    }

    /// Gate with the default overnight window
    pub fn overnight() -> Self {
        Self {
            manual: false,
            quiet_hours: Some(QuietHours::overnight()),
        }
    }

    /// Evaluate the predicate for one signal
    pub fn is_active(&self, now: NaiveTime) -> bool {
        self.manual
            || self
                .quiet_hours
                .map(|window| window.contains(now))
                .unwrap_or(false)
    }
}

impl Default for DndGate {
    fn default() -> Self {
        Self::overnight()
    }
}
