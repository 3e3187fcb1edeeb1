//! Session configuration
//!
//! Every timeout and retry constant of the call lifecycle lives here.
//! The deployed app versions disagreed on exact values, so none of
//! them is hard-coded in the state machine; the defaults below are
//! the consolidated ones.

use std::time::Duration;

use entrybell_signal_core::RejectMode;

use crate::dnd::DndGate;
use crate::error::{SessionError, SessionResult};
use crate::retry::RetryConfig;
use crate::transport::AudioConstraints;

/// Configuration for a [`crate::manager::SessionManager`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Media room this receiver serves
    pub room: String,
    /// Prefix for the minted transport identity; the full identity is
    /// `{prefix}-{uuid}` so every join is unique
    pub identity_prefix: String,
    /// How long an unanswered ring lasts before auto-reject
    pub ring_timeout: Duration,
    /// Bound on credential fetch + room join (the ICE phase)
    pub ice_timeout: Duration,
    /// Bound on sitting in a joined room with no remote participant
    pub empty_room_timeout: Duration,
    /// Hard cap on total call duration
    pub max_call_duration: Duration,
    /// Grace delay after the last remote participant leaves before
    /// the call auto-hangs-up
    pub disconnect_grace: Duration,
    /// Retry policy for the accept/credential/join sequence
    pub connect_retry: RetryConfig,
    /// Maximum consecutive reconnect attempts after a recoverable
    /// transport drop
    pub reconnect_max_attempts: u32,
    /// Delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Suppression window of the signal dedup boundary
    pub dedup_window: Duration,
    /// Signals whose record is older than this are expired instead of
    /// ringing
    pub stale_signal_age: Duration,
    /// How rejected calls resolve their record
    pub reject_mode: RejectMode,
    /// Do-not-disturb gate
    pub dnd: DndGate,
    /// Audio constraints for room joins
    pub audio: AudioConstraints,
}

impl SessionConfig {
    /// Configuration for `room` with the consolidated defaults
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            identity_prefix: "receiver".to_string(),
            ring_timeout: Duration::from_secs(30),
            ice_timeout: Duration::from_secs(10),
            empty_room_timeout: Duration::from_secs(25),
            max_call_duration: Duration::from_secs(5 * 60),
            disconnect_grace: Duration::from_secs(2),
            connect_retry: RetryConfig::fixed(3, Duration::from_secs(2)),
            reconnect_max_attempts: 3,
            reconnect_delay: Duration::from_secs(2),
            dedup_window: Duration::from_secs(5),
            stale_signal_age: Duration::from_secs(5 * 60),
            reject_mode: RejectMode::Delete,
            dnd: DndGate::overnight(),
            audio: AudioConstraints::default(),
        }
    }

    /// Set the transport identity prefix
    pub fn with_identity_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identity_prefix = prefix.into();
        self
    }

    /// Set the ring timeout
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Set the join (ICE) timeout
    pub fn with_ice_timeout(mut self, timeout: Duration) -> Self {
        self.ice_timeout = timeout;
        self
    }

    /// Set the empty-room timeout
    pub fn with_empty_room_timeout(mut self, timeout: Duration) -> Self {
        self.empty_room_timeout = timeout;
        self
    }

    /// Set the maximum call duration
    pub fn with_max_call_duration(mut self, duration: Duration) -> Self {
        self.max_call_duration = duration;
        self
    }

    /// Set the reconnect budget
    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.reconnect_max_attempts = max_attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Set the connect retry policy
    pub fn with_connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Set how rejected calls resolve their record
    pub fn with_reject_mode(mut self, mode: RejectMode) -> Self {
        self.reject_mode = mode;
        self
    }

    /// Set the do-not-disturb gate
    pub fn with_dnd(mut self, dnd: DndGate) -> Self {
        self.dnd = dnd;
        self
    }

    /// Validate the configuration before the manager starts
    pub fn validate(&self) -> SessionResult<()> {
        fn non_zero(field: &str, value: Duration) -> SessionResult<()> {
            if value.is_zero() {
                return Err(SessionError::InvalidConfiguration {
                    field: field.to_string(),
                    reason: "must be non-zero".to_string(),
                });
            }
            Ok(())
        }

        if self.room.is_empty() {
            return Err(SessionError::InvalidConfiguration {
                field: "room".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.identity_prefix.is_empty() {
            return Err(SessionError::InvalidConfiguration {
                field: "identity_prefix".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        non_zero("ring_timeout", self.ring_timeout)?;
        non_zero("ice_timeout", self.ice_timeout)?;
        non_zero("empty_room_timeout", self.empty_room_timeout)?;
        non_zero("max_call_duration", self.max_call_duration)?;
        if self.connect_retry.max_attempts == 0 {
            return Err(SessionError::InvalidConfiguration {
                field: "connect_retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.reconnect_max_attempts == 0 {
            return Err(SessionError::InvalidConfiguration {
                field: "reconnect_max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
