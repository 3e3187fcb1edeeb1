//! Error types for the session state machine
//!
//! The taxonomy drives behavior, not just reporting: recoverable
//! errors are retried up to the configured cap, stale and conflict
//! outcomes are resolved silently, and fatal/exhausted errors are
//! surfaced through the feedback sink before the session force-resets
//! to Idle so the next call can still ring.

use entrybell_signal_core::SignalError;
use thiserror::Error;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors produced while driving a call session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The credential-minting endpoint failed
    #[error("Credential fetch failed: {reason}")]
    Credential {
        /// Description of the failure
        reason: String,
    },

    /// The media transport failed to connect or dropped the room
    #[error("Media transport error: {reason}")]
    Transport {
        /// Description of the failure
        reason: String,
    },

    /// A retried operation exhausted its attempt budget
    #[error("{operation} failed after {attempts} attempts")]
    RetriesExhausted {
        /// Name of the operation that gave up
        operation: String,
        /// How many attempts were made
        attempts: u32,
    },

    /// A signaling channel failure bubbled up
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// A configuration field failed validation
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// The offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// The session event queue is gone; the manager has shut down
    #[error("Session event channel closed")]
    ChannelClosed,
}

impl SessionError {
    /// Whether retrying the same operation can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::Credential { .. } | SessionError::Transport { .. } => true,
            SessionError::Signal(e) => e.is_recoverable(),
            SessionError::RetriesExhausted { .. }
            | SessionError::InvalidConfiguration { .. }
            | SessionError::ChannelClosed => false,
        }
    }

    /// Coarse category used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::Credential { .. } => "credential",
            SessionError::Transport { .. } => "transport",
            SessionError::RetriesExhausted { .. } => "exhausted",
            SessionError::Signal(_) => "signal",
            SessionError::InvalidConfiguration { .. } => "config",
            SessionError::ChannelClosed => "channel",
        }
    }

    /// Whether the claimed call was already resolved elsewhere, which
    /// ends the session silently instead of surfacing a failure
    pub fn is_already_resolved(&self) -> bool {
        matches!(self, SessionError::Signal(SignalError::AlreadyResolved { .. }))
    }
}
