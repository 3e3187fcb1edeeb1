//! Error types for the signaling channel adapter
//!
//! Every failure the adapter can produce is enumerated here. The
//! `is_recoverable()` and `category()` helpers drive the retry and
//! logging policy of the layers above: backend blips are retried,
//! malformed documents are skipped, and already-resolved records are
//! an expected outcome of concurrent cleanup rather than a fault.

use thiserror::Error;

/// Result type for signaling channel operations
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors produced by the signaling channel adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The document backend failed (network, quota, transient outage)
    #[error("Signal backend error: {reason}")]
    Backend {
        /// Description of the backend failure
        reason: String,
    },

    /// A call record could not be decoded from its wire form
    #[error("Malformed call record {id}: {reason}")]
    MalformedRecord {
        /// Document id of the offending record
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// A push payload could not be decoded
    #[error("Malformed push payload: {reason}")]
    MalformedPayload {
        /// What was wrong with it
        reason: String,
    },

    /// The record was already accepted, rejected or deleted by the
    /// time we tried to claim it
    #[error("Call record {id} is already resolved")]
    AlreadyResolved {
        /// Document id of the record
        id: String,
    },

    /// The live-query subscription ended and will not deliver further
    /// changes
    #[error("Signal subscription closed")]
    SubscriptionClosed,
}

impl SignalError {
    /// Whether retrying the same operation can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SignalError::Backend { .. })
    }

    /// Coarse category used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            SignalError::Backend { .. } => "backend",
            SignalError::MalformedRecord { .. } | SignalError::MalformedPayload { .. } => {
                "malformed"
            }
            SignalError::AlreadyResolved { .. } => "resolved",
            SignalError::SubscriptionClosed => "subscription",
        }
    }
}
