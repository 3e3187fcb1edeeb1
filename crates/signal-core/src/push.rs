//! Push notification channel
//!
//! The push service is a secondary, redundant wake-up path: delivery
//! is best-effort, unordered, may duplicate, and may arrive after the
//! call was already resolved through the database channel. Payloads
//! are therefore treated as hints - a ring push becomes an
//! [`IncomingCallSignal`] that goes through the same dedup boundary as
//! the database stream, and an end-call push is surfaced separately so
//! the session can tear down a claimed call the visitor leg resolved.
//!
//! Wire keys match what the deployed cloud function sends
//! (`type`, `llamadaId`, `sala`, `callerName`).

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SignalError, SignalResult};
use crate::record::{CallRecordState, IncomingCallSignal, ReceiverRegistration, SignalSource};

/// Kind of push payload the cloud function delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// A visitor is ringing
    IncomingCall,
    /// The claimed call was resolved on the visitor side
    EndCall,
}

/// Decoded push payload
#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    /// What the push is about
    pub kind: PushKind,
    /// Call record id the push refers to
    pub call_id: String,
    /// Target room, when the payload carries one
    pub room: Option<String>,
    /// Visitor display name, when the payload carries one
    pub caller_name: Option<String>,
}

impl PushPayload {
    /// Decode the opaque data map of a push message
    ///
    /// Unknown `type` values and missing call ids are malformed; the
    /// push channel is redundant, so a bad payload is dropped by the
    /// caller rather than retried.
    pub fn from_data(data: &HashMap<String, String>) -> SignalResult<Self> {
        let kind = match data.get("type").map(String::as_str) {
            Some("incoming_call") => PushKind::IncomingCall,
            Some("end_call") => PushKind::EndCall,
            Some(other) => {
                return Err(SignalError::MalformedPayload {
                    reason: format!("unknown push type '{other}'"),
                })
            }
            None => {
                return Err(SignalError::MalformedPayload {
                    reason: "missing push type".to_string(),
                })
            }
        };
        let call_id = data
            .get("llamadaId")
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| SignalError::MalformedPayload {
                reason: "missing llamadaId".to_string(),
            })?;
        Ok(Self {
            kind,
            call_id,
            room: data.get("sala").cloned(),
            caller_name: data.get("callerName").cloned(),
        })
    }

    /// Decode a payload delivered as a JSON object
    pub fn from_json(raw: &str) -> SignalResult<Self> {
        let data: HashMap<String, String> =
            serde_json::from_str(raw).map_err(|e| SignalError::MalformedPayload {
                reason: format!("invalid payload json: {e}"),
            })?;
        Self::from_data(&data)
    }
}

/// Convert a ring push into the normalized call signal
///
/// Returns `None` for end-call pushes, which do not ring. The push
/// carries no authoritative record state or timestamp; the signal is
/// emitted as if the record were ringing and the staleness check
/// upstream falls back to the claim-time fetch.
pub fn signal_from_push(payload: &PushPayload, default_room: &str) -> Option<IncomingCallSignal> {
    match payload.kind {
        PushKind::IncomingCall => Some(IncomingCallSignal {
            id: payload.call_id.clone(),
            room: payload
                .room
                .clone()
                .unwrap_or_else(|| default_room.to_string()),
            state: CallRecordState::Ringing,
            created_at: None,
            caller_name: payload.caller_name.clone(),
            source: SignalSource::Push,
        }),
        PushKind::EndCall => {
            debug!(call_id = %payload.call_id, "end-call push");
            None
        }
    }
}

/// Push-registration endpoint seam
///
/// Registers (merge semantics) the device's current push token and
/// room interest server-side. Registration failure only degrades the
/// redundant wake-up path; the database channel still rings.
#[async_trait]
pub trait PushRegistrar: Send + Sync + 'static {
    /// Upsert the receiver registration
    async fn register(&self, registration: &ReceiverRegistration) -> SignalResult<()>;
}
