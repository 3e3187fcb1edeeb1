//! Call record data model
//!
//! The call record is the authoritative signaling state shared between
//! the visitor and receiver legs. It lives in the document database;
//! the wire field and state names match the deployed collection
//! (`sala`, `estado`, `timestamp`, `visitante` with Spanish state
//! values), so these types serialize directly against existing
//! documents.
//!
//! A record is created fresh for every ring attempt and never reused.
//! Once the receiver has claimed it, the receiver is the sole writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a call record
///
/// `Pending` and `Ringing` are equivalent "new call" signals - the
/// visitor leg has historically written both. `Accepted` and
/// `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallRecordState {
    /// Freshly created by the visitor, not yet ringing
    #[serde(rename = "pendiente")]
    Pending,
    /// Visitor-side is actively calling
    #[serde(rename = "llamando")]
    Ringing,
    /// The receiver answered; terminal
    #[serde(rename = "aceptada")]
    Accepted,
    /// The receiver declined; terminal
    #[serde(rename = "rechazada")]
    Rejected,
}

impl CallRecordState {
    /// Whether this state should trigger ringing on the receiver
    pub fn is_new_call(&self) -> bool {
        matches!(self, CallRecordState::Pending | CallRecordState::Ringing)
    }

    /// Whether this state is terminal for the record
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallRecordState::Accepted | CallRecordState::Rejected)
    }

    /// Wire name of the state, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            CallRecordState::Pending => "pendiente",
            CallRecordState::Ringing => "llamando",
            CallRecordState::Accepted => "aceptada",
            CallRecordState::Rejected => "rechazada",
        }
    }
}

/// One ring attempt, as stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Store-assigned opaque document id
    #[serde(default)]
    pub id: String,
    /// Target media room
    #[serde(rename = "sala")]
    pub room: String,
    /// Current lifecycle state
    #[serde(rename = "estado")]
    pub state: CallRecordState,
    /// Server-assigned creation timestamp, used for staleness checks
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Display name of the visitor placing the call, if provided
    #[serde(rename = "visitante", default, skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
}

impl CallRecord {
    /// Create a new-call record for `room`, timestamped now
    pub fn new(id: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            room: room.into(),
            state: CallRecordState::Ringing,
            created_at: Utc::now(),
            caller_name: None,
        }
    }

    /// Attach the visitor display name
    pub fn with_caller_name(mut self, name: impl Into<String>) -> Self {
        self.caller_name = Some(name.into());
        self
    }

    /// Age of the record relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Which redundant delivery path produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// Live-query change from the document database
    Database,
    /// Push notification wake-up
    Push,
}

/// Normalized incoming-call signal consumed by the session state machine
///
/// Both the database live query and the push channel are reduced to
/// this one shape before they reach the dedup boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCallSignal {
    /// Call record id
    pub id: String,
    /// Target media room
    pub room: String,
    /// Record state at the time the signal was observed
    pub state: CallRecordState,
    /// Record creation time; `None` when the push payload carried no
    /// timestamp (push is a wake-up hint, not authoritative state)
    pub created_at: Option<DateTime<Utc>>,
    /// Visitor display name, if known
    pub caller_name: Option<String>,
    /// Delivery path that produced this signal
    pub source: SignalSource,
}

impl IncomingCallSignal {
    /// Build a signal from a database change
    pub fn from_record(record: &CallRecord) -> Self {
        Self {
            id: record.id.clone(),
            room: record.room.clone(),
            state: record.state,
            created_at: Some(record.created_at),
            caller_name: record.caller_name.clone(),
            source: SignalSource::Database,
        }
    }
}

/// Registration of the receiver device with the push service
///
/// Upsert semantics: re-registering merges the room set and replaces
/// the token. Read by the visitor leg to find where to deliver the
/// ring notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverRegistration {
    /// Well-known receiver identity
    #[serde(rename = "receptor")]
    pub receiver_id: String,
    /// Current push token of the device
    #[serde(rename = "fcmToken")]
    pub push_token: String,
    /// Rooms the receiver is interested in
    #[serde(rename = "salas")]
    pub rooms: Vec<String>,
    /// Last registration time
    #[serde(rename = "actualizado")]
    pub updated_at: DateTime<Utc>,
}

impl ReceiverRegistration {
    /// Build a registration for a single room, timestamped now
    pub fn new(
        receiver_id: impl Into<String>,
        push_token: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            push_token: push_token.into(),
            rooms: vec![room.into()],
            updated_at: Utc::now(),
        }
    }

    /// Merge another registration into this one (upsert semantics)
    pub fn merge(&mut self, other: &ReceiverRegistration) {
        self.push_token = other.push_token.clone();
        self.updated_at = other.updated_at;
        for room in &other.rooms {
            if !self.rooms.contains(room) {
                self.rooms.push(room.clone());
            }
        }
    }
}
