//! # entrybell-signal-core
//!
//! Signaling channel adapter for the entrybell doorbell runtime.
//!
//! A doorbell call is signaled through a shared document collection:
//! the visitor leg creates a call record, the receiver leg observes it
//! through a live query (with push notifications as a redundant
//! wake-up), claims it, and resolves it. This crate owns that channel:
//!
//! - [`record`] - the call record data model and wire format
//! - [`store`] - the document-database seam and an in-memory backend
//! - [`channel`] - live subscription plus claim/accept/reject/expire
//! - [`push`] - push payload decoding and registration seam
//! - [`dedup`] - the single de-duplication boundary for both paths
//! - [`sweep`] - periodic deletion of orphaned records
//!
//! The session state machine that consumes these signals lives in
//! `entrybell-session-core`.

pub mod channel;
pub mod dedup;
pub mod error;
pub mod push;
pub mod record;
pub mod store;
pub mod sweep;

pub use channel::{RejectMode, SignalChannel};
pub use dedup::{SignalDeduper, DEFAULT_DEDUP_WINDOW};
pub use error::{SignalError, SignalResult};
pub use push::{signal_from_push, PushKind, PushPayload, PushRegistrar};
pub use record::{
    CallRecord, CallRecordState, IncomingCallSignal, ReceiverRegistration, SignalSource,
};
pub use store::{DocChange, DocChangeKind, MemorySignalStore, SignalStore};
pub use sweep::{StaleSweeper, SweepConfig};
