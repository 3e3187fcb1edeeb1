//! Signaling channel adapter
//!
//! Turns raw document change events into the de-duplicated stream of
//! call signals consumed by the session state machine, and exposes the
//! record mutations the receiver leg performs: claim, accept, reject,
//! expire.
//!
//! Filtering happens here (only new-call states are emitted); dedup by
//! call id happens downstream at the single dedup boundary so that the
//! database and push paths are treated uniformly.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{SignalError, SignalResult};
use crate::record::{CallRecordState, IncomingCallSignal};
use crate::store::{DocChangeKind, SignalStore};

/// How a rejected call record is resolved
///
/// The deployed fleet disagreed on this: some versions delete the
/// record outright, others mark it `rechazada` so the visitor leg can
/// show feedback. Both are supported; deletion is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectMode {
    /// Delete the record; the visitor observes the removal
    #[default]
    Delete,
    /// Update the record to the terminal `Rejected` state
    MarkRejected,
}

/// Receiver-side adapter over the signaling document store
pub struct SignalChannel<S: SignalStore> {
    store: Arc<S>,
}

impl<S: SignalStore> Clone for SignalChannel<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignalStore> SignalChannel<S> {
    /// Wrap a store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Access the underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Open the live call-signal stream for `room`
    ///
    /// Emits a signal for every added or modified record whose state
    /// is still a new-call state. Removed changes and terminal states
    /// are dropped here; duplicate deliveries of the same logical
    /// change are passed through for the dedup boundary to collapse.
    pub async fn subscribe(
        &self,
        room: &str,
    ) -> SignalResult<ReceiverStream<IncomingCallSignal>> {
        let mut changes = self.store.subscribe(room).await?;
        let (tx, rx) = mpsc::channel(32);
        let room = room.to_string();

        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                match change.kind {
                    DocChangeKind::Added | DocChangeKind::Modified => {
                        if !change.record.state.is_new_call() {
                            debug!(
                                call_id = %change.record.id,
                                state = change.record.state.as_str(),
                                "ignoring non-ringing record change"
                            );
                            continue;
                        }
                        let signal = IncomingCallSignal::from_record(&change.record);
                        if tx.send(signal).await.is_err() {
                            break;
                        }
                    }
                    DocChangeKind::Removed => {
                        debug!(call_id = %change.record.id, "record removed upstream");
                    }
                }
            }
            info!(room = %room, "signal subscription ended");
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Take receiver-side ownership of a call record
    ///
    /// Verifies the record still exists and is still ringing. Two
    /// near-simultaneous claims of the same id are serialized by the
    /// session event loop above; this check catches the record having
    /// been resolved or swept in the meantime.
    pub async fn claim(&self, call_id: &str) -> SignalResult<()> {
        match self.store.fetch(call_id).await? {
            Some(record) if record.state.is_new_call() => {
                info!(call_id = %call_id, "call record claimed");
                Ok(())
            }
            Some(record) => {
                warn!(
                    call_id = %call_id,
                    state = record.state.as_str(),
                    "claim refused, record already terminal"
                );
                Err(SignalError::AlreadyResolved {
                    id: call_id.to_string(),
                })
            }
            None => Err(SignalError::AlreadyResolved {
                id: call_id.to_string(),
            }),
        }
    }

    /// Mark the record accepted
    ///
    /// Downstream this triggers the end-call notification to the
    /// visitor leg.
    pub async fn accept(&self, call_id: &str) -> SignalResult<()> {
        self.store
            .update_state(call_id, CallRecordState::Accepted)
            .await?;
        info!(call_id = %call_id, "call record accepted");
        Ok(())
    }

    /// Resolve a rejected call per the configured mode
    ///
    /// A missing record is a success: the sweeper or the visitor leg
    /// got there first.
    pub async fn reject(&self, call_id: &str, mode: RejectMode) -> SignalResult<()> {
        let outcome = match mode {
            RejectMode::Delete => self.store.delete(call_id).await,
            RejectMode::MarkRejected => {
                match self
                    .store
                    .update_state(call_id, CallRecordState::Rejected)
                    .await
                {
                    Err(SignalError::AlreadyResolved { .. }) => Ok(()),
                    other => other,
                }
            }
        };
        if outcome.is_ok() {
            info!(call_id = %call_id, mode = ?mode, "call record rejected");
        }
        outcome
    }

    /// Remove a record that timed out or went stale
    ///
    /// Always deletes regardless of reject mode; an expired record is
    /// of no use to either leg.
    pub async fn expire(&self, call_id: &str) -> SignalResult<()> {
        self.store.delete(call_id).await?;
        debug!(call_id = %call_id, "call record expired");
        Ok(())
    }
}
