//! Document store seam
//!
//! [`SignalStore`] is the contract the real document database (point
//! create/update/delete, a `created_at` range delete, and a filtered
//! live-query subscription) is adapted behind. The production binding
//! lives with the embedder; [`MemorySignalStore`] is the in-process
//! reference implementation used by tests and demos.
//!
//! Delivery semantics the rest of the stack is built around: changes
//! are at-least-once (the same logical change may be observed more
//! than once) and there is no ordering guarantee across documents.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{SignalError, SignalResult};
use crate::record::{CallRecord, CallRecordState};

/// Kind of a live-query change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocChangeKind {
    /// Document appeared in the query results
    Added,
    /// Document changed while matching the query
    Modified,
    /// Document left the query results (deleted)
    Removed,
}

/// One live-query change event
#[derive(Debug, Clone)]
pub struct DocChange {
    /// What happened to the document
    pub kind: DocChangeKind,
    /// Snapshot of the record at the time of the change. For
    /// `Removed` this is the last known state.
    pub record: CallRecord,
}

/// Contract of the document database used as the signaling channel
#[async_trait]
pub trait SignalStore: Send + Sync + 'static {
    /// Create a call record, returning its assigned id
    async fn create(&self, record: CallRecord) -> SignalResult<String>;

    /// Point-update the state field of a record
    ///
    /// Returns [`SignalError::AlreadyResolved`] when the record no
    /// longer exists.
    async fn update_state(&self, id: &str, state: CallRecordState) -> SignalResult<()>;

    /// Point-delete a record
    ///
    /// Deleting a missing record is a success: concurrent cleanup
    /// (sweep vs. explicit reject) makes this a normal outcome.
    async fn delete(&self, id: &str) -> SignalResult<()>;

    /// Fetch a record by id, `None` when it does not exist
    async fn fetch(&self, id: &str) -> SignalResult<Option<CallRecord>>;

    /// Delete every record created before `cutoff`, returning how many
    /// were removed
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> SignalResult<usize>;

    /// Open a live query for records in `room`
    ///
    /// The receiver yields a change event for every add/modify/remove
    /// affecting the room, starting with `Added` events for records
    /// already present.
    async fn subscribe(&self, room: &str) -> SignalResult<mpsc::Receiver<DocChange>>;
}

const SUBSCRIPTION_BUFFER: usize = 64;

/// In-memory [`SignalStore`] backed by a concurrent map
///
/// Mirrors the observable behavior of the real backend closely enough
/// for the state machine to be exercised against it: subscriptions see
/// pre-existing documents as `Added`, and every mutation is fanned out
/// to all live subscriptions for the matching room.
#[derive(Clone)]
pub struct MemorySignalStore {
    records: Arc<DashMap<String, CallRecord>>,
    subscribers: Arc<Mutex<Vec<(String, mpsc::Sender<DocChange>)>>>,
    next_id: Arc<AtomicU64>,
}

impl MemorySignalStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of records currently stored
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of a record, for test assertions
    pub fn get(&self, id: &str) -> Option<CallRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    async fn broadcast(&self, change: DocChange) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|(room, tx)| {
            if *room != change.record.room {
                return !tx.is_closed();
            }
            // Dropped receivers are pruned; a full buffer drops the
            // event, matching the lossy nature of the real channel.
            match tx.try_send(change.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(id = %change.record.id, "subscription buffer full, change dropped");
                    true
                }
            }
        });
    }
}

impl Default for MemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn create(&self, mut record: CallRecord) -> SignalResult<String> {
        if record.id.is_empty() {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            record.id = format!("call-{n}");
        }
        let id = record.id.clone();
        self.records.insert(id.clone(), record.clone());
        self.broadcast(DocChange {
            kind: DocChangeKind::Added,
            record,
        })
        .await;
        Ok(id)
    }

    async fn update_state(&self, id: &str, state: CallRecordState) -> SignalResult<()> {
        let record = match self.records.get_mut(id) {
            Some(mut entry) => {
                entry.state = state;
                entry.clone()
            }
            None => {
                return Err(SignalError::AlreadyResolved { id: id.to_string() });
            }
        };
        self.broadcast(DocChange {
            kind: DocChangeKind::Modified,
            record,
        })
        .await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> SignalResult<()> {
        if let Some((_, record)) = self.records.remove(id) {
            self.broadcast(DocChange {
                kind: DocChangeKind::Removed,
                record,
            })
            .await;
        }
        Ok(())
    }

    async fn fetch(&self, id: &str) -> SignalResult<Option<CallRecord>> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> SignalResult<usize> {
        let stale: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.created_at < cutoff)
            .map(|entry| entry.id.clone())
            .collect();
        for id in &stale {
            self.delete(id).await?;
        }
        Ok(stale.len())
    }

    async fn subscribe(&self, room: &str) -> SignalResult<mpsc::Receiver<DocChange>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        // Replay existing documents as Added, like the real backend's
        // initial snapshot.
        for entry in self.records.iter() {
            if entry.room == room {
                let _ = tx
                    .send(DocChange {
                        kind: DocChangeKind::Added,
                        record: entry.clone(),
                    })
                    .await;
            }
        }
        self.subscribers
            .lock()
            .await
            .push((room.to_string(), tx));
        Ok(rx)
    }
}
