//! Integration tests for the signaling channel: a call record's full
//! lifecycle as observed through the live subscription, the dedup
//! boundary, and the sweeper, all against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::time::timeout;

use entrybell_signal_core::{
    CallRecord, CallRecordState, RejectMode, SignalChannel, SignalDeduper, SignalSource,
    MemorySignalStore, SignalStore, StaleSweeper, SweepConfig,
};

const ROOM: &str = "sala-principal";

fn setup() -> (SignalChannel<MemorySignalStore>, Arc<MemorySignalStore>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(MemorySignalStore::new());
    (SignalChannel::new(Arc::clone(&store)), store)
}

#[tokio::test]
async fn record_lifecycle_create_claim_accept() {
    let (channel, store) = setup();
    let mut signals = channel.subscribe(ROOM).await.unwrap();

    let id = store
        .create(CallRecord::new("", ROOM).with_caller_name("Visitante"))
        .await
        .unwrap();

    let signal = timeout(Duration::from_secs(1), signals.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signal.id, id);
    assert_eq!(signal.source, SignalSource::Database);
    assert_eq!(signal.caller_name.as_deref(), Some("Visitante"));

    channel.claim(&id).await.unwrap();
    channel.accept(&id).await.unwrap();
    assert_eq!(store.get(&id).unwrap().state, CallRecordState::Accepted);

    // End of call deletes the record; a second delete (concurrent
    // sweep) is still fine.
    channel.expire(&id).await.unwrap();
    channel.expire(&id).await.unwrap();
    assert!(store.get(&id).is_none());
}

#[tokio::test]
async fn modified_record_rings_again_only_in_new_call_states() {
    let (channel, store) = setup();
    let mut signals = channel.subscribe(ROOM).await.unwrap();

    store.create(CallRecord::new("c1", ROOM)).await.unwrap();
    let first = timeout(Duration::from_secs(1), signals.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, "c1");

    // Accepting mutates the record but must not produce a ring signal.
    store
        .update_state("c1", CallRecordState::Accepted)
        .await
        .unwrap();
    store.create(CallRecord::new("c2", ROOM)).await.unwrap();

    let next = timeout(Duration::from_secs(1), signals.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, "c2", "accepted record change must be filtered");
}

#[tokio::test]
async fn dedup_collapses_database_and_push_duplicates() {
    let mut dedup = SignalDeduper::new(Duration::from_secs(5));
    // Same call id arriving via the database and then via push.
    assert!(dedup.admit("c1"));
    assert!(!dedup.admit("c1"));
    // A fresh call is unaffected.
    assert!(dedup.admit("c2"));
}

#[tokio::test]
async fn sweeper_clears_orphans_while_subscription_is_live() {
    let (channel, store) = setup();
    let mut signals = channel.subscribe(ROOM).await.unwrap();

    let mut orphan = CallRecord::new("orphan", ROOM);
    orphan.created_at = Utc::now() - chrono::Duration::minutes(20);
    store.create(orphan).await.unwrap();

    // The orphan still produces a signal (it is in a new-call state)..
    let signal = timeout(Duration::from_secs(1), signals.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signal.id, "orphan");

    // ..but the sweeper removes it regardless of what any session does.
    let sweeper = StaleSweeper::new(Arc::clone(&store), SweepConfig::default());
    assert_eq!(sweeper.sweep_once().await, 1);
    assert!(store.get("orphan").is_none());

    // Rejecting the already-swept record is a non-event.
    channel.reject("orphan", RejectMode::Delete).await.unwrap();
}
