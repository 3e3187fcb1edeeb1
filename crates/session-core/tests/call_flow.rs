//! End-to-end call lifecycle scenarios
//!
//! Each test drives the session through the real event loop with the
//! in-memory signal store and scripted transport, clock paused.

mod common;

use common::*;

use entrybell_session_core::dnd::DndGate;
use entrybell_session_core::state::SessionState;
use entrybell_session_core::transport::RoomEvent;
use entrybell_signal_core::{CallRecord, CallRecordState, RejectMode, SignalStore};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

fn push_data(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn answered_call_runs_to_completion() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal").with_caller_name("Visitante"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    assert_eq!(h.feedback.rings(), 1);

    h.handle.accept().await.unwrap();
    wait_until("room joined", || h.transport.room_count() == 1).await;
    assert_eq!(
        h.store.get("c1").unwrap().state,
        CallRecordState::Accepted,
        "accepting writes the record state"
    );

    let room = h.transport.room(0);
    room.emit(RoomEvent::ParticipantConnected {
        identity: "visitor-1".to_string(),
    })
    .await;
    wait_for_state(&mut h.watch, SessionState::Active).await;

    // Mute toggle reaches the live room.
    h.handle.set_muted(true).await.unwrap();
    wait_until("mute applied", || {
        room.muted.load(Ordering::SeqCst)
    })
    .await;

    room.emit(RoomEvent::Disconnected { error: None })
        .await;
    wait_for_state(&mut h.watch, SessionState::Idle).await;

    assert!(h.store.get("c1").is_none(), "finished call record removed");
    assert!(room.disconnected.load(Ordering::SeqCst));
    assert_eq!(h.feedback.fatal_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_call_while_busy_never_rings() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;

    h.store
        .create(CallRecord::new("c2", "sala-principal"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.feedback.rings(), 1, "busy session ignores the second call");
    assert_eq!(h.handle.state(), SessionState::Ringing);
    assert_eq!(h.store.get("c2").unwrap().state, CallRecordState::Ringing);

    h.handle.reject().await.unwrap();
    wait_for_state(&mut h.watch, SessionState::Idle).await;
    assert!(h.store.get("c1").is_none(), "rejected record deleted");
    assert!(h.store.get("c2").is_some(), "unclaimed record untouched");
}

#[tokio::test(start_paused = true)]
async fn duplicate_signals_collapse_to_one_ring() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    // The redundant push for the same call arrives moments later.
    h.handle
        .push_received(&push_data(&[("type", "incoming_call"), ("llamadaId", "c1")]))
        .await
        .unwrap();

    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    settle().await;
    assert_eq!(h.feedback.rings(), 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_ring_times_out_and_cleans_up() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;

    // Nobody answers; the ring timeout auto-rejects.
    wait_for_state(&mut h.watch, SessionState::Idle).await;
    assert!(h.store.get("c1").is_none());
    assert!(h.feedback.ring_stops.load(Ordering::SeqCst) >= 1);
    assert_eq!(h.feedback.fatal_count(), 0);
    assert_eq!(h.transport.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn manual_dnd_suppresses_without_ringing() {
    let mut h = start(test_config()).await;
    h.handle.set_dnd(true).await.unwrap();
    settle().await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_until("suppressed record cleaned", || h.store.get("c1").is_none()).await;

    assert_eq!(h.feedback.rings(), 0);
    assert_eq!(h.handle.state(), SessionState::Idle);
    assert_eq!(h.feedback.suppressed.lock().unwrap().as_slice(), ["c1"]);

    // Lifting the flag lets the next call through.
    h.handle.set_dnd(false).await.unwrap();
    settle().await;
    h.store
        .create(CallRecord::new("c2", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    assert_eq!(h.feedback.rings(), 1);
}

#[tokio::test(start_paused = true)]
async fn quiet_hours_gate_follows_the_clock() {
    let config = test_config().with_dnd(DndGate::overnight());
    let h = start_with_clock(config, FixedClock::night()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_until("suppressed record cleaned", || h.store.get("c1").is_none()).await;
    assert_eq!(h.feedback.rings(), 0);

    let config = test_config().with_dnd(DndGate::overnight());
    let mut day = start_with_clock(config, FixedClock::noon()).await;
    day.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut day.watch, SessionState::Ringing).await;
    assert_eq!(day.feedback.rings(), 1);
}

#[tokio::test(start_paused = true)]
async fn dnd_mark_rejected_mode_leaves_a_terminal_record() {
    let h = start(test_config().with_reject_mode(RejectMode::MarkRejected)).await;
    h.handle.set_dnd(true).await.unwrap();
    settle().await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_until("record marked", || {
        h.store
            .get("c1")
            .map(|r| r.state == CallRecordState::Rejected)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(h.feedback.rings(), 0);
}

#[tokio::test(start_paused = true)]
async fn end_call_push_tears_down_the_claimed_call() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    h.handle.accept().await.unwrap();
    wait_until("room joined", || h.transport.room_count() == 1).await;
    let room = h.transport.room(0);
    room.emit(RoomEvent::ParticipantConnected {
        identity: "visitor-1".to_string(),
    })
    .await;
    wait_for_state(&mut h.watch, SessionState::Active).await;

    h.handle
        .push_received(&push_data(&[("type", "end_call"), ("llamadaId", "c1")]))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Idle).await;
    assert!(room.disconnected.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn end_call_push_for_another_call_is_ignored() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;

    h.handle
        .push_received(&push_data(&[("type", "end_call"), ("llamadaId", "other")]))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.handle.state(), SessionState::Ringing);
}

#[tokio::test(start_paused = true)]
async fn max_duration_ends_the_call() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    h.handle.accept().await.unwrap();
    wait_until("room joined", || h.transport.room_count() == 1).await;
    let room = h.transport.room(0);
    room.emit(RoomEvent::ParticipantConnected {
        identity: "visitor-1".to_string(),
    })
    .await;
    wait_for_state(&mut h.watch, SessionState::Active).await;

    // No hangup from either side; the hard cap fires.
    wait_for_state(&mut h.watch, SessionState::Idle).await;
    assert!(h.store.get("c1").is_none());
    assert!(room.disconnected.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn empty_room_times_out() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    h.handle.accept().await.unwrap();
    wait_until("room joined", || h.transport.room_count() == 1).await;

    // The visitor never joins the media room.
    wait_for_state(&mut h.watch, SessionState::Idle).await;
    assert!(h.store.get("c1").is_none());
    assert!(h.transport.room(0).disconnected.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn hangup_while_connecting_resets_and_releases_the_room() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    h.handle.accept().await.unwrap();
    h.handle.hangup().await.unwrap();

    wait_for_state(&mut h.watch, SessionState::Idle).await;
    // Whether the join completed before or after the hangup, any room
    // it produced must be released.
    wait_until("room released", || {
        h.transport.room_count() == 0
            || h.transport
                .room(0)
                .disconnected
                .load(Ordering::SeqCst)
    })
    .await;
    assert!(h.store.get("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn back_to_back_calls_claim_exactly_one() {
    let mut h = start(test_config()).await;

    // Two visitors ring before the session observes either.
    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    h.store
        .create(CallRecord::new("c2", "sala-principal"))
        .await
        .unwrap();

    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    settle().await;
    assert_eq!(h.feedback.rings(), 1, "exactly one call may claim the session");
    assert_eq!(h.handle.state(), SessionState::Ringing);

    // Resolving the winner touches only its own record.
    h.handle.reject().await.unwrap();
    wait_for_state(&mut h.watch, SessionState::Idle).await;
    assert_eq!(h.store.len(), 1, "the losing record is left untouched");
}

#[tokio::test(start_paused = true)]
async fn resolved_call_id_can_ring_again_at_once() {
    let mut h = start(test_config()).await;

    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    h.handle.reject().await.unwrap();
    wait_for_state(&mut h.watch, SessionState::Idle).await;

    // The visitor rings again immediately with the same record id,
    // well inside the duplicate-suppression window.
    h.store
        .create(CallRecord::new("c1", "sala-principal"))
        .await
        .unwrap();
    wait_for_state(&mut h.watch, SessionState::Ringing).await;
    assert_eq!(h.feedback.rings(), 2);
}
