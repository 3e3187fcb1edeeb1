//! Shared scripted collaborators for the session integration tests
//!
//! The state machine is driven end to end against the in-memory
//! signal store, a scripted credential endpoint and a scripted media
//! transport, with the tokio clock paused so every timeout in the
//! lifecycle is exercised deterministically.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::sync::{mpsc, watch};

use entrybell_session_core::dnd::{DndGate, LocalClock};
use entrybell_session_core::error::{SessionError, SessionResult};
use entrybell_session_core::events::{FeedbackSink, StateChange};
use entrybell_session_core::retry::RetryConfig;
use entrybell_session_core::state::SessionState;
use entrybell_session_core::transport::{
    ConnectOptions, CredentialProvider, MediaTransport, RoomCredential, RoomEvent, RoomHandle,
};
use entrybell_session_core::{SessionConfig, SessionHandle, SessionManager};
use entrybell_signal_core::{MemorySignalStore, SignalChannel};

/// Pinned wall clock for the do-not-disturb gate
pub struct FixedClock(pub NaiveTime);

impl FixedClock {
    pub fn noon() -> Self {
        Self(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
    }

    pub fn night() -> Self {
        Self(NaiveTime::from_hms_opt(3, 0, 0).unwrap())
    }
}

impl LocalClock for FixedClock {
    fn local_time(&self) -> NaiveTime {
        self.0
    }
}

/// Credential endpoint that fails a scripted number of times first
pub struct ScriptedCredentials {
    failures_left: AtomicU32,
    mints: AtomicU32,
}

impl ScriptedCredentials {
    pub fn new() -> Self {
        Self {
            failures_left: AtomicU32::new(0),
            mints: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn mints(&self) -> u32 {
        self.mints.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedCredentials {
    async fn mint(&self, identity: &str, _room: &str) -> SessionResult<RoomCredential> {
        self.mints.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SessionError::Credential {
                reason: "scripted 503".to_string(),
            });
        }
        Ok(RoomCredential {
            token: format!("tok-{identity}"),
        })
    }
}

/// What the next scripted connect attempt does
pub enum ConnectScript {
    /// Connect succeeds and yields a driveable room
    Ok,
    /// Connect fails with a recoverable transport error
    Fail,
    /// Connect never completes (exercises the setup timeout)
    Hang,
}

/// Test-side driver for one scripted room
#[derive(Clone)]
pub struct RoomDriver {
    pub events: mpsc::Sender<RoomEvent>,
    pub muted: Arc<AtomicBool>,
    pub disconnected: Arc<AtomicBool>,
}

impl RoomDriver {
    pub async fn emit(&self, event: RoomEvent) {
        self.events.send(event).await.expect("room pump gone");
    }
}

struct ScriptedRoom {
    events: Option<mpsc::Receiver<RoomEvent>>,
    initial_remote: usize,
    muted: Arc<AtomicBool>,
    disconnected: Arc<AtomicBool>,
}

#[async_trait]
impl RoomHandle for ScriptedRoom {
    fn take_events(&mut self) -> Option<mpsc::Receiver<RoomEvent>> {
        self.events.take()
    }

    fn remote_participants(&self) -> usize {
        self.initial_remote
    }

    async fn set_muted(&self, muted: bool) -> SessionResult<()> {
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> SessionResult<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Media transport whose connect attempts follow a script
///
/// An empty script means every attempt succeeds.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ConnectScript>>,
    connects: AtomicU32,
    initial_remote: AtomicUsize,
    rooms: Mutex<Vec<RoomDriver>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            connects: AtomicU32::new(0),
            initial_remote: AtomicUsize::new(0),
            rooms: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, steps: impl IntoIterator<Item = ConnectScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    /// Remote participants already present when the next room connects
    pub fn set_initial_remote(&self, count: usize) {
        self.initial_remote.store(count, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Driver for the `index`-th successfully connected room
    pub fn room(&self, index: usize) -> RoomDriver {
        self.rooms.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl MediaTransport for ScriptedTransport {
    async fn connect(
        &self,
        _credential: &RoomCredential,
        _options: &ConnectOptions,
    ) -> SessionResult<Box<dyn RoomHandle>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectScript::Ok);
        match step {
            ConnectScript::Fail => Err(SessionError::Transport {
                reason: "scripted ice failure".to_string(),
            }),
            ConnectScript::Hang => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Err(SessionError::Transport {
                    reason: "scripted hang".to_string(),
                })
            }
            ConnectScript::Ok => {
                let (tx, rx) = mpsc::channel(16);
                let muted = Arc::new(AtomicBool::new(false));
                let disconnected = Arc::new(AtomicBool::new(false));
                self.rooms.lock().unwrap().push(RoomDriver {
                    events: tx,
                    muted: Arc::clone(&muted),
                    disconnected: Arc::clone(&disconnected),
                });
                Ok(Box::new(ScriptedRoom {
                    events: Some(rx),
                    initial_remote: self.initial_remote.load(Ordering::SeqCst),
                    muted,
                    disconnected,
                }))
            }
        }
    }
}

/// Feedback sink that records everything it is told
pub struct RecordingFeedback {
    pub transitions: Mutex<Vec<(SessionState, SessionState, String)>>,
    pub rings: AtomicU32,
    pub ring_stops: AtomicU32,
    pub suppressed: Mutex<Vec<String>>,
    pub fatals: Mutex<Vec<String>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self {
            transitions: Mutex::new(Vec::new()),
            rings: AtomicU32::new(0),
            ring_stops: AtomicU32::new(0),
            suppressed: Mutex::new(Vec::new()),
            fatals: Mutex::new(Vec::new()),
        }
    }

    pub fn rings(&self) -> u32 {
        self.rings.load(Ordering::SeqCst)
    }

    pub fn fatal_count(&self) -> usize {
        self.fatals.lock().unwrap().len()
    }
}

#[async_trait]
impl FeedbackSink for RecordingFeedback {
    async fn on_state_changed(&self, change: StateChange) {
        self.transitions
            .lock()
            .unwrap()
            .push((change.previous, change.new_state, change.reason));
    }

    async fn on_ring_started(&self, _call_id: &str, _caller_name: Option<&str>) {
        self.rings.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_ring_stopped(&self) {
        self.ring_stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_muted_suppressed(&self, call_id: &str) {
        self.suppressed.lock().unwrap().push(call_id.to_string());
    }

    async fn on_fatal(&self, reason: &str) {
        self.fatals.lock().unwrap().push(reason.to_string());
    }
}

/// A fully wired session over scripted collaborators
pub struct Harness {
    pub store: Arc<MemorySignalStore>,
    pub handle: SessionHandle,
    pub transport: Arc<ScriptedTransport>,
    pub credentials: Arc<ScriptedCredentials>,
    pub feedback: Arc<RecordingFeedback>,
    pub watch: watch::Receiver<SessionState>,
}

/// Defaults for the scripted runs: do-not-disturb off, short retry
/// delays; the lifecycle timeouts keep their production values and
/// the paused clock jumps across them.
pub fn test_config() -> SessionConfig {
    SessionConfig::new("sala-principal")
        .with_dnd(DndGate::disabled())
        .with_connect_retry(RetryConfig::fixed(3, Duration::from_millis(100)))
        .with_reconnect(3, Duration::from_millis(100))
}

/// Route session logs through the test harness; `RUST_LOG` selects
/// what shows up on failure output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn start(config: SessionConfig) -> Harness {
    start_with_clock(config, FixedClock::noon()).await
}

pub async fn start_with_clock(config: SessionConfig, clock: FixedClock) -> Harness {
    init_tracing();
    let store = Arc::new(MemorySignalStore::new());
    let channel = SignalChannel::new(Arc::clone(&store));
    let transport = ScriptedTransport::new();
    let credentials = Arc::new(ScriptedCredentials::new());
    let feedback = Arc::new(RecordingFeedback::new());

    let handle = SessionManager::new(
        config,
        channel,
        Arc::clone(&credentials) as Arc<dyn CredentialProvider>,
        Arc::clone(&transport) as Arc<dyn MediaTransport>,
    )
    .with_feedback(Arc::clone(&feedback) as Arc<dyn FeedbackSink>)
    .with_clock(Arc::new(clock))
    .spawn()
    .await
    .expect("session manager starts");

    let watch = handle.state_watch();
    Harness {
        store,
        handle,
        transport,
        credentials,
        feedback,
        watch,
    }
}

/// Wait until the session reaches `want`
///
/// The paused clock auto-advances across pending timers while the
/// runtime is otherwise idle, so waits spanning ring/ice/duration
/// timeouts resolve immediately in wall time.
pub async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, want: SessionState) {
    tokio::time::timeout(
        Duration::from_secs(3600),
        rx.wait_for(|state| *state == want),
    )
    .await
    .unwrap_or_else(|_| panic!("session never reached {want:?}"))
    .expect("state watch closed");
}

/// Poll a condition, yielding a little virtual time between checks
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting until {what}");
}

/// Let queued events drain without crossing any lifecycle timeout
pub async fn settle() {
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
