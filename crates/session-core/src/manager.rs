//! The session manager and its event loop
//!
//! One manager owns the one [`CallSession`] a receiver process runs.
//! Every stimulus - database signal, push wake-up, user action, timer
//! fire, transport event, async task completion - is funneled into a
//! single mpsc queue and handled serially by one loop task, so each
//! transition is atomic with respect to all the others.
//!
//! Suspension points (credential fetch, room join, record writes for
//! the claimed call) never block the loop: they run on spawned tasks
//! whose completions come back as events carrying the session epoch.
//! The epoch bumps on every return to Idle, so anything that outlives
//! its call is recognized as stale and disposed of instead of acting
//! on the next call's state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use entrybell_signal_core::{
    signal_from_push, IncomingCallSignal, PushKind, PushPayload, SignalChannel, SignalDeduper,
    SignalStore,
};

use crate::config::SessionConfig;
use crate::dnd::{LocalClock, SystemLocalClock};
use crate::error::{SessionError, SessionResult};
use crate::events::{FeedbackSink, NullFeedback, SessionEvent, StateChange};
use crate::retry::retry_with_cap;
use crate::state::{CallSession, SessionState};
use crate::timers::{TimerKind, TimerRegistry};
use crate::transport::{ConnectOptions, CredentialProvider, MediaTransport, RoomEvent, RoomHandle};

const EVENT_QUEUE_DEPTH: usize = 64;

/// How the claimed call record is resolved when a call finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordResolution {
    /// Delete the record (finished, timed out, stale)
    Expire,
    /// Resolve per the configured reject mode (user declined)
    Reject,
    /// Leave the record alone (already resolved elsewhere)
    Leave,
}

/// Builder/owner of the session event loop
///
/// Construct with the adapters, then [`SessionManager::spawn`] to get
/// a [`SessionHandle`] for user actions and push ingestion.
pub struct SessionManager<S: SignalStore> {
    config: SessionConfig,
    channel: SignalChannel<S>,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn MediaTransport>,
    feedback: Arc<dyn FeedbackSink>,
    clock: Arc<dyn LocalClock>,
}

impl<S: SignalStore> SessionManager<S> {
    /// Create a manager over the given adapters
    pub fn new(
        config: SessionConfig,
        channel: SignalChannel<S>,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn MediaTransport>,
    ) -> Self {
        Self {
            config,
            channel,
            credentials,
            transport,
            feedback: Arc::new(NullFeedback),
            clock: Arc::new(SystemLocalClock),
        }
    }

    /// Attach a presentation/feedback sink
    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Replace the wall clock used by the do-not-disturb gate
    pub fn with_clock(mut self, clock: Arc<dyn LocalClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration, open the signal subscription and
    /// start the event loop
    pub async fn spawn(self) -> SessionResult<SessionHandle> {
        self.config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let mut signals = self.channel.subscribe(&self.config.room).await?;
        let ingest_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                if ingest_tx.send(SessionEvent::Signal(signal)).await.is_err() {
                    break;
                }
            }
            debug!("signal ingest task ended");
        });

        let default_room = self.config.room.clone();
        let dedup = SignalDeduper::new(self.config.dedup_window);
        let session_loop = SessionLoop {
            timers: TimerRegistry::new(event_tx.clone()),
            session: CallSession::new(),
            dedup,
            room: None,
            room_pump: None,
            room_generation: 0,
            muted: false,
            event_tx: event_tx.clone(),
            state_tx,
            config: self.config,
            channel: self.channel,
            credentials: self.credentials,
            transport: self.transport,
            feedback: self.feedback,
            clock: self.clock,
        };
        tokio::spawn(session_loop.run(event_rx));

        Ok(SessionHandle {
            event_tx,
            state_rx,
            default_room,
        })
    }
}

/// Clonable handle to a running session
///
/// User actions and push-notification ingestion go through here; the
/// session state is observable through a `watch` channel.
#[derive(Clone)]
pub struct SessionHandle {
    event_tx: mpsc::Sender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
    default_room: String,
}

impl SessionHandle {
    /// Accept the ringing call
    pub async fn accept(&self) -> SessionResult<()> {
        self.send(SessionEvent::Accept).await
    }

    /// Reject the ringing call
    pub async fn reject(&self) -> SessionResult<()> {
        self.send(SessionEvent::Reject).await
    }

    /// Hang up the current call
    pub async fn hangup(&self) -> SessionResult<()> {
        self.send(SessionEvent::Hangup).await
    }

    /// Toggle the manual do-not-disturb flag
    pub async fn set_dnd(&self, enabled: bool) -> SessionResult<()> {
        self.send(SessionEvent::SetDnd(enabled)).await
    }

    /// Mute or unmute the local audio track
    pub async fn set_muted(&self, muted: bool) -> SessionResult<()> {
        self.send(SessionEvent::SetMuted(muted)).await
    }

    /// Feed a received push-notification data payload into the session
    ///
    /// Ring pushes become call signals on the same dedup boundary as
    /// the database stream; end-call pushes tear down the claimed call.
    pub async fn push_received(&self, data: &HashMap<String, String>) -> SessionResult<()> {
        let payload = PushPayload::from_data(data)?;
        match payload.kind {
            PushKind::IncomingCall => {
                if let Some(signal) = signal_from_push(&payload, &self.default_room) {
                    self.send(SessionEvent::Signal(signal)).await?;
                }
            }
            PushKind::EndCall => {
                self.send(SessionEvent::EndCallPush {
                    call_id: payload.call_id,
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Stop the event loop, cleaning up any live call first
    pub async fn shutdown(&self) -> SessionResult<()> {
        self.send(SessionEvent::Shutdown).await
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch channel of session state transitions
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    async fn send(&self, event: SessionEvent) -> SessionResult<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

struct SessionLoop<S: SignalStore> {
    config: SessionConfig,
    channel: SignalChannel<S>,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn MediaTransport>,
    feedback: Arc<dyn FeedbackSink>,
    clock: Arc<dyn LocalClock>,
    session: CallSession,
    timers: TimerRegistry,
    dedup: SignalDeduper,
    room: Option<Box<dyn RoomHandle>>,
    room_pump: Option<tokio::task::JoinHandle<()>>,
    room_generation: u64,
    muted: bool,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
}

impl<S: SignalStore> SessionLoop<S> {
    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        info!(room = %self.config.room, "session manager running");
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                if self.session.state.is_busy() {
                    self.finish_call(RecordResolution::Expire, "shutdown").await;
                }
                break;
            }
            self.handle_event(event).await;
        }
        self.timers.cancel_all();
        if let Some(pump) = self.room_pump.take() {
            pump.abort();
        }
        if let Some(room) = self.room.take() {
            let _ = room.disconnect().await;
        }
        info!("session manager stopped");
    }

    /// The transition function: one event in, one atomic state update
    /// plus side effects out
    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Signal(signal) => self.on_signal(signal).await,
            SessionEvent::Accept => self.on_accept().await,
            SessionEvent::Reject => self.on_reject().await,
            SessionEvent::Hangup => self.on_hangup().await,
            SessionEvent::SetDnd(enabled) => {
                info!(enabled = enabled, "manual do-not-disturb toggled");
                self.config.dnd.manual = enabled;
            }
            SessionEvent::SetMuted(muted) => self.on_set_muted(muted).await,
            SessionEvent::Timer { kind, epoch } => self.on_timer(kind, epoch).await,
            SessionEvent::JoinOutcome { epoch, result } => {
                self.on_join_outcome(epoch, result).await
            }
            SessionEvent::ReconnectOutcome { epoch, result } => {
                self.on_reconnect_outcome(epoch, result).await
            }
            SessionEvent::Room { generation, event } => {
                self.on_room_event(generation, event).await
            }
            SessionEvent::EndCallPush { call_id } => self.on_end_call_push(call_id).await,
            SessionEvent::Shutdown => unreachable!("handled by run()"),
        }
    }

    // ===== incoming signals =====

    async fn on_signal(&mut self, signal: IncomingCallSignal) {
        // Dedup before anything else: two near-simultaneous signals
        // for the same id must not double-claim.
        if !self.dedup.admit(&signal.id) {
            return;
        }
        if self.session.state.is_busy() {
            info!(
                call_id = %signal.id,
                state = self.session.state.as_str(),
                "signal dropped, session busy"
            );
            return;
        }
        if signal.room != self.config.room {
            debug!(call_id = %signal.id, room = %signal.room, "signal for another room ignored");
            return;
        }

        if let Some(created_at) = signal.created_at {
            let max_age = chrono::Duration::from_std(self.config.stale_signal_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(5));
            if Utc::now() - created_at > max_age {
                info!(call_id = %signal.id, "stale signal, expiring record");
                if let Err(e) = self.channel.expire(&signal.id).await {
                    warn!(call_id = %signal.id, error = %e, "expire of stale record failed");
                }
                return;
            }
        }

        // Evaluated per-signal: the quiet window is wall-clock
        // dependent and must not be cached.
        if self.config.dnd.is_active(self.clock.local_time()) {
            info!(call_id = %signal.id, "do-not-disturb active, call suppressed");
            if let Err(e) = self
                .channel
                .reject(&signal.id, self.config.reject_mode)
                .await
            {
                warn!(call_id = %signal.id, error = %e, "suppressed-call cleanup failed");
            }
            self.feedback.on_muted_suppressed(&signal.id).await;
            return;
        }

        match self.channel.claim(&signal.id).await {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                warn!(call_id = %signal.id, error = %e, "claim failed, signal dropped");
                return;
            }
            Err(e) => {
                info!(call_id = %signal.id, error = %e, "record already resolved, not ringing");
                return;
            }
        }

        self.session.claimed_call_id = Some(signal.id.clone());
        self.session.caller_name = signal.caller_name.clone();
        self.session.ringing_since = Some(Utc::now());
        self.set_state(SessionState::Ringing, "incoming call").await;
        self.feedback
            .on_ring_started(&signal.id, signal.caller_name.as_deref())
            .await;
        self.timers
            .arm(TimerKind::Ring, self.config.ring_timeout, self.session.epoch);
    }

    // ===== user actions =====

    async fn on_accept(&mut self) {
        if self.session.state != SessionState::Ringing {
            debug!(state = self.session.state.as_str(), "accept ignored, not ringing");
            return;
        }
        let call_id = match self.session.claimed_call_id.clone() {
            Some(id) => id,
            None => return,
        };
        self.timers.cancel(TimerKind::Ring);
        self.feedback.on_ring_stopped().await;
        self.set_state(SessionState::Connecting, "user accepted").await;
        self.timers
            .arm(TimerKind::Ice, self.config.ice_timeout, self.session.epoch);
        self.spawn_join(call_id);
    }

    async fn on_reject(&mut self) {
        if self.session.state != SessionState::Ringing {
            debug!(state = self.session.state.as_str(), "reject ignored, not ringing");
            return;
        }
        self.finish_call(RecordResolution::Reject, "user rejected").await;
    }

    async fn on_hangup(&mut self) {
        match self.session.state {
            SessionState::Ringing => {
                self.finish_call(RecordResolution::Reject, "user rejected").await;
            }
            SessionState::Connecting | SessionState::Active | SessionState::Reconnecting => {
                self.finish_call(RecordResolution::Expire, "user hung up").await;
            }
            _ => {
                debug!(state = self.session.state.as_str(), "hangup ignored");
            }
        }
    }

    async fn on_set_muted(&mut self, muted: bool) {
        self.muted = muted;
        info!(muted = muted, "local audio mute toggled");
        if let Some(room) = &self.room {
            if let Err(e) = room.set_muted(muted).await {
                warn!(error = %e, "mute toggle failed on room");
            }
        }
    }

    // ===== timers =====

    async fn on_timer(&mut self, kind: TimerKind, epoch: u64) {
        if epoch != self.session.epoch {
            debug!(timer = kind.as_str(), "stale timer fire ignored");
            return;
        }
        match kind {
            TimerKind::Ring => {
                if self.session.state == SessionState::Ringing {
                    info!("ring timeout, auto-rejecting");
                    self.finish_call(RecordResolution::Expire, "ring timeout").await;
                }
            }
            TimerKind::Ice => {
                if self.session.state == SessionState::Connecting {
                    error!("call setup timed out");
                    self.feedback.on_fatal("call setup timed out").await;
                    self.finish_call(RecordResolution::Expire, "connect timeout").await;
                }
            }
            TimerKind::EmptyRoom => {
                if self.session.state == SessionState::Connecting {
                    info!("no participant joined the room, giving up");
                    self.finish_call(RecordResolution::Expire, "empty room timeout").await;
                }
            }
            TimerKind::MaxDuration => {
                if self.session.state.has_media() {
                    info!("maximum call duration reached");
                    self.finish_call(RecordResolution::Expire, "max call duration").await;
                }
            }
            TimerKind::DisconnectGrace => {
                if self.session.state == SessionState::Active
                    && self.session.remote_participants == 0
                {
                    info!("remote participant did not return, hanging up");
                    self.finish_call(RecordResolution::Expire, "remote hung up").await;
                }
            }
        }
    }

    // ===== join / reconnect task outcomes =====

    fn spawn_join(&self, call_id: String) {
        let epoch = self.session.epoch;
        let channel = self.channel.clone();
        let credentials = Arc::clone(&self.credentials);
        let transport = Arc::clone(&self.transport);
        let retry = self.config.connect_retry.clone();
        let options = ConnectOptions {
            room: self.config.room.clone(),
            audio: self.config.audio.clone(),
        };
        let identity = format!("{}-{}", self.config.identity_prefix, Uuid::new_v4());
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let result = retry_with_cap("join", &retry, || {
                let channel = channel.clone();
                let credentials = Arc::clone(&credentials);
                let transport = Arc::clone(&transport);
                let call_id = call_id.clone();
                let identity = identity.clone();
                let options = options.clone();
                async move {
                    // Accepting twice is harmless; an already-resolved
                    // record fails fast and ends the session quietly.
                    channel.accept(&call_id).await.map_err(SessionError::from)?;
                    let credential = credentials.mint(&identity, &options.room).await?;
                    transport.connect(&credential, &options).await
                }
            })
            .await;
            let _ = event_tx.send(SessionEvent::JoinOutcome { epoch, result }).await;
        });
    }

    async fn on_join_outcome(
        &mut self,
        epoch: u64,
        result: Result<Box<dyn RoomHandle>, SessionError>,
    ) {
        if epoch != self.session.epoch || self.session.state != SessionState::Connecting {
            debug!("stale join outcome discarded");
            dispose_room(result);
            return;
        }
        match result {
            Ok(room) => {
                self.timers.cancel(TimerKind::Ice);
                self.install_room(room).await;
                if self.session.remote_participants > 0 {
                    self.go_active("participant already in room").await;
                } else {
                    self.timers.arm(
                        TimerKind::EmptyRoom,
                        self.config.empty_room_timeout,
                        self.session.epoch,
                    );
                }
            }
            Err(e) if e.is_already_resolved() => {
                info!(error = %e, "call resolved elsewhere while joining");
                self.finish_call(RecordResolution::Leave, "call resolved during join").await;
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "joining the media room failed");
                self.feedback
                    .on_fatal(&format!("could not join the call: {e}"))
                    .await;
                self.finish_call(RecordResolution::Expire, "join failed").await;
            }
        }
    }

    fn spawn_reconnect(&self) {
        let epoch = self.session.epoch;
        let attempt = self.session.reconnect_attempts;
        let delay = self.config.reconnect_delay;
        let credentials = Arc::clone(&self.credentials);
        let transport = Arc::clone(&self.transport);
        let options = ConnectOptions {
            room: self.config.room.clone(),
            audio: self.config.audio.clone(),
        };
        let identity = format!("{}-{}", self.config.identity_prefix, Uuid::new_v4());
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(attempt = attempt, "reconnect attempt starting");
            let result = async {
                let credential = credentials.mint(&identity, &options.room).await?;
                transport.connect(&credential, &options).await
            }
            .await;
            let _ = event_tx
                .send(SessionEvent::ReconnectOutcome { epoch, result })
                .await;
        });
    }

    async fn on_reconnect_outcome(
        &mut self,
        epoch: u64,
        result: Result<Box<dyn RoomHandle>, SessionError>,
    ) {
        if epoch != self.session.epoch || self.session.state != SessionState::Reconnecting {
            debug!("stale reconnect outcome discarded");
            dispose_room(result);
            return;
        }
        match result {
            Ok(room) => {
                info!("reconnected to media room");
                self.install_room(room).await;
                self.go_active("reconnected").await;
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "reconnect attempt failed");
                self.begin_reconnect("reconnect attempt failed").await;
            }
        }
    }

    // ===== transport events =====

    async fn on_room_event(&mut self, generation: u64, event: RoomEvent) {
        // Events queued by a pump that was since replaced or torn down
        // must not act on the successor room's state.
        if self.room.is_none() || generation != self.room_generation {
            debug!(?event, "event from a previous room ignored");
            return;
        }
        match event {
            RoomEvent::ParticipantConnected { identity } => {
                if !self.session.state.is_busy() {
                    return;
                }
                self.session.remote_participants += 1;
                info!(
                    participant = %identity,
                    remote = self.session.remote_participants,
                    "remote participant connected"
                );
                self.timers.cancel(TimerKind::DisconnectGrace);
                if self.session.state == SessionState::Connecting {
                    self.go_active("participant joined").await;
                }
            }
            RoomEvent::TrackSubscribed { identity } => {
                debug!(participant = %identity, "remote track subscribed");
                self.timers.cancel(TimerKind::DisconnectGrace);
                if self.session.state == SessionState::Connecting {
                    self.go_active("track subscribed").await;
                }
            }
            RoomEvent::ParticipantDisconnected { identity } => {
                if self.session.remote_participants > 0 {
                    self.session.remote_participants -= 1;
                }
                info!(
                    participant = %identity,
                    remote = self.session.remote_participants,
                    "remote participant disconnected"
                );
                if self.session.state == SessionState::Active
                    && self.session.remote_participants == 0
                {
                    // Short grace so a blip does not end the call; if
                    // nobody returns the session hangs up on its own.
                    self.timers.arm(
                        TimerKind::DisconnectGrace,
                        self.config.disconnect_grace,
                        self.session.epoch,
                    );
                }
            }
            RoomEvent::Reconnecting => {
                if self.session.state == SessionState::Active {
                    self.set_state(SessionState::Reconnecting, "transport reconnecting")
                        .await;
                }
            }
            RoomEvent::Reconnected => {
                if self.session.state == SessionState::Reconnecting {
                    self.session.reconnect_attempts = 0;
                    self.set_state(SessionState::Active, "transport reconnected")
                        .await;
                }
            }
            RoomEvent::Disconnected { error } => {
                if !self.session.state.has_media()
                    && self.session.state != SessionState::Connecting
                {
                    debug!("disconnect event outside a call ignored");
                    return;
                }
                match error {
                    None => {
                        info!("media room disconnected");
                        self.finish_call(RecordResolution::Expire, "call ended").await;
                    }
                    Some(reason) => {
                        warn!(reason = %reason, "media room dropped");
                        self.begin_reconnect("transport dropped").await;
                    }
                }
            }
            RoomEvent::NetworkQuality { level } => {
                if level <= 1 {
                    warn!(level = level, "network quality degraded");
                } else {
                    debug!(level = level, "network quality changed");
                }
            }
        }
    }

    async fn on_end_call_push(&mut self, call_id: String) {
        if self.session.state.is_busy() && self.session.owns(&call_id) {
            info!(call_id = %call_id, "call resolved by the caller side");
            self.finish_call(RecordResolution::Leave, "ended by caller").await;
        } else {
            debug!(call_id = %call_id, "end-call push for unclaimed call ignored");
        }
    }

    // ===== transitions =====

    async fn install_room(&mut self, mut room: Box<dyn RoomHandle>) {
        self.room_generation += 1;
        if let Some(mut room_events) = room.take_events() {
            let generation = self.room_generation;
            let event_tx = self.event_tx.clone();
            let pump = tokio::spawn(async move {
                while let Some(event) = room_events.recv().await {
                    if event_tx
                        .send(SessionEvent::Room { generation, event })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
            if let Some(old) = self.room_pump.replace(pump) {
                old.abort();
            }
        }
        if self.muted {
            // Reapply the mute across rejoins so the user's toggle
            // survives a reconnect.
            if let Err(e) = room.set_muted(true).await {
                warn!(error = %e, "could not reapply mute on new room");
            }
        }
        self.session.remote_participants = room.remote_participants();
        self.room = Some(room);
    }

    async fn go_active(&mut self, reason: &str) {
        self.timers.cancel(TimerKind::Ice);
        self.timers.cancel(TimerKind::EmptyRoom);
        self.timers.cancel(TimerKind::DisconnectGrace);
        if !self.timers.is_armed(TimerKind::MaxDuration) {
            // Armed once per call: the duration cap spans reconnects,
            // independent of transport health.
            self.timers.arm(
                TimerKind::MaxDuration,
                self.config.max_call_duration,
                self.session.epoch,
            );
        }
        if self.session.connected_at.is_none() {
            self.session.connected_at = Some(Utc::now());
        }
        self.session.reconnect_attempts = 0;
        self.set_state(SessionState::Active, reason).await;
    }

    async fn begin_reconnect(&mut self, reason: &str) {
        if let Some(pump) = self.room_pump.take() {
            pump.abort();
        }
        if let Some(room) = self.room.take() {
            tokio::spawn(async move {
                let _ = room.disconnect().await;
            });
        }
        if self.session.reconnect_attempts >= self.config.reconnect_max_attempts {
            error!(
                attempts = self.session.reconnect_attempts,
                "reconnect attempts exhausted, resetting session"
            );
            self.feedback.on_fatal("reconnect attempts exhausted").await;
            self.finish_call(RecordResolution::Expire, "reconnect exhausted").await;
            return;
        }
        self.session.reconnect_attempts += 1;
        if self.session.state != SessionState::Reconnecting {
            self.set_state(SessionState::Reconnecting, reason).await;
        }
        self.spawn_reconnect();
    }

    /// Best-effort cleanup and unconditional return to Idle
    async fn finish_call(&mut self, resolution: RecordResolution, reason: &str) {
        let was_ringing = self.session.state == SessionState::Ringing;
        self.set_state(SessionState::Terminating, reason).await;
        self.timers.cancel_all();
        if was_ringing {
            self.feedback.on_ring_stopped().await;
        }
        if let Some(pump) = self.room_pump.take() {
            pump.abort();
        }
        if let Some(room) = self.room.take() {
            if let Err(e) = room.disconnect().await {
                warn!(error = %e, "room disconnect failed during cleanup");
            }
        }
        if let Some(call_id) = self.session.claimed_call_id.clone() {
            let outcome = match resolution {
                RecordResolution::Expire => self.channel.expire(&call_id).await,
                RecordResolution::Reject => {
                    self.channel.reject(&call_id, self.config.reject_mode).await
                }
                RecordResolution::Leave => Ok(()),
            };
            if let Err(e) = outcome {
                // Cleanup is best-effort; the sweeper catches leftovers.
                warn!(call_id = %call_id, error = %e, "call record cleanup failed");
            }
            // A resolved call id may legitimately signal again right
            // away (the visitor re-rings); stop suppressing it.
            self.dedup.forget(&call_id);
        }
        self.session.reset();
        self.announce(SessionState::Terminating, SessionState::Idle, reason).await;
    }

    async fn set_state(&mut self, new_state: SessionState, reason: &str) {
        let previous = self.session.state;
        if previous == new_state {
            return;
        }
        self.session.state = new_state;
        self.announce(previous, new_state, reason).await;
    }

    async fn announce(&self, previous: SessionState, new_state: SessionState, reason: &str) {
        let _ = self.state_tx.send(new_state);
        info!(
            from = previous.as_str(),
            to = new_state.as_str(),
            call_id = self.session.claimed_call_id.as_deref().unwrap_or("-"),
            reason = reason,
            "session state changed"
        );
        self.feedback
            .on_state_changed(StateChange {
                previous,
                new_state,
                call_id: self.session.claimed_call_id.clone(),
                caller_name: self.session.caller_name.clone(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            })
            .await;
    }
}

/// A room that arrived after its call ended still holds provider-side
/// resources; release them off the loop.
fn dispose_room(result: Result<Box<dyn RoomHandle>, SessionError>) {
    if let Ok(room) = result {
        tokio::spawn(async move {
            let _ = room.disconnect().await;
        });
    }
}
