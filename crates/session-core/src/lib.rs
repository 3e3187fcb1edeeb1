//! # entrybell-session-core
//!
//! Call session lifecycle for the entrybell doorbell receiver.
//!
//! One process owns one [`CallSession`](state::CallSession), driven by
//! a single event loop: incoming signals from
//! `entrybell-signal-core`, user actions, named timers, media-room
//! events and spawned-task completions all arrive as
//! [`SessionEvent`](events::SessionEvent)s and are handled serially,
//! so every transition of the Idle / Ringing / Connecting / Active /
//! Reconnecting / Terminating lifecycle is atomic.
//!
//! - [`manager`] - the [`SessionManager`] event loop and its handle
//! - [`state`] - session states and the owned call record
//! - [`events`] - the event alphabet and the feedback sink seam
//! - [`transport`] - media SDK and credential-minting contracts
//! - [`timers`] - named, epoch-guarded lifecycle timers
//! - [`dnd`] - the do-not-disturb gate
//! - [`retry`] - capped retry for credential fetch and room join
//! - [`config`] - every timeout and policy knob in one place
//!
//! ```no_run
//! use std::sync::Arc;
//! use entrybell_signal_core::{MemorySignalStore, SignalChannel};
//! use entrybell_session_core::{SessionConfig, SessionManager};
//! # use entrybell_session_core::transport::{CredentialProvider, MediaTransport};
//! # async fn run(
//! #     credentials: Arc<dyn CredentialProvider>,
//! #     transport: Arc<dyn MediaTransport>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemorySignalStore::new());
//! let channel = SignalChannel::new(store);
//! let config = SessionConfig::new("sala-principal");
//!
//! let session = SessionManager::new(config, channel, credentials, transport)
//!     .spawn()
//!     .await?;
//!
//! // Ringing is observable through the state watch; the user answers:
//! session.accept().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dnd;
pub mod error;
pub mod events;
pub mod manager;
pub mod retry;
pub mod state;
pub mod timers;
pub mod transport;

pub use config::SessionConfig;
pub use dnd::{DndGate, LocalClock, QuietHours, SystemLocalClock};
pub use error::{SessionError, SessionResult};
pub use events::{FeedbackSink, NullFeedback, SessionEvent, StateChange};
pub use manager::{SessionHandle, SessionManager};
pub use retry::{retry_with_cap, RetryConfig};
pub use state::{CallSession, SessionState};
pub use timers::TimerKind;
pub use transport::{
    AudioConstraints, ConnectOptions, CredentialProvider, MediaTransport, RoomCredential,
    RoomEvent, RoomHandle,
};
