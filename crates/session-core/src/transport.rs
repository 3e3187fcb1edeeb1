//! Media transport and credential seams
//!
//! The real-time media SDK and the credential-minting backend are
//! external collaborators; the session only depends on the contracts
//! here. Production bindings live with the embedder, and the tests
//! drive the state machine through scripted implementations.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SessionResult;

/// Time-limited opaque credential for joining a media room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCredential {
    /// The token the transport SDK consumes
    pub token: String,
}

/// Audio processing constraints requested when joining a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConstraints {
    /// Remove acoustic echo
    pub echo_cancellation: bool,
    /// Automatically adjust microphone gain
    pub auto_gain_control: bool,
    /// Filter background noise
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        // The door-station deployment runs with echo cancellation and
        // AGC on; noise suppression is left to the SDK default.
        Self {
            echo_cancellation: true,
            auto_gain_control: true,
            noise_suppression: false,
        }
    }
}

/// Options for a room connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Room name to join
    pub room: String,
    /// Local audio constraints
    pub audio: AudioConstraints,
}

/// Events emitted by a joined media room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A remote participant joined the room
    ParticipantConnected {
        /// Transport identity of the participant
        identity: String,
    },
    /// A remote participant left the room
    ParticipantDisconnected {
        /// Transport identity of the participant
        identity: String,
    },
    /// A remote media track became available
    TrackSubscribed {
        /// Identity of the participant owning the track
        identity: String,
    },
    /// The SDK lost the connection and is retrying on its own
    Reconnecting,
    /// The SDK restored the connection
    Reconnected,
    /// The room connection ended; `error` is `None` for a normal
    /// disconnect and carries a reason for an abnormal one
    Disconnected {
        /// Failure description, absent on clean shutdown
        error: Option<String>,
    },
    /// Network quality estimate changed (0 = unusable, 5 = excellent)
    NetworkQuality {
        /// Quality level, 0-5
        level: u8,
    },
}

/// Credential-minting endpoint contract: POST {identity, room} -> token
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// Mint a join credential for `identity` in `room`
    async fn mint(&self, identity: &str, room: &str) -> SessionResult<RoomCredential>;
}

/// A joined media room
///
/// Obtained from [`MediaTransport::connect`]; dropping the handle
/// without calling [`RoomHandle::disconnect`] leaks the room on the
/// provider side until its own timeout, so the session always
/// disconnects explicitly.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    /// Take the room event stream; yields `None` after the first call
    fn take_events(&mut self) -> Option<mpsc::Receiver<RoomEvent>>;

    /// Remote participants currently in the room
    fn remote_participants(&self) -> usize;

    /// Enable or disable the local audio track (mute)
    async fn set_muted(&self, muted: bool) -> SessionResult<()>;

    /// Leave the room and release its resources
    async fn disconnect(&self) -> SessionResult<()>;
}

/// Media transport SDK contract
#[async_trait]
pub trait MediaTransport: Send + Sync + 'static {
    /// Join a room with a minted credential
    async fn connect(
        &self,
        credential: &RoomCredential,
        options: &ConnectOptions,
    ) -> SessionResult<Box<dyn RoomHandle>>;
}
