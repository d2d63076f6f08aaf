use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{IceCandidate, IceServer, SessionDescription};
use crate::error::AvatarError;

/// Inbound media track pushed by the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: String,
    #[serde(default)]
    pub kind: String,
}

/// Connection state reported by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// States after which no media will arrive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerConnectionState::Failed | PeerConnectionState::Closed)
    }
}

/// Something the local peer connection reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    IceCandidate(IceCandidate),
    IceGatheringComplete,
    Track(RemoteTrack),
    ConnectionState(PeerConnectionState),
}

/// The local end of the real-time connection.
///
/// Implementations may live in another process (a browser tab) as long as they
/// answer in order.
#[async_trait]
pub trait Peer: Send {
    /// Create the connection using the given relay hints.
    async fn open(&mut self, ice_servers: &[IceServer]) -> Result<(), AvatarError>;

    async fn set_remote_description(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<(), AvatarError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, AvatarError>;

    async fn set_local_description(
        &mut self,
        answer: &SessionDescription,
    ) -> Result<(), AvatarError>;

    /// Next event from the connection, `None` once the peer is gone.
    async fn next_event(&mut self) -> Option<PeerEvent>;

    /// Route `track` to the video output.
    async fn attach_track(&mut self, track: &RemoteTrack) -> Result<(), AvatarError>;

    /// Close the connection and detach any media. Never fails.
    async fn close(&mut self);
}
