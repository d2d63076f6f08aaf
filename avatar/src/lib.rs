//! Client side of the hosted avatar stream.
//!
//! [`Handshake`] walks the vendor's fixed connection sequence through an
//! [`AvatarApi`] and a local [`Peer`], publishing a [`Status`] for every state
//! it enters.

pub mod api;
pub mod credential;
pub mod error;
pub mod handshake;
pub mod http;
pub mod peer;
pub mod poll;

pub use api::{
    AgentProfile, AgentStatus, AvatarApi, IceCandidate, IceServer, SdpKind, SessionDescription,
    StreamInfo,
};
pub use credential::{AvatarCredential, CredentialEncoding};
pub use error::AvatarError;
pub use handshake::{Handshake, HandshakeState, Phase, Status, Step};
pub use http::HttpAvatarApi;
pub use peer::{Peer, PeerConnectionState, PeerEvent, RemoteTrack};
pub use poll::PollPolicy;
