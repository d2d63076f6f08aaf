use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AvatarError;

/// Presenter image and voice used when creating an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub presenter_image_url: String,
    pub voice_provider: String,
    pub voice_id: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            presenter_image_url: "https://create-images-results.d-id.com/DefaultPresenters/Noelle_f/image.jpeg".into(),
            voice_provider: "microsoft".into(),
            voice_id: "en-US-JennyNeural".into(),
        }
    }
}

/// Readiness reported by the agent status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Created,
    Ready,
    Error,
    Other(String),
}

impl AgentStatus {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "created" | "pending" => AgentStatus::Created,
            "ready" | "done" => AgentStatus::Ready,
            "error" | "rejected" => AgentStatus::Error,
            other => AgentStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Created => "created",
            AgentStatus::Ready => "ready",
            AgentStatus::Error => "error",
            AgentStatus::Other(s) => s,
        }
    }
}

/// Network traversal relay hint handed to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn public_stun() -> Self {
        Self {
            urls: vec!["stun:stun.l.google.com:19302".into()],
            username: None,
            credential: None,
        }
    }
}

/// Identifiers of a media stream allocated for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_id: String,
    pub session_id: String,
    pub ice_servers: Vec<IceServer>,
}

/// A local network candidate gathered by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Endpoints of the avatar vendor used by the handshake.
#[async_trait]
pub trait AvatarApi: Send + Sync {
    /// Allocate an agent and return its identifier.
    async fn create_agent(&self, profile: &AgentProfile) -> Result<String, AvatarError>;

    async fn agent_status(&self, agent_id: &str) -> Result<AgentStatus, AvatarError>;

    /// Allocate a media stream for `agent_id`.
    async fn create_stream(&self, agent_id: &str) -> Result<StreamInfo, AvatarError>;

    /// Forward one local candidate for the stream/session pair.
    async fn send_ice_candidate(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        candidate: Option<&IceCandidate>,
    ) -> Result<(), AvatarError>;

    /// Fetch the vendor's offer for the stream/session pair.
    async fn fetch_offer(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
    ) -> Result<SessionDescription, AvatarError>;

    async fn submit_answer(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        answer: &SessionDescription,
    ) -> Result<(), AvatarError>;

    /// Ask the avatar to say `text` on a connected stream.
    async fn speak(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        text: &str,
    ) -> Result<(), AvatarError>;
}

#[async_trait]
impl<T: AvatarApi + ?Sized> AvatarApi for Arc<T> {
    async fn create_agent(&self, profile: &AgentProfile) -> Result<String, AvatarError> {
        (**self).create_agent(profile).await
    }

    async fn agent_status(&self, agent_id: &str) -> Result<AgentStatus, AvatarError> {
        (**self).agent_status(agent_id).await
    }

    async fn create_stream(&self, agent_id: &str) -> Result<StreamInfo, AvatarError> {
        (**self).create_stream(agent_id).await
    }

    async fn send_ice_candidate(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        candidate: Option<&IceCandidate>,
    ) -> Result<(), AvatarError> {
        (**self).send_ice_candidate(agent_id, stream, candidate).await
    }

    async fn fetch_offer(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
    ) -> Result<SessionDescription, AvatarError> {
        (**self).fetch_offer(agent_id, stream).await
    }

    async fn submit_answer(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        answer: &SessionDescription,
    ) -> Result<(), AvatarError> {
        (**self).submit_answer(agent_id, stream, answer).await
    }

    async fn speak(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        text: &str,
    ) -> Result<(), AvatarError> {
        (**self).speak(agent_id, stream, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vendor_status_words() {
        assert_eq!(AgentStatus::parse("READY"), AgentStatus::Ready);
        assert_eq!(AgentStatus::parse("created"), AgentStatus::Created);
        assert_eq!(AgentStatus::parse("error"), AgentStatus::Error);
        assert_eq!(
            AgentStatus::parse("warming"),
            AgentStatus::Other("warming".into())
        );
    }

    #[test]
    fn candidate_uses_browser_field_names() {
        let c: IceCandidate = serde_json::from_value(serde_json::json!({
            "candidate": "candidate:1",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        }))
        .unwrap();
        assert_eq!(c.sdp_mid.as_deref(), Some("0"));
        assert_eq!(c.sdp_mline_index, Some(0));
    }
}
