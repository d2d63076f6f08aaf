use thiserror::Error;

use crate::handshake::Step;

/// Failures while bringing up or using an avatar stream.
#[derive(Debug, Error)]
pub enum AvatarError {
    /// The vendor answered with a non-success status.
    #[error("{step} failed with status {status}: {body}")]
    Http {
        step: Step,
        status: u16,
        body: String,
    },
    /// The request never produced a usable response.
    #[error("{step} request failed: {source}")]
    Transport {
        step: Step,
        #[source]
        source: reqwest::Error,
    },
    /// The agent did not report ready within the polling budget.
    #[error("agent {agent_id} not ready after {attempts} status checks")]
    AgentTimeout { agent_id: String, attempts: u32 },
    /// The vendor reported the agent as unusable.
    #[error("agent {agent_id} reported status {status}")]
    AgentFailed { agent_id: String, status: String },
    /// The local peer connection failed or went away.
    #[error("peer connection {0}")]
    Peer(String),
    /// An operation was attempted in a state that does not allow it.
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("invalid credential: {0}")]
    Credential(&'static str),
}

impl AvatarError {
    /// Step of the handshake this error belongs to, when known.
    pub fn step(&self) -> Option<Step> {
        match self {
            AvatarError::Http { step, .. } | AvatarError::Transport { step, .. } => Some(*step),
            AvatarError::AgentTimeout { .. } | AvatarError::AgentFailed { .. } => {
                Some(Step::AwaitAgentReady)
            }
            _ => None,
        }
    }
}
