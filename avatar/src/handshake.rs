use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::api::{AgentProfile, AgentStatus, AvatarApi, IceServer, StreamInfo};
use crate::error::AvatarError;
use crate::peer::{Peer, PeerEvent, RemoteTrack};
use crate::poll::PollPolicy;

/// A vendor or peer interaction performed while connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    CreateAgent,
    AwaitAgentReady,
    CreateStream,
    OpenPeer,
    FetchOffer,
    SubmitAnswer,
    SendIceCandidate,
    AwaitTrack,
    Speak,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::CreateAgent => "create agent",
            Step::AwaitAgentReady => "agent status",
            Step::CreateStream => "create stream",
            Step::OpenPeer => "open peer connection",
            Step::FetchOffer => "fetch offer",
            Step::SubmitAnswer => "submit answer",
            Step::SendIceCandidate => "send ice candidate",
            Step::AwaitTrack => "await media track",
            Step::Speak => "speak",
        };
        f.write_str(s)
    }
}

/// Where the connection currently is, with the identifiers obtained so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    RequestingAgent,
    AwaitingAgentReady {
        agent_id: String,
    },
    CreatingStream {
        agent_id: String,
    },
    Negotiating {
        agent_id: String,
        stream: StreamInfo,
    },
    Connected {
        agent_id: String,
        stream: StreamInfo,
        track: RemoteTrack,
    },
    Failed {
        step: Option<Step>,
        message: String,
    },
}

/// Name of a [`HandshakeState`] without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    RequestingAgent,
    AwaitingAgentReady,
    CreatingStream,
    Negotiating,
    Connected,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::RequestingAgent => "requesting agent",
            Phase::AwaitingAgentReady => "awaiting agent",
            Phase::CreatingStream => "creating stream",
            Phase::Negotiating => "negotiating",
            Phase::Connected => "connected",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HandshakeState {
    pub fn phase(&self) -> Phase {
        match self {
            HandshakeState::Idle => Phase::Idle,
            HandshakeState::RequestingAgent => Phase::RequestingAgent,
            HandshakeState::AwaitingAgentReady { .. } => Phase::AwaitingAgentReady,
            HandshakeState::CreatingStream { .. } => Phase::CreatingStream,
            HandshakeState::Negotiating { .. } => Phase::Negotiating,
            HandshakeState::Connected { .. } => Phase::Connected,
            HandshakeState::Failed { .. } => Phase::Failed,
        }
    }

    /// Whether a new connection attempt may start from here.
    pub fn connect_enabled(&self) -> bool {
        matches!(self, HandshakeState::Idle | HandshakeState::Failed { .. })
    }
}

/// Update published every time the handshake changes state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub connect_enabled: bool,
}

impl Status {
    pub fn is_failure(&self) -> bool {
        self.phase == Phase::Failed
    }
}

impl From<&HandshakeState> for Status {
    fn from(state: &HandshakeState) -> Self {
        let message = match state {
            HandshakeState::Failed { message, .. } => Some(message.clone()),
            _ => None,
        };
        Self {
            phase: state.phase(),
            message,
            connect_enabled: state.connect_enabled(),
        }
    }
}

/// Drives the vendor's connection sequence against a local [`Peer`].
///
/// 1. create agent
/// 2. poll agent status until ready
/// 3. create stream
/// 4. open the peer connection with the stream's relay hints
/// 5. fetch the vendor offer and install it as remote description
/// 6. create, install and submit the answer
/// 7. forward local candidates until a media track arrives, then attach it
///
/// The first failure stops the sequence, publishes a single failed [`Status`]
/// and re-enables connecting. Remote resources are never released.
pub struct Handshake<A, P> {
    api: A,
    peer: P,
    profile: AgentProfile,
    poll: PollPolicy,
    state: HandshakeState,
    status: UnboundedSender<Status>,
}

impl<A: AvatarApi, P: Peer> Handshake<A, P> {
    pub fn new(
        api: A,
        peer: P,
        profile: AgentProfile,
        poll: PollPolicy,
        status: UnboundedSender<Status>,
    ) -> Self {
        Self {
            api,
            peer,
            profile,
            poll,
            state: HandshakeState::Idle,
            status,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Status describing the current state.
    pub fn status(&self) -> Status {
        Status::from(&self.state)
    }

    pub fn connect_enabled(&self) -> bool {
        self.state.connect_enabled()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, HandshakeState::Connected { .. })
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn connect(&mut self) -> Result<(), AvatarError> {
        self.request_agent().await?;
        self.await_agent_ready().await?;
        self.create_stream().await?;
        self.open_peer().await?;
        self.install_offer().await?;
        self.answer_offer().await?;
        self.await_track().await
    }

    /// Step 1: allocate the agent.
    pub async fn request_agent(&mut self) -> Result<(), AvatarError> {
        if !self.state.connect_enabled() {
            return Err(self.invalid("request agent"));
        }
        self.enter(HandshakeState::RequestingAgent);
        let result = self.api.create_agent(&self.profile).await;
        let agent_id = self.check(Step::CreateAgent, result)?;
        info!(target: "avatar", %agent_id, "agent created");
        self.enter(HandshakeState::AwaitingAgentReady { agent_id });
        Ok(())
    }

    /// Step 2: poll until the agent reports ready or the budget runs out.
    pub async fn await_agent_ready(&mut self) -> Result<(), AvatarError> {
        let agent_id = match &self.state {
            HandshakeState::AwaitingAgentReady { agent_id } => agent_id.clone(),
            _ => return Err(self.invalid("await agent")),
        };
        let max = self.poll.max_attempts;
        for attempt in 1..=max {
            let result = self.api.agent_status(&agent_id).await;
            let status = self.check(Step::AwaitAgentReady, result)?;
            debug!(target: "avatar", %agent_id, attempt, status = status.as_str(), "agent status");
            match status {
                AgentStatus::Ready => {
                    self.enter(HandshakeState::CreatingStream { agent_id });
                    return Ok(());
                }
                AgentStatus::Error => {
                    let err = AvatarError::AgentFailed {
                        agent_id,
                        status: status.as_str().to_string(),
                    };
                    return Err(self.fail(Step::AwaitAgentReady, err));
                }
                _ => {}
            }
            if attempt < max {
                tokio::time::sleep(self.poll.interval).await;
            }
        }
        let err = AvatarError::AgentTimeout {
            agent_id,
            attempts: max,
        };
        Err(self.fail(Step::AwaitAgentReady, err))
    }

    /// Step 3: allocate a stream for the ready agent.
    pub async fn create_stream(&mut self) -> Result<(), AvatarError> {
        let agent_id = match &self.state {
            HandshakeState::CreatingStream { agent_id } => agent_id.clone(),
            _ => return Err(self.invalid("create stream")),
        };
        let result = self.api.create_stream(&agent_id).await;
        let stream = self.check(Step::CreateStream, result)?;
        info!(target: "avatar", %agent_id, stream_id = %stream.stream_id, "stream created");
        self.enter(HandshakeState::Negotiating { agent_id, stream });
        Ok(())
    }

    /// Step 4: open the local connection with the stream's relay hints, or a
    /// public STUN server when the vendor sent none.
    pub async fn open_peer(&mut self) -> Result<(), AvatarError> {
        let (_, stream) = self.negotiating("open peer")?;
        let servers = if stream.ice_servers.is_empty() {
            vec![IceServer::public_stun()]
        } else {
            stream.ice_servers
        };
        let result = self.peer.open(&servers).await;
        self.check(Step::OpenPeer, result)
    }

    /// Step 5: fetch the vendor offer and install it as remote description.
    pub async fn install_offer(&mut self) -> Result<(), AvatarError> {
        let (agent_id, stream) = self.negotiating("install offer")?;
        let result = self.api.fetch_offer(&agent_id, &stream).await;
        let offer = self.check(Step::FetchOffer, result)?;
        let result = self.peer.set_remote_description(&offer).await;
        self.check(Step::FetchOffer, result)
    }

    /// Step 6: create the answer, install it locally and submit it.
    pub async fn answer_offer(&mut self) -> Result<(), AvatarError> {
        let (agent_id, stream) = self.negotiating("answer offer")?;
        let result = self.peer.create_answer().await;
        let answer = self.check(Step::SubmitAnswer, result)?;
        let result = self.peer.set_local_description(&answer).await;
        self.check(Step::SubmitAnswer, result)?;
        let result = self.api.submit_answer(&agent_id, &stream, &answer).await;
        self.check(Step::SubmitAnswer, result)
    }

    /// Step 7: forward local candidates until the vendor pushes a track.
    pub async fn await_track(&mut self) -> Result<(), AvatarError> {
        let (agent_id, stream) = self.negotiating("await track")?;
        loop {
            let event = self.peer.next_event().await;
            match event {
                Some(PeerEvent::Track(track)) => {
                    let result = self.peer.attach_track(&track).await;
                    self.check(Step::AwaitTrack, result)?;
                    info!(target: "avatar", %agent_id, track = %track.id, "media attached");
                    self.enter(HandshakeState::Connected {
                        agent_id,
                        stream,
                        track,
                    });
                    return Ok(());
                }
                Some(PeerEvent::ConnectionState(state)) if state.is_terminal() => {
                    let err = AvatarError::Peer(format!("{state:?}").to_lowercase());
                    return Err(self.fail(Step::AwaitTrack, err));
                }
                Some(other) => {
                    let result = Self::forward(&self.api, &agent_id, &stream, other).await;
                    self.check(Step::SendIceCandidate, result)?;
                }
                None => {
                    let err = AvatarError::Peer("closed before media arrived".into());
                    return Err(self.fail(Step::AwaitTrack, err));
                }
            }
        }
    }

    /// Handle one peer event after connecting. Returns `false` once the peer
    /// is gone or the connection ended, leaving teardown to the caller.
    ///
    /// Not cancel-safe: a late candidate may be dropped mid-delivery. Callers
    /// racing this against other work should pair [`Handshake::next_peer_event`]
    /// with [`Handshake::handle_peer_event`] instead.
    pub async fn drive(&mut self) -> bool {
        let event = self.next_peer_event().await;
        self.handle_peer_event(event).await
    }

    /// Wait for the next peer event. Cancel-safe as long as the peer's
    /// `next_event` is.
    pub async fn next_peer_event(&mut self) -> Option<PeerEvent> {
        self.peer.next_event().await
    }

    /// Act on an event from [`Handshake::next_peer_event`] while connected,
    /// forwarding late candidates to the vendor.
    pub async fn handle_peer_event(&mut self, event: Option<PeerEvent>) -> bool {
        let (agent_id, stream) = match &self.state {
            HandshakeState::Connected {
                agent_id, stream, ..
            } => (agent_id.clone(), stream.clone()),
            _ => return false,
        };
        match event {
            None => false,
            Some(PeerEvent::ConnectionState(state)) if state.is_terminal() => {
                info!(target: "avatar", ?state, "connection ended");
                false
            }
            Some(PeerEvent::Track(track)) => {
                debug!(target: "avatar", track = %track.id, "ignoring additional track");
                true
            }
            Some(event) => {
                if let Err(e) = Self::forward(&self.api, &agent_id, &stream, event).await {
                    warn!(target: "avatar", error = %e, "late candidate not delivered");
                }
                true
            }
        }
    }

    /// Have the connected avatar say `text`.
    pub async fn speak(&mut self, text: &str) -> Result<(), AvatarError> {
        let (agent_id, stream) = match &self.state {
            HandshakeState::Connected {
                agent_id, stream, ..
            } => (agent_id.clone(), stream.clone()),
            _ => return Err(self.invalid("speak")),
        };
        self.api.speak(&agent_id, &stream, text).await
    }

    /// Close the local connection and return to idle. The vendor's agent and
    /// stream are left allocated.
    pub async fn teardown(&mut self) {
        self.peer.close().await;
        info!(target: "avatar", from = %self.state.phase(), "teardown");
        self.enter(HandshakeState::Idle);
    }

    async fn forward(
        api: &A,
        agent_id: &str,
        stream: &StreamInfo,
        event: PeerEvent,
    ) -> Result<(), AvatarError> {
        match event {
            PeerEvent::IceCandidate(c) => {
                debug!(target: "avatar", candidate = %c.candidate, "forwarding candidate");
                api.send_ice_candidate(agent_id, stream, Some(&c)).await
            }
            PeerEvent::IceGatheringComplete => {
                api.send_ice_candidate(agent_id, stream, None).await
            }
            PeerEvent::ConnectionState(state) => {
                debug!(target: "avatar", ?state, "peer state");
                Ok(())
            }
            PeerEvent::Track(_) => Ok(()),
        }
    }

    fn negotiating(&self, action: &'static str) -> Result<(String, StreamInfo), AvatarError> {
        match &self.state {
            HandshakeState::Negotiating { agent_id, stream } => {
                Ok((agent_id.clone(), stream.clone()))
            }
            _ => Err(self.invalid(action)),
        }
    }

    fn invalid(&self, action: &'static str) -> AvatarError {
        AvatarError::InvalidState {
            action,
            state: self.state.phase().as_str(),
        }
    }

    fn check<T>(&mut self, step: Step, result: Result<T, AvatarError>) -> Result<T, AvatarError> {
        result.map_err(|e| self.fail(step, e))
    }

    fn fail(&mut self, step: Step, err: AvatarError) -> AvatarError {
        let message = err.to_string();
        warn!(target: "avatar", %step, error = %message, "handshake failed");
        self.enter(HandshakeState::Failed {
            step: Some(step),
            message,
        });
        err
    }

    fn enter(&mut self, state: HandshakeState) {
        let status = Status::from(&state);
        self.state = state;
        if self.status.send(status).is_err() {
            debug!(target: "avatar", "status receiver dropped");
        }
    }
}
