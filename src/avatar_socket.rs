use async_trait::async_trait;
use avatar::{
    AvatarError, Handshake, IceCandidate, IceServer, Peer, PeerConnectionState, PeerEvent, Phase,
    RemoteTrack, SessionDescription, Status,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Message sent by the page over the avatar socket.
///
/// Connection reports echo the `attempt` of the `open` that created the
/// page's connection object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Connect,
    Disconnect,
    Speak { text: String },
    Ice { attempt: u64, candidate: IceCandidate },
    IceComplete { attempt: u64 },
    RemoteSet { attempt: u64 },
    Answer { attempt: u64, sdp: String },
    LocalSet { attempt: u64 },
    Track { attempt: u64, track: RemoteTrack },
    State { attempt: u64, state: PeerConnectionState },
    PeerError { attempt: u64, message: String },
}

/// Message sent to the page over the avatar socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Status(Status),
    Open { attempt: u64, ice_servers: Vec<IceServer> },
    Offer { attempt: u64, sdp: String },
    CreateAnswer { attempt: u64 },
    SetLocal { attempt: u64, sdp: String },
    Attach { track: RemoteTrack },
    Close,
    Notice { message: String },
}

/// Buttons and speech requests from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Control {
    Connect,
    Disconnect,
    Speak(String),
}

/// What the page's connection object reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerReply {
    Event(PeerEvent),
    RemoteSet,
    Answer(String),
    LocalSet,
    Failed(String),
}

/// A [`PeerReply`] together with the connection attempt it belongs to.
pub type Tagged = (u64, PeerReply);

enum Routed {
    Control(Control),
    Peer(Tagged),
}

impl ClientMessage {
    fn route(self) -> Routed {
        let event = |attempt, e| Routed::Peer((attempt, PeerReply::Event(e)));
        match self {
            ClientMessage::Connect => Routed::Control(Control::Connect),
            ClientMessage::Disconnect => Routed::Control(Control::Disconnect),
            ClientMessage::Speak { text } => Routed::Control(Control::Speak(text)),
            ClientMessage::Ice { attempt, candidate } => {
                event(attempt, PeerEvent::IceCandidate(candidate))
            }
            ClientMessage::IceComplete { attempt } => event(attempt, PeerEvent::IceGatheringComplete),
            ClientMessage::Track { attempt, track } => event(attempt, PeerEvent::Track(track)),
            ClientMessage::State { attempt, state } => {
                event(attempt, PeerEvent::ConnectionState(state))
            }
            ClientMessage::RemoteSet { attempt } => Routed::Peer((attempt, PeerReply::RemoteSet)),
            ClientMessage::Answer { attempt, sdp } => {
                Routed::Peer((attempt, PeerReply::Answer(sdp)))
            }
            ClientMessage::LocalSet { attempt } => Routed::Peer((attempt, PeerReply::LocalSet)),
            ClientMessage::PeerError { attempt, message } => {
                Routed::Peer((attempt, PeerReply::Failed(message)))
            }
        }
    }
}

/// [`Peer`] backed by the `RTCPeerConnection` living in the page.
///
/// Commands go out as [`ServerMessage`]s and the page answers each one in
/// order. Connection events that arrive while a command is pending are queued
/// for [`Peer::next_event`]. Each `open` starts a new attempt; replies tagged
/// with any other attempt are dropped.
pub struct BrowserPeer {
    out: UnboundedSender<ServerMessage>,
    inbox: UnboundedReceiver<Tagged>,
    pending: VecDeque<PeerEvent>,
    attempt: u64,
}

impl BrowserPeer {
    pub fn new(out: UnboundedSender<ServerMessage>, inbox: UnboundedReceiver<Tagged>) -> Self {
        Self {
            out,
            inbox,
            pending: VecDeque::new(),
            attempt: 0,
        }
    }

    /// Current attempt, zero before the first `open`.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Next reply for the current attempt. Cancel-safe.
    async fn recv(&mut self) -> Option<PeerReply> {
        loop {
            let (attempt, reply) = self.inbox.recv().await?;
            if attempt == self.attempt {
                return Some(reply);
            }
            debug!(target: "avatar", attempt, current = self.attempt, ?reply, "stale peer reply dropped");
        }
    }

    fn send(&self, msg: ServerMessage) -> Result<(), AvatarError> {
        self.out
            .send(msg)
            .map_err(|_| AvatarError::Peer("page went away".into()))
    }

    async fn await_reply(&mut self, waiting_for: &'static str) -> Result<PeerReply, AvatarError> {
        loop {
            match self.recv().await {
                Some(PeerReply::Event(event)) => self.pending.push_back(event),
                Some(PeerReply::Failed(message)) => {
                    return Err(AvatarError::Peer(format!("{waiting_for} failed: {message}")));
                }
                Some(reply) => return Ok(reply),
                None => {
                    return Err(AvatarError::Peer(format!(
                        "closed while waiting for {waiting_for}"
                    )));
                }
            }
        }
    }
}

fn unexpected(waiting_for: &str, reply: PeerReply) -> AvatarError {
    AvatarError::Peer(format!("sent {reply:?} while {waiting_for} was expected"))
}

#[async_trait]
impl Peer for BrowserPeer {
    async fn open(&mut self, ice_servers: &[IceServer]) -> Result<(), AvatarError> {
        self.pending.clear();
        self.attempt += 1;
        self.send(ServerMessage::Open {
            attempt: self.attempt,
            ice_servers: ice_servers.to_vec(),
        })
    }

    async fn set_remote_description(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<(), AvatarError> {
        self.send(ServerMessage::Offer {
            attempt: self.attempt,
            sdp: offer.sdp.clone(),
        })?;
        match self.await_reply("remote description").await? {
            PeerReply::RemoteSet => Ok(()),
            other => Err(unexpected("remote description", other)),
        }
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, AvatarError> {
        self.send(ServerMessage::CreateAnswer {
            attempt: self.attempt,
        })?;
        match self.await_reply("answer").await? {
            PeerReply::Answer(sdp) => Ok(SessionDescription::answer(sdp)),
            other => Err(unexpected("answer", other)),
        }
    }

    async fn set_local_description(
        &mut self,
        answer: &SessionDescription,
    ) -> Result<(), AvatarError> {
        self.send(ServerMessage::SetLocal {
            attempt: self.attempt,
            sdp: answer.sdp.clone(),
        })?;
        match self.await_reply("local description").await? {
            PeerReply::LocalSet => Ok(()),
            other => Err(unexpected("local description", other)),
        }
    }

    async fn next_event(&mut self) -> Option<PeerEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        loop {
            match self.recv().await? {
                PeerReply::Event(event) => return Some(event),
                PeerReply::Failed(message) => {
                    warn!(target: "avatar", %message, "page reported a peer error");
                    return Some(PeerEvent::ConnectionState(PeerConnectionState::Failed));
                }
                other => debug!(target: "avatar", ?other, "stray peer reply"),
            }
        }
    }

    async fn attach_track(&mut self, track: &RemoteTrack) -> Result<(), AvatarError> {
        self.send(ServerMessage::Attach {
            track: track.clone(),
        })
    }

    async fn close(&mut self) {
        let _ = self.out.send(ServerMessage::Close);
        self.pending.clear();
        while self.inbox.try_recv().is_ok() {}
    }
}

/// Serve one avatar socket for session `id` until the page disconnects.
pub async fn run(state: Arc<AppState>, id: Uuid, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<Status>();
    let (peer_tx, peer_rx) = mpsc::unbounded_channel::<Tagged>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Control>();

    let writer = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                Some(status) = status_rx.recv() => ServerMessage::Status(status),
                Some(msg) = out_rx.recv() => msg,
                else => break,
            };
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!(target: "avatar", error = %e, "could not encode avatar message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => match msg.route() {
                    Routed::Control(c) => {
                        if ctrl_tx.send(c).is_err() {
                            break;
                        }
                    }
                    Routed::Peer(reply) => {
                        let _ = peer_tx.send(reply);
                    }
                },
                Err(e) => warn!(target: "avatar", error = %e, "unreadable avatar message"),
            }
        }
    });

    info!(target: "avatar", session = %id, "avatar socket opened");
    let mut handshake = Handshake::new(
        state.avatar_api.clone(),
        BrowserPeer::new(out_tx.clone(), peer_rx),
        state.avatar.profile.clone(),
        state.avatar.poll.clone(),
        status_tx,
    );
    let _ = out_tx.send(ServerMessage::Status(handshake.status()));

    loop {
        tokio::select! {
            ctrl = ctrl_rx.recv() => match ctrl {
                None => break,
                Some(Control::Connect) => {
                    let abandoned = tokio::select! {
                        result = handshake.connect() => {
                            if let Err(e) = result {
                                notice_if_rejected(&out_tx, &e);
                            }
                            None
                        }
                        gone = until_disconnect(&mut ctrl_rx) => Some(gone),
                    };
                    if let Some(gone) = abandoned {
                        info!(target: "avatar", session = %id, "connect abandoned");
                        handshake.teardown().await;
                        if gone {
                            break;
                        }
                    }
                }
                Some(Control::Disconnect) => handshake.teardown().await,
                Some(Control::Speak(text)) => {
                    if let Err(e) = handshake.speak(&text).await {
                        warn!(target: "avatar", session = %id, error = %e, "avatar could not speak");
                        let _ = out_tx.send(ServerMessage::Notice { message: e.to_string() });
                    }
                }
            },
            event = handshake.next_peer_event(), if handshake.is_connected() => {
                // Runs outside the select so a late candidate is always delivered.
                if !handshake.handle_peer_event(event).await {
                    handshake.teardown().await;
                }
            }
        }
    }

    if handshake.status().phase != Phase::Idle {
        handshake.teardown().await;
    }
    drop(handshake);
    drop(out_tx);
    reader.abort();
    let _ = writer.await;
    info!(target: "avatar", session = %id, "avatar socket closed");
}

/// Wait for a disconnect while a connection attempt runs. Returns `true` if
/// the page went away instead.
async fn until_disconnect(ctrl: &mut UnboundedReceiver<Control>) -> bool {
    while let Some(c) = ctrl.recv().await {
        match c {
            Control::Disconnect => return false,
            other => debug!(target: "avatar", ?other, "ignored while connecting"),
        }
    }
    true
}

/// Failures inside the sequence already produced a failed status. Anything
/// rejected before it started is reported as a notice.
fn notice_if_rejected(out: &UnboundedSender<ServerMessage>, err: &AvatarError) {
    if let AvatarError::InvalidState { .. } = err {
        let _ = out.send(ServerMessage::Notice {
            message: err.to_string(),
        });
    }
}
