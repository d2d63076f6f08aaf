use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, trace};

use crate::api::{
    AgentProfile, AgentStatus, AvatarApi, IceCandidate, IceServer, SessionDescription, StreamInfo,
};
use crate::credential::AvatarCredential;
use crate::error::AvatarError;
use crate::handshake::Step;

/// [`AvatarApi`] over the vendor's HTTP endpoints.
#[derive(Clone, Debug)]
pub struct HttpAvatarApi {
    base_url: String,
    credential: AvatarCredential,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct Status {
    status: String,
}

#[derive(Deserialize)]
struct StreamCreated {
    id: String,
    session_id: String,
    #[serde(default)]
    ice_servers: Vec<IceServer>,
}

impl HttpAvatarApi {
    pub fn new(base_url: impl Into<String>, credential: AvatarCredential) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        trace!(target: "avatar", %method, %url, "vendor request");
        self.client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, self.credential.authorization())
    }

    async fn send(&self, step: Step, req: RequestBuilder) -> Result<Response, AvatarError> {
        let resp = req
            .send()
            .await
            .map_err(|source| AvatarError::Transport { step, source })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(target: "avatar", %step, status = status.as_u16(), %body, "vendor rejected request");
            return Err(AvatarError::Http {
                step,
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        step: Step,
        req: RequestBuilder,
    ) -> Result<T, AvatarError> {
        self.send(step, req)
            .await?
            .json()
            .await
            .map_err(|source| AvatarError::Transport { step, source })
    }
}

#[async_trait]
impl AvatarApi for HttpAvatarApi {
    async fn create_agent(&self, profile: &AgentProfile) -> Result<String, AvatarError> {
        let body = json!({
            "presenter": {
                "type": "talk",
                "source_url": profile.presenter_image_url,
                "voice": {"type": profile.voice_provider, "voice_id": profile.voice_id},
            },
            "preview_name": "tutor",
        });
        let req = self.request(Method::POST, "/agents").json(&body);
        let created: Created = self.send_json(Step::CreateAgent, req).await?;
        Ok(created.id)
    }

    async fn agent_status(&self, agent_id: &str) -> Result<AgentStatus, AvatarError> {
        let req = self.request(Method::GET, &format!("/agents/{agent_id}"));
        let status: Status = self.send_json(Step::AwaitAgentReady, req).await?;
        Ok(AgentStatus::parse(&status.status))
    }

    async fn create_stream(&self, agent_id: &str) -> Result<StreamInfo, AvatarError> {
        let req = self
            .request(Method::POST, &format!("/agents/{agent_id}/streams"))
            .json(&json!({}));
        let created: StreamCreated = self.send_json(Step::CreateStream, req).await?;
        Ok(StreamInfo {
            stream_id: created.id,
            session_id: created.session_id,
            ice_servers: created.ice_servers,
        })
    }

    async fn send_ice_candidate(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        candidate: Option<&IceCandidate>,
    ) -> Result<(), AvatarError> {
        let body = match candidate {
            Some(c) => json!({
                "candidate": c.candidate,
                "sdpMid": c.sdp_mid,
                "sdpMLineIndex": c.sdp_mline_index,
                "session_id": stream.session_id,
            }),
            None => json!({"session_id": stream.session_id}),
        };
        let path = format!("/agents/{agent_id}/streams/{}/ice", stream.stream_id);
        let req = self.request(Method::POST, &path).json(&body);
        self.send(Step::SendIceCandidate, req).await?;
        Ok(())
    }

    async fn fetch_offer(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
    ) -> Result<SessionDescription, AvatarError> {
        let path = format!("/agents/{agent_id}/streams/{}/sdp", stream.stream_id);
        let req = self
            .request(Method::GET, &path)
            .query(&[("session_id", stream.session_id.as_str())]);
        self.send_json(Step::FetchOffer, req).await
    }

    async fn submit_answer(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        answer: &SessionDescription,
    ) -> Result<(), AvatarError> {
        let path = format!("/agents/{agent_id}/streams/{}/sdp", stream.stream_id);
        let body = json!({"answer": answer, "session_id": stream.session_id});
        let req = self.request(Method::POST, &path).json(&body);
        self.send(Step::SubmitAnswer, req).await?;
        Ok(())
    }

    async fn speak(
        &self,
        agent_id: &str,
        stream: &StreamInfo,
        text: &str,
    ) -> Result<(), AvatarError> {
        let path = format!("/agents/{agent_id}/streams/{}", stream.stream_id);
        let body = json!({
            "script": {"type": "text", "input": text},
            "session_id": stream.session_id,
        });
        let req = self.request(Method::POST, &path).json(&body);
        self.send(Step::Speak, req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialEncoding;
    use httpmock::prelude::*;
    use tracing_test::traced_test;

    const AUTH: &str = "Basic dXNlcjpzZWNyZXQ=";

    fn api(server: &MockServer) -> HttpAvatarApi {
        let cred = AvatarCredential::new("user:secret", CredentialEncoding::Raw).unwrap();
        HttpAvatarApi::new(server.base_url(), cred)
    }

    fn stream() -> StreamInfo {
        StreamInfo {
            stream_id: "strm_1".into(),
            session_id: "sess_1".into(),
            ice_servers: vec![],
        }
    }

    #[tokio::test]
    async fn create_agent_sends_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/agents")
                    .header("Authorization", AUTH)
                    .body_contains("source_url");
                then.status(201).json_body(serde_json::json!({"id": "agt_1"}));
            })
            .await;
        let id = api(&server).create_agent(&AgentProfile::default()).await.unwrap();
        assert_eq!(id, "agt_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn agent_status_is_parsed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/agents/agt_1");
                then.status(200).json_body(serde_json::json!({"id": "agt_1", "status": "ready"}));
            })
            .await;
        let status = api(&server).agent_status("agt_1").await.unwrap();
        assert_eq!(status, AgentStatus::Ready);
    }

    #[tokio::test]
    async fn create_stream_reads_ids_and_relays() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/agents/agt_1/streams");
                then.status(200).json_body(serde_json::json!({
                    "id": "strm_1",
                    "session_id": "sess_1",
                    "ice_servers": [{"urls": ["stun:stun.example.org"]}]
                }));
            })
            .await;
        let info = api(&server).create_stream("agt_1").await.unwrap();
        assert_eq!(info.stream_id, "strm_1");
        assert_eq!(info.session_id, "sess_1");
        assert_eq!(info.ice_servers[0].urls, vec!["stun:stun.example.org"]);
    }

    #[tokio::test]
    async fn offer_is_requested_for_session() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/agents/agt_1/streams/strm_1/sdp")
                    .query_param("session_id", "sess_1");
                then.status(200)
                    .json_body(serde_json::json!({"type": "offer", "sdp": "v=0"}));
            })
            .await;
        let offer = api(&server).fetch_offer("agt_1", &stream()).await.unwrap();
        assert_eq!(offer, SessionDescription::offer("v=0"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn answer_and_candidates_carry_session_id() {
        let server = MockServer::start_async().await;
        let sdp = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/agents/agt_1/streams/strm_1/sdp")
                    .body_contains("\"session_id\":\"sess_1\"")
                    .body_contains("\"type\":\"answer\"");
                then.status(200);
            })
            .await;
        let ice = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/agents/agt_1/streams/strm_1/ice")
                    .body_contains("\"sdpMLineIndex\":0")
                    .body_contains("\"session_id\":\"sess_1\"");
                then.status(200);
            })
            .await;
        let api = api(&server);
        api.submit_answer("agt_1", &stream(), &SessionDescription::answer("v=0"))
            .await
            .unwrap();
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 1 10.0.0.2 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        };
        api.send_ice_candidate("agt_1", &stream(), Some(&candidate))
            .await
            .unwrap();
        sdp.assert_async().await;
        ice.assert_async().await;
    }

    #[traced_test]
    #[tokio::test]
    async fn non_success_keeps_raw_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/agents/agt_1/streams");
                then.status(402).body("{\"kind\":\"InsufficientCreditsError\"}");
            })
            .await;
        let err = api(&server).create_stream("agt_1").await.unwrap_err();
        match &err {
            AvatarError::Http { step, status, body } => {
                assert_eq!(*step, Step::CreateStream);
                assert_eq!(*status, 402);
                assert!(body.contains("InsufficientCreditsError"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("InsufficientCreditsError"));
        assert!(logs_contain("vendor rejected request"));
    }

    #[tokio::test]
    async fn speak_posts_text_script() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/agents/agt_1/streams/strm_1")
                    .body_contains("\"input\":\"Well done!\"");
                then.status(200);
            })
            .await;
        api(&server)
            .speak("agt_1", &stream(), "Well done!")
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
