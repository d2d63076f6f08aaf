use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::chat::CanChat;
use crate::request::ChatRequest;

/// Chat client for OpenAI-compatible `chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiChat {
    /// Base URL including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CanChat for OpenAiChat {
    async fn complete(&self, model: &str, request: &ChatRequest) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "messages": request.to_messages(),
        });
        trace!(target: "llm", %url, %model, prompt = request.prompt(), "chat request");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completion failed ({status}): {text}");
        }
        let completion: Completion = resp.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no choices"))?
            .message
            .content
            .unwrap_or_default();
        debug!(target: "llm", %model, response = %content, "chat full response");
        Ok(content)
    }
}
