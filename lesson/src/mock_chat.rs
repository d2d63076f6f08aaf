use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::chat::CanChat;
use crate::request::ChatRequest;

/// A request seen by [`MockChat`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub request: ChatRequest,
}

/// Mock chat client returning scripted replies and recording every call.
///
/// Once the script is exhausted it answers `"mock response"`.
#[derive(Default)]
pub struct MockChat {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure with the given message.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Err(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CanChat for MockChat {
    async fn complete(&self, model: &str, request: &ChatRequest) -> anyhow::Result<String> {
        trace!(target: "llm", %model, system = request.system(), user = request.prompt(), "MockChat prompt");
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            request: request.clone(),
        });
        let next = self.script.lock().unwrap().pop_front();
        let resp = match next {
            Some(Ok(text)) => text,
            Some(Err(e)) => anyhow::bail!(e),
            None => "mock response".to_string(),
        };
        debug!(target: "llm", response = %resp, "MockChat full response");
        Ok(resp)
    }
}
