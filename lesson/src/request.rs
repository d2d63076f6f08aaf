use serde::Deserialize;
use serde_json::{json, Value};

use crate::transcript::Turn;

/// Model names used for each request shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelChoice {
    /// Cheaper model for text-only turns.
    pub text_model: String,
    /// Vision-capable model used whenever an image is attached.
    pub vision_model: String,
}

impl Default for ModelChoice {
    fn default() -> Self {
        Self {
            text_model: "gpt-4o-mini".into(),
            vision_model: "gpt-4o".into(),
        }
    }
}

/// A chat-completion request, tagged by whether an image is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatRequest {
    TextOnly {
        system: String,
        history: Vec<Turn>,
        prompt: String,
    },
    TextWithImage {
        system: String,
        history: Vec<Turn>,
        prompt: String,
        /// `data:` URL or remote URL of the image.
        image_url: String,
    },
}

impl ChatRequest {
    /// Build the variant matching whether `image_url` is present.
    pub fn new(
        system: impl Into<String>,
        history: Vec<Turn>,
        prompt: impl Into<String>,
        image_url: Option<String>,
    ) -> Self {
        let (system, prompt) = (system.into(), prompt.into());
        match image_url {
            Some(image_url) => ChatRequest::TextWithImage {
                system,
                history,
                prompt,
                image_url,
            },
            None => ChatRequest::TextOnly {
                system,
                history,
                prompt,
            },
        }
    }

    pub fn system(&self) -> &str {
        match self {
            ChatRequest::TextOnly { system, .. } | ChatRequest::TextWithImage { system, .. } => {
                system
            }
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            ChatRequest::TextOnly { prompt, .. } | ChatRequest::TextWithImage { prompt, .. } => {
                prompt
            }
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, ChatRequest::TextWithImage { .. })
    }

    /// Message array in the chat-completions wire format.
    pub fn to_messages(&self) -> Vec<Value> {
        let (system, history) = match self {
            ChatRequest::TextOnly {
                system, history, ..
            }
            | ChatRequest::TextWithImage {
                system, history, ..
            } => (system, history),
        };
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({"role": "system", "content": system}));
        for turn in history {
            messages.push(json!({"role": turn.role.as_str(), "content": turn.content}));
        }
        let user = match self {
            ChatRequest::TextOnly { prompt, .. } => json!({"role": "user", "content": prompt}),
            ChatRequest::TextWithImage {
                prompt, image_url, ..
            } => json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": image_url}}
                ]
            }),
        };
        messages.push(user);
        messages
    }
}

/// Pick the model for `request`: vision model with an image, text model otherwise.
pub fn select_model<'a>(request: &ChatRequest, models: &'a ModelChoice) -> &'a str {
    match request {
        ChatRequest::TextOnly { .. } => &models.text_model,
        ChatRequest::TextWithImage { .. } => &models.vision_model,
    }
}
