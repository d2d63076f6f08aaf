use async_trait::async_trait;
use std::sync::Arc;

use crate::request::ChatRequest;

/// Interface for hosted models capable of answering a chat request.
#[async_trait]
pub trait CanChat: Send + Sync {
    /// Returns the text of the first completion produced by `model`.
    async fn complete(&self, model: &str, request: &ChatRequest) -> anyhow::Result<String>;
}

#[async_trait]
impl<C: CanChat + ?Sized> CanChat for Arc<C> {
    async fn complete(&self, model: &str, request: &ChatRequest) -> anyhow::Result<String> {
        (**self).complete(model, request).await
    }
}
