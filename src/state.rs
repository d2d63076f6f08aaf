use avatar::{AvatarApi, AvatarCredential, CredentialEncoding, HttpAvatarApi};
use lesson::{CanChat, OpenAiChat, Session, Tutor};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::args::Args;
use crate::config::{AvatarConfig, TutorConfig};

/// A session shared between request handlers.
pub type SharedSession = Arc<Mutex<Session>>;

/// Live sessions keyed by id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionStore {
    /// Start a fresh session and return its id.
    pub async fn create(&self) -> (Uuid, SharedSession) {
        let session = Session::new();
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, shared.clone());
        info!(session = %id, "session started");
        (id, shared)
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Forget a session. Returns `false` if it was unknown.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session = %id, "session ended");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Everything the web handlers share.
pub struct AppState {
    pub sessions: SessionStore,
    pub tutor: Tutor<Arc<dyn CanChat>>,
    pub avatar_api: Arc<dyn AvatarApi>,
    pub avatar: AvatarConfig,
    pub max_image_bytes: usize,
}

impl AppState {
    pub fn new(chat: Arc<dyn CanChat>, avatar_api: Arc<dyn AvatarApi>, config: TutorConfig) -> Self {
        Self {
            sessions: SessionStore::default(),
            tutor: Tutor::new(chat, config.models),
            avatar_api,
            avatar: config.avatar,
            max_image_bytes: config.max_image_bytes,
        }
    }

    /// Build the production clients from the command line.
    ///
    /// Fails when either service key is blank so the process stops before
    /// serving anything.
    pub fn from_args(args: &Args, config: TutorConfig) -> anyhow::Result<Self> {
        if args.openai_api_key.trim().is_empty() {
            anyhow::bail!("OPENAI_API_KEY must not be empty");
        }
        let encoding = if args.did_key_encoded {
            CredentialEncoding::Encoded
        } else {
            CredentialEncoding::Raw
        };
        let credential = AvatarCredential::new(args.did_api_key.clone(), encoding)?;
        let chat: Arc<dyn CanChat> =
            Arc::new(OpenAiChat::new(&args.openai_url, &args.openai_api_key));
        let avatar_api: Arc<dyn AvatarApi> = Arc::new(HttpAvatarApi::new(&args.did_url, credential));
        Ok(Self::new(chat, avatar_api, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn store_creates_finds_and_removes() {
        let store = SessionStore::default();
        assert!(store.is_empty().await);
        let (id, _) = store.create().await;
        assert!(store.get(id).await.is_some());
        assert_eq!(store.len().await, 1);
        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
        assert!(store.get(id).await.is_none());
        assert!(logs_contain("session started"));
        assert!(logs_contain("session ended"));
    }

    #[test]
    fn blank_keys_stop_startup() {
        let args = Args::try_parse_from([
            "tutor",
            "--openai-api-key",
            " ",
            "--did-api-key",
            "user:pw",
        ])
        .unwrap();
        assert!(AppState::from_args(&args, TutorConfig::default()).is_err());

        let args = Args::try_parse_from([
            "tutor",
            "--openai-api-key",
            "sk-test",
            "--did-api-key",
            "  ",
        ])
        .unwrap();
        assert!(AppState::from_args(&args, TutorConfig::default()).is_err());
    }
}
