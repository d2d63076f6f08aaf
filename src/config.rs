use avatar::{AgentProfile, PollPolicy};
use lesson::ModelChoice;
use serde::Deserialize;
use std::path::Path;

/// Largest image upload accepted by default.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Settings for the avatar handshake.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    #[serde(flatten)]
    pub profile: AgentProfile,
    pub poll: PollPolicy,
}

/// Tunables loaded from `--config`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    pub models: ModelChoice,
    pub avatar: AvatarConfig,
    pub max_image_bytes: usize,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            models: ModelChoice::default(),
            avatar: AvatarConfig::default(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Load a [`TutorConfig`] from a TOML file.
///
/// ```no_run
/// # tokio_test::block_on(async {
/// let cfg = tutor::config::load("tutor.toml").await.unwrap();
/// println!("{}", cfg.models.vision_model);
/// # });
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<TutorConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}
