use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::logger::LogLevel;

/// Command line arguments for the tutor binary.
#[derive(Parser, Clone, Debug)]
#[command(name = "tutor", about = "Picture lessons with a talking avatar")]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, default_value_t = 8501)]
    pub port: u16,
    /// Key for the chat completion service.
    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,
    #[arg(long = "openai-url", env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_url: String,
    /// Key for the avatar service.
    #[arg(long = "did-api-key", env = "DID_API_KEY", hide_env_values = true)]
    pub did_api_key: String,
    /// The avatar key is already base64 encoded and is sent verbatim.
    #[arg(long = "did-key-encoded", env = "DID_KEY_ENCODED")]
    pub did_key_encoded: bool,
    #[arg(long = "did-url", env = "DID_BASE_URL", default_value = "https://api.d-id.com")]
    pub did_url: String,
    /// Optional TOML file with model, agent and polling settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,
}

impl Args {
    /// Address to bind the web server to.
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {addr}: {e}"))
    }
}
