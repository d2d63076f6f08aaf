use clap::Parser;
use std::sync::Arc;
use tutor::{AppState, Args, TutorConfig, config, logger, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Err(e) = logger::try_init(args.log_level) {
        eprintln!("logger already initialized: {e}");
    }

    let config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            config::load(path).await?
        }
        None => TutorConfig::default(),
    };
    tracing::debug!(?config, "effective config");

    let state = Arc::new(AppState::from_args(&args, config)?);
    run_server(state, args.addr()?).await
}
