use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Verbosity accepted by `--log-level`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Filter used by [`try_init`].
///
/// An explicit `level` wins. Otherwise `RUST_LOG` is honoured and anything
/// unparsable falls back to `info`.
pub fn filter(level: Option<LogLevel>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from(level).into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Installs the global subscriber, failing if one is already set.
///
/// ```no_run
/// use tutor::logger::{self, LogLevel};
/// logger::try_init(Some(LogLevel::Debug)).expect("logger initialized");
/// ```
pub fn try_init(level: Option<LogLevel>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .try_init()
        .map_err(Into::into)
}
