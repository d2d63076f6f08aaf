//! Web front of the picture tutor.
//!
//! Serves a single page per learner session, relays chat and image uploads to
//! the [`lesson`] crate and bridges the page's real-time connection to the
//! [`avatar`] handshake over a WebSocket.

pub mod args;
pub mod avatar_socket;
pub mod config;
pub mod logger;
pub mod page;
pub mod server;
pub mod state;

pub use args::Args;
pub use config::TutorConfig;
pub use server::{router, run_server};
pub use state::{AppState, SessionStore};
