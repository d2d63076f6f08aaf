//! Conversation side of the tutor.
//!
//! A [`Session`] holds the transcript, the active image and the objects the
//! learner declared on screen. A [`Tutor`] turns that state into a
//! [`ChatRequest`], picks the model and appends the reply.

pub mod chat;
pub mod image;
pub mod mock_chat;
pub mod openai;
pub mod prompt;
pub mod request;
pub mod session;
pub mod transcript;
pub mod tutor;

pub use chat::CanChat;
pub use image::LessonImage;
pub use mock_chat::MockChat;
pub use openai::OpenAiChat;
pub use request::{select_model, ChatRequest, ModelChoice};
pub use session::{Session, SessionSnapshot};
pub use transcript::{Role, Transcript, Turn};
pub use tutor::Tutor;
