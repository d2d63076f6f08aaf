use tracing::{info, warn};

use crate::chat::CanChat;
use crate::prompt::{system_prompt, OPENING_PROMPT};
use crate::request::{select_model, ChatRequest, ModelChoice};
use crate::session::Session;
use crate::transcript::Turn;

/// Produces assistant turns for a [`Session`] by delegating to a hosted model.
///
/// Failures of the model call are never surfaced as errors; they come back as
/// an `"Error: ..."` reply so the conversation can continue.
pub struct Tutor<C> {
    chat: C,
    models: ModelChoice,
}

impl<C: CanChat> Tutor<C> {
    pub fn new(chat: C, models: ModelChoice) -> Self {
        Self { chat, models }
    }

    /// Build the request `session` would send for `prompt`.
    pub fn request_for(&self, session: &Session, prompt: &str) -> anyhow::Result<ChatRequest> {
        let system = system_prompt(session.objects(), session.image().is_some())?;
        Ok(ChatRequest::new(
            system,
            session.transcript().turns().to_vec(),
            prompt,
            session.image().map(|i| i.data_url()),
        ))
    }

    /// Ask the model for the next reply without touching the transcript.
    pub async fn reply(&self, session: &Session, prompt: &str) -> String {
        match self.try_reply(session, prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "llm", session = %session.id(), error = %e, "model call failed");
                format!("Error: {e}")
            }
        }
    }

    async fn try_reply(&self, session: &Session, prompt: &str) -> anyhow::Result<String> {
        let request = self.request_for(session, prompt)?;
        let model = select_model(&request, &self.models);
        info!(target: "llm", session = %session.id(), %model, image = request.has_image(), "asking model");
        self.chat.complete(model, &request).await
    }

    /// Start a lesson on the loaded image with one assistant question.
    pub async fn open_lesson<'s>(&self, session: &'s mut Session) -> &'s Turn {
        let question = self.reply(session, OPENING_PROMPT).await;
        session.transcript_mut().push_assistant(question)
    }

    /// Record the learner's `text` and answer it with exactly one assistant turn.
    ///
    /// ```
    /// use lesson::{MockChat, ModelChoice, Session, Tutor};
    /// # tokio_test::block_on(async {
    /// let tutor = Tutor::new(MockChat::new().reply("Hi!"), ModelChoice::default());
    /// let mut session = Session::new();
    /// let turn = tutor.respond(&mut session, "hello").await;
    /// assert_eq!(turn.content, "Hi!");
    /// assert_eq!(session.transcript().len(), 2);
    /// # });
    /// ```
    pub async fn respond<'s>(&self, session: &'s mut Session, text: &str) -> &'s Turn {
        let answer = self.reply(session, text).await;
        let transcript = session.transcript_mut();
        transcript.push_user(text);
        transcript.push_assistant(answer)
    }
}
