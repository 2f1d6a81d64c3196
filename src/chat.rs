//! Chat orchestration.
//!
//! Combines the session store, context assembler, and generation backend
//! into a single conversational turn: load transcript, append the user
//! turn, assemble context (explicit pins take precedence over freeform
//! retrieval), call the backend with the persona preamble and a bounded
//! message window, append the assistant turn, and persist. The turn pair
//! is persisted only once a response (real or fallback) exists.

use std::sync::Arc;

use chrono::Utc;

use crate::context::ContextAssembler;
use crate::error::Result;
use crate::generate::{sliding_window, Generator, TURN_WINDOW};
use crate::models::ChatMessage;
use crate::session::SessionStore;

/// Fixed terse-persona preamble prefixed to every system instruction.
pub const PERSONA_PREAMBLE: &str = "You are a helpful news assistant discussing publicly \
available RSS feed content. Provide direct, concise answers and helpful analysis of the \
articles below. Do not repeat the user's question. If you don't have specific information \
about something, say so.";

pub struct ChatOrchestrator {
    sessions: Arc<SessionStore>,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        assembler: ContextAssembler,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            sessions,
            assembler,
            generator,
        }
    }

    /// Run one conversational turn and return the assistant's reply.
    ///
    /// Holds the session's turn lock for the whole read-modify-write, so
    /// concurrent turns against the same session serialize. A generation
    /// failure propagates without persisting anything; the transcript is
    /// written back and the metadata row touched only after a response is
    /// in hand.
    pub async fn append_turn(&self, session_id: &str, user_message: &str) -> Result<String> {
        let session = self.sessions.get_session(session_id).await?;

        let lock = self.sessions.turn_lock(session_id);
        let _guard = lock.lock().await;

        let mut transcript = self.sessions.load_transcript(&session).await?;
        transcript.messages.push(ChatMessage::user(user_message));

        let context = self
            .assembler
            .assemble(user_message, &session.article_ids)
            .await?;
        let system = format!("{}\n\nRSS ARTICLES:\n{}", PERSONA_PREAMBLE, context);

        let window = sliding_window(&transcript.messages, TURN_WINDOW);
        let reply = self.generator.complete(&system, window).await?;

        transcript.messages.push(ChatMessage::assistant(&reply));
        transcript.updated_at = Utc::now();

        self.sessions.store_transcript(&session, &transcript).await?;
        self.sessions.touch(session_id).await?;

        Ok(reply)
    }
}
