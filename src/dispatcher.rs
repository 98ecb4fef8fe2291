//! Request dispatcher
//!
//! Composes an owner's session store and response cache with an external
//! reply generator. One call to [`Dispatcher::respond`] handles one user
//! turn end to end.

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::registry::OwnerContext;
use crate::session::{ChatMessage, Role};
use async_trait::async_trait;
use serde::Serialize;

/// What the reply generator gets to work with
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The user's message for this turn
    pub input: String,
    /// Prior messages of the session, oldest first, without `input`
    pub history: Vec<ChatMessage>,
    /// True until the assistant has replied in this session
    pub is_first_message: bool,
    pub session_title: String,
}

/// Produces assistant replies
///
/// Implemented outside this crate by whatever model client is in use.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Outcome of one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub session_id: String,
    pub text: String,
    /// Whether the reply came from the response cache
    pub cached: bool,
}

/// Drives one user turn through store, cache and generator
pub struct Dispatcher<G> {
    generator: G,
    history_window: usize,
}

impl<G: ReplyGenerator> Dispatcher<G> {
    pub fn new(generator: G, config: &DispatcherConfig) -> Self {
        Self {
            generator,
            history_window: config.history_window,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Answers `input` in the owner's current session
    ///
    /// Creates a session when there is none, records the user message,
    /// serves the reply from the cache when the same question was answered
    /// before, and otherwise asks the generator. The reply is recorded in
    /// the session either way.
    ///
    /// # Errors
    ///
    /// Storage faults and generator failures are returned as-is. The user
    /// message stays recorded when generation fails.
    pub async fn respond(&self, context: &mut OwnerContext, input: &str) -> Result<Reply> {
        let session_id = match context.store.current_id() {
            Some(id) => id.to_string(),
            None => context.store.create_session(None)?,
        };

        let (history, is_first_message) = match context.store.session(&session_id) {
            Some(session) => (
                session.history(self.history_window).to_vec(),
                session.is_first_message(),
            ),
            None => (Vec::new(), true),
        };

        context
            .store
            .append_message(&session_id, Role::User, input)?;

        let (text, cached) = match context.cache.get(input) {
            Some(text) => {
                tracing::debug!("Serving cached reply in session {}", session_id);
                (text, true)
            }
            None => {
                let request = GenerationRequest {
                    input: input.to_string(),
                    history,
                    is_first_message,
                    session_title: context
                        .store
                        .session(&session_id)
                        .map(|s| s.title().to_string())
                        .unwrap_or_default(),
                };
                let text = self.generator.generate(&request).await?;
                (text, false)
            }
        };

        context
            .store
            .append_message(&session_id, Role::Assistant, &text)?;
        if !cached {
            context.cache.put(input, &text);
        }

        Ok(Reply {
            session_id,
            text,
            cached,
        })
    }
}
