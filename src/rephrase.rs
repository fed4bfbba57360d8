//! Query rewriting for conversational retrieval.
//!
//! A follow-up question ("what about the second one?") is useless as a
//! search query on its own. [`QueryRephraser`] turns it into a standalone
//! query by showing the model the conversation so far and asking for a
//! single search query that captures the latest question's intent.
//!
//! Stateless per call: the full prior history is passed in every time.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::{ChatModel, LlmMessage};
use crate::models::{ChatMessage, Role};

const REPHRASE_INSTRUCTION: &str = "Based on the conversation above, produce a single standalone \
search query that captures the intent of the latest question. Reply with the query only, on one line.";

pub struct QueryRephraser {
    model: Arc<dyn ChatModel>,
}

impl QueryRephraser {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Rewrite `question` into a standalone search query.
    ///
    /// With no prior history the question already stands alone, so it is
    /// returned unchanged without a provider call.
    pub async fn rephrase(&self, history: &[ChatMessage], question: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let mut messages: Vec<LlmMessage> = history
            .iter()
            .map(|m| match m.role {
                Role::User => LlmMessage::user(m.content.clone()),
                Role::Assistant => LlmMessage::assistant(m.content.clone()),
            })
            .collect();
        messages.push(LlmMessage::user(question));
        messages.push(LlmMessage::user(REPHRASE_INSTRUCTION));

        let output = self.model.complete(&messages).await?;
        let query = output
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .to_string();

        // A blank completion would make the search query empty; fall back
        // to the raw question rather than searching for nothing.
        if query.is_empty() {
            return Ok(question.to_string());
        }
        Ok(query)
    }
}
