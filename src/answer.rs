//! Grounded answer generation.
//!
//! [`AnswerGenerator`] stuffs the retrieved passages into a bounded
//! context block and asks the model to answer only from it. The passages
//! actually retained after truncation come back as `sources`, each with
//! its similarity score, so the caller can cite them.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::{ChatModel, LlmMessage};
use crate::models::Passage;

const ANSWER_INSTRUCTION: &str = "Answer the user's question using only the context passages \
below. If the context does not contain the answer, say that the selected documents do not \
cover it. Do not use outside knowledge.";

const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// A generated answer plus the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Passage>,
}

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    max_context_chars: usize,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>, max_context_chars: usize) -> Self {
        Self {
            model,
            max_context_chars,
        }
    }

    /// Generate a grounded answer from ranked passages.
    ///
    /// `passages` arrive sorted by similarity descending (the retriever's
    /// output order); when the combined context would exceed the bound,
    /// passages are dropped from the lowest-similarity end. The best
    /// passage is always kept, even if oversized on its own.
    pub async fn generate(&self, passages: &[Passage], question: &str) -> Result<Answer> {
        let retained = self.fit_to_budget(passages);

        let context = retained
            .iter()
            .map(|p| p.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR);

        let system = format!("{}\n\nContext:\n{}", ANSWER_INSTRUCTION, context);
        let messages = [LlmMessage::system(system), LlmMessage::user(question)];

        let text = self.model.complete(&messages).await?;
        tracing::debug!(sources = retained.len(), "generated grounded answer");

        Ok(Answer {
            text,
            sources: retained,
        })
    }

    fn fit_to_budget(&self, passages: &[Passage]) -> Vec<Passage> {
        let mut retained: Vec<Passage> = passages.to_vec();
        loop {
            let total: usize = retained.iter().map(|p| p.chunk_text.len()).sum::<usize>()
                + PASSAGE_SEPARATOR.len() * retained.len().saturating_sub(1);
            if total <= self.max_context_chars || retained.len() <= 1 {
                return retained;
            }
            retained.pop();
        }
    }
}
