//! Chat session state and the per-turn orchestrator.
//!
//! A [`ChatSession`] holds one user's conversation over one selection of
//! documents. [`ChatPipeline`] drives a turn through the fixed stage
//! sequence — rephrase, retrieve, generate — updating the session's
//! [`TurnState`] as it goes.
//!
//! Turn discipline:
//! - the user's message is recorded the moment the turn starts, so it is
//!   never lost when a provider fails mid-turn;
//! - exactly one assistant message is appended on success, none on
//!   failure, and the session always returns to `Idle` either way;
//! - a turn submitted while another is in flight is rejected with
//!   [`SessionBusy`](crate::error::Error::SessionBusy) — each turn depends
//!   on the finalized history of the previous one, so turns never
//!   interleave;
//! - changing the document selection clears the history: a new scope
//!   restarts the retrieval context.

use std::collections::HashSet;

use crate::answer::AnswerGenerator;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, DocumentStatus};
use crate::retriever::Retriever;
use crate::store::VectorStore;

/// Where the current turn is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingRephrase,
    AwaitingRetrieval,
    AwaitingGeneration,
}

/// One user's conversation scoped to a selection of their documents.
pub struct ChatSession {
    user_id: String,
    selected_document_ids: HashSet<String>,
    history: Vec<ChatMessage>,
    state: TurnState,
}

impl ChatSession {
    /// Create a session with an empty selection and history.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            selected_document_ids: HashSet::new(),
            history: Vec::new(),
            state: TurnState::Idle,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn selected_document_ids(&self) -> &HashSet<String> {
        &self.selected_document_ids
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Replace the document selection, validating each id against the
    /// store: the document must exist, belong to this session's user, and
    /// be `Ready`. Mid-ingestion and failed documents are not selectable.
    ///
    /// A successful change clears the history.
    pub async fn select_documents(
        &mut self,
        store: &dyn VectorStore,
        document_ids: HashSet<String>,
    ) -> Result<()> {
        for id in &document_ids {
            let doc = store
                .get_document(id)
                .await?
                .ok_or_else(|| Error::ScopeViolation(format!("unknown document: {}", id)))?;
            if doc.owner_user_id != self.user_id {
                return Err(Error::ScopeViolation(format!(
                    "document {} does not belong to user {}",
                    id, self.user_id
                )));
            }
            if doc.status != DocumentStatus::Ready {
                return Err(Error::DocumentNotReady(id.clone()));
            }
        }

        self.selected_document_ids = document_ids;
        self.history.clear();
        Ok(())
    }

    /// Force the session back to `Idle` after an abandoned turn (e.g. the
    /// caller cancelled the in-flight future). No partial message was
    /// appended; the user's message from the abandoned turn remains.
    pub fn abort_turn(&mut self) {
        self.state = TurnState::Idle;
    }
}

/// The fixed rephrase → retrieve → generate pipeline, wired once and
/// reused across turns and sessions.
pub struct ChatPipeline {
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl ChatPipeline {
    pub fn new(retriever: Retriever, generator: AnswerGenerator) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Run one turn: record the user's question, retrieve scoped passages,
    /// and append a grounded assistant message.
    ///
    /// On failure only the user's message remains in history and the error
    /// is returned; the caller may retry the question on the same session.
    pub async fn run_turn(
        &self,
        session: &mut ChatSession,
        question: &str,
    ) -> Result<ChatMessage> {
        if session.state != TurnState::Idle {
            return Err(Error::SessionBusy);
        }

        // Rephrasing sees the history as it was before this question.
        let prior_history = session.history.clone();
        session.history.push(ChatMessage::user(question));

        let result = self
            .turn_stages(session, &prior_history, question)
            .await;

        match result {
            Ok(message) => {
                session.history.push(message.clone());
                session.state = TurnState::Idle;
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat turn aborted");
                session.state = TurnState::Idle;
                Err(e)
            }
        }
    }

    async fn turn_stages(
        &self,
        session: &mut ChatSession,
        prior_history: &[ChatMessage],
        question: &str,
    ) -> Result<ChatMessage> {
        let passages = if session.selected_document_ids.is_empty() {
            // Fail closed: no scope, no retrieval, no provider calls.
            session.state = TurnState::AwaitingRetrieval;
            Vec::new()
        } else {
            session.state = TurnState::AwaitingRephrase;
            let query = self
                .retriever
                .rephrase_query(prior_history, question)
                .await?;

            session.state = TurnState::AwaitingRetrieval;
            self.retriever
                .search_passages(&session.user_id, &session.selected_document_ids, &query)
                .await?
        };

        session.state = TurnState::AwaitingGeneration;
        let answer = self.generator.generate(&passages, question).await?;

        Ok(ChatMessage::assistant(answer.text, answer.sources))
    }
}
