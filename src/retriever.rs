//! Scoped passage retrieval.
//!
//! [`Retriever`] runs the retrieval half of a chat turn: rephrase the
//! question into a standalone query, embed it, and run a similarity
//! search scoped to the session's owner and selected documents.
//!
//! The two stages are exposed separately ([`Retriever::rephrase_query`],
//! [`Retriever::search_passages`]) so the session orchestrator can track
//! per-stage state; [`Retriever::retrieve`] composes them for direct use.

use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{ChatMessage, Passage};
use crate::rephrase::QueryRephraser;
use crate::session::ChatSession;
use crate::store::{SearchFilter, VectorStore};

pub const DEFAULT_TOP_K: usize = 3;

pub struct Retriever {
    rephraser: QueryRephraser,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        rephraser: QueryRephraser,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
    ) -> Self {
        Self {
            rephraser,
            embedder,
            store,
            top_k,
        }
    }

    /// Rewrite a follow-up question into a standalone search query.
    pub async fn rephrase_query(&self, history: &[ChatMessage], question: &str) -> Result<String> {
        self.rephraser.rephrase(history, question).await
    }

    /// Embed `query` and run the scoped similarity search.
    ///
    /// An empty document selection short-circuits to an empty result
    /// before any provider call; a blank owner is a scope violation.
    pub async fn search_passages(
        &self,
        owner_user_id: &str,
        document_ids: &HashSet<String>,
        query: &str,
    ) -> Result<Vec<Passage>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = SearchFilter::new(owner_user_id, document_ids.clone());
        filter.validate()?;

        let query_vec = self.embedder.embed_query(query).await?;
        tracing::debug!(query, k = self.top_k, "running scoped similarity search");
        self.store.search(&query_vec, self.top_k, &filter).await
    }

    /// Full retrieval for one question against a session's scope.
    pub async fn retrieve(&self, session: &ChatSession, question: &str) -> Result<Vec<Passage>> {
        if session.selected_document_ids().is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .rephrase_query(session.history(), question)
            .await?;
        self.search_passages(session.user_id(), session.selected_document_ids(), &query)
            .await
    }
}
