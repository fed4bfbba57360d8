//! Storage abstraction for docchat.
//!
//! The [`VectorStore`] trait defines the document registry and the scoped
//! similarity search the retrieval pipeline runs on, enabling pluggable
//! backends (SQLite, in-memory for tests).
//!
//! # Isolation boundary
//!
//! Every search carries a [`SearchFilter`] — a declarative value, not a
//! caller-supplied predicate — restricting candidates to one owner and an
//! explicit document-id set. The filter is load-bearing: an empty document
//! set yields an empty result (fail closed), and a missing owner is a
//! [`ScopeViolation`](crate::error::Error::ScopeViolation) (fail loud).
//! No code path may widen a search to "everything".

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Document, DocumentStatus, EmbeddedChunk, Passage};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Mandatory scope for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub owner_user_id: String,
    pub document_ids: HashSet<String>,
}

impl SearchFilter {
    pub fn new(owner_user_id: impl Into<String>, document_ids: HashSet<String>) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            document_ids,
        }
    }

    /// Reject a filter that cannot scope a search to an owner.
    pub fn validate(&self) -> Result<()> {
        if self.owner_user_id.trim().is_empty() {
            return Err(Error::ScopeViolation(
                "search attempted without an owner".to_string(),
            ));
        }
        Ok(())
    }
}

/// Abstract storage backend: document registry plus chunk vectors with
/// scoped nearest-neighbor search.
///
/// Implementations must support concurrent readers during writes;
/// ingestion of one document must not block searches against others.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Register a new document (typically with status `Processing`).
    async fn create_document(&self, doc: &Document) -> Result<()>;

    /// Apply a status transition to a document.
    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// List a user's documents, newest first.
    async fn list_documents(&self, owner_user_id: &str) -> Result<Vec<Document>>;

    /// Persist embedded chunks, keyed by `(document_id, chunk_index)`.
    ///
    /// The chunks supplied for a document are its complete new sequence:
    /// existing rows are overwritten in place and stale indices beyond the
    /// new maximum are removed, so re-ingestion never accumulates
    /// duplicates. Every chunk's owner must equal its parent document's
    /// owner; a mismatch (or an unknown parent) is a
    /// [`VectorStore`](crate::error::Error::VectorStore) error.
    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Number of chunks currently stored for a document.
    async fn chunk_count(&self, document_id: &str) -> Result<usize>;

    /// Scoped cosine-similarity search.
    ///
    /// Returns up to `k` passages whose owner and document both match
    /// `filter`, sorted by similarity descending with ties broken by
    /// `chunk_index` ascending. An empty `filter.document_ids` returns an
    /// empty result without consulting the index. A stored vector whose
    /// dimensionality differs from `query_vec` is an error, never a
    /// silently substituted score.
    async fn search(&self, query_vec: &[f32], k: usize, filter: &SearchFilter)
        -> Result<Vec<Passage>>;
}

/// Order passages by similarity (desc), then chunk position and document
/// id (asc) for deterministic output.
pub(crate) fn sort_passages(passages: &mut [Passage]) {
    passages.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then(a.document_id.cmp(&b.document_id))
    });
}
