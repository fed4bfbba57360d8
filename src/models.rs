//! Core data models used throughout docchat.
//!
//! These types represent the documents, chunks, retrieved passages, and
//! chat messages that flow through the ingestion and retrieval pipeline.

/// Lifecycle status of an ingested document.
///
/// `Processing` documents are mid-ingestion and may not be selected for
/// chat scoping; only `Ready` documents are retrievable. Persisted via
/// [`DocumentStatus::as_str`] / [`DocumentStatus::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "ready" => Some(DocumentStatus::Ready),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

/// An ingested document. Immutable after ingestion except for the terminal
/// status transition.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub owner_user_id: String,
    pub source_path: String,
    pub status: DocumentStatus,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// A bounded, possibly overlapping substring of a document's text — the
/// atomic unit of embedding and retrieval.
///
/// `owner_user_id` always equals the parent document's owner; the store
/// enforces this at write time rather than inferring it at read time.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    pub owner_user_id: String,
    /// Position within the parent document, preserved for citations.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, used for staleness detection.
    pub hash: String,
}

/// A chunk paired with its embedding vector, ready for upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved passage with its real similarity score, as returned from
/// [`VectorStore::search`](crate::store::VectorStore::search) and cited
/// back to the user.
#[derive(Debug, Clone)]
pub struct Passage {
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    /// Cosine similarity against the query vector, in `[-1.0, 1.0]`.
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message in a chat session's transcript.
///
/// Assistant messages carry the source passages the answer was grounded
/// on; user messages have an empty `sources` list.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    pub sources: Vec<Passage>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Passage>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp(),
            sources,
        }
    }
}
