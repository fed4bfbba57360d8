//! Crate-wide error type.
//!
//! Each variant maps to one failure class in the pipeline. Ingestion-time
//! errors ([`Error::Extraction`], [`Error::EmbeddingProvider`],
//! [`Error::VectorStore`]) mark the affected document `error`; chat-turn
//! errors abort only the current turn and leave the session usable.
//!
//! [`Error::ScopeViolation`] is a programming-contract error: retrieval was
//! attempted without a valid owner + document filter. It must never be
//! downgraded to an unfiltered search.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("scope violation: {0}")]
    ScopeViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("a turn is already in progress for this session")]
    SessionBusy,

    #[error("document {0} is not ready for retrieval")]
    DocumentNotReady(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::VectorStore(e.to_string())
    }
}
