//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow for one document: extract → chunk → embed →
//! store. Every document carries a status through its lifecycle:
//! `processing` while the pipeline runs, `ready` once its chunks are
//! searchable, `error` if any stage fails. A failed document never blocks
//! its siblings; batch ingestion reports each file's outcome separately.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::chunker::chunk_document;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{Document, DocumentStatus, EmbeddedChunk};
use crate::store::VectorStore;

/// Runs the chunk → embed → store pipeline against one store and one
/// embedding provider. Cheap to clone; clones share the same backends.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self {
            store,
            embedder,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            batch_size: config.embedding.batch_size,
        }
    }

    /// Ingest a file from disk for `owner_user_id`.
    ///
    /// The document record is created up front so a failed extraction
    /// still leaves a visible `error` entry for the user.
    pub async fn ingest_file(&self, owner_user_id: &str, path: &Path) -> Result<Document> {
        let doc = new_document(owner_user_id, &path.display().to_string());
        self.store.create_document(&doc).await?;

        tracing::info!(document_id = %doc.id, path = %path.display(), "ingesting file");

        let text = match extract::extract_text(path) {
            Ok(text) => text,
            Err(e) => {
                self.mark_error(&doc.id).await;
                return Err(e);
            }
        };

        self.process(doc, &text).await
    }

    /// Ingest already-extracted text under a caller-supplied label.
    pub async fn ingest_text(
        &self,
        owner_user_id: &str,
        source_label: &str,
        text: &str,
    ) -> Result<Document> {
        let doc = new_document(owner_user_id, source_label);
        self.store.create_document(&doc).await?;
        self.process(doc, text).await
    }

    /// Ingest several files concurrently. Returns one outcome per input
    /// path, in input order; a failure in one file never aborts the rest.
    pub async fn ingest_files(
        &self,
        owner_user_id: &str,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<Document>)> {
        let mut set = JoinSet::new();
        for (idx, path) in paths.iter().enumerate() {
            let ingestor = self.clone();
            let owner = owner_user_id.to_string();
            let path = path.clone();
            set.spawn(async move {
                let result = ingestor.ingest_file(&owner, &path).await;
                (idx, path, result)
            });
        }

        let mut outcomes: Vec<Option<(PathBuf, Result<Document>)>> =
            (0..paths.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, path, result)) => outcomes[idx] = Some((path, result)),
                Err(e) => tracing::error!(error = %e, "ingestion task panicked"),
            }
        }

        outcomes
            .into_iter()
            .zip(paths)
            .map(|(outcome, path)| {
                outcome.unwrap_or_else(|| {
                    (
                        path.clone(),
                        Err(Error::Extraction("ingestion task failed".to_string())),
                    )
                })
            })
            .collect()
    }

    async fn process(&self, mut doc: Document, text: &str) -> Result<Document> {
        let chunks = chunk_document(&doc, text, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            self.mark_error(&doc.id).await;
            return Err(Error::Extraction(format!(
                "no text content in {}",
                doc.source_path
            )));
        }

        tracing::debug!(document_id = %doc.id, chunks = chunks.len(), "chunked document");

        let mut embedded: Vec<EmbeddedChunk> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(v) => v,
                Err(e) => {
                    self.mark_error(&doc.id).await;
                    return Err(e);
                }
            };
            embedded.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
            );
        }

        if let Err(e) = self.store.upsert_chunks(&embedded).await {
            self.mark_error(&doc.id).await;
            return Err(e);
        }

        self.store
            .set_document_status(&doc.id, DocumentStatus::Ready)
            .await?;
        doc.status = DocumentStatus::Ready;

        tracing::info!(document_id = %doc.id, chunks = embedded.len(), "document ready");
        Ok(doc)
    }

    // Best effort; the original failure is what the caller sees.
    async fn mark_error(&self, document_id: &str) {
        if let Err(e) = self
            .store
            .set_document_status(document_id, DocumentStatus::Error)
            .await
        {
            tracing::warn!(document_id, error = %e, "failed to mark document as errored");
        }
    }
}

fn new_document(owner_user_id: &str, source_path: &str) -> Document {
    Document {
        id: Uuid::new_v4().to_string(),
        owner_user_id: owner_user_id.to_string(),
        source_path: source_path.to_string(),
        status: DocumentStatus::Processing,
        created_at: chrono::Utc::now().timestamp(),
    }
}
