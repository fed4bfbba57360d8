//! In-memory [`VectorStore`] implementation for tests.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over the filtered candidate set.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Document, DocumentStatus, EmbeddedChunk, Passage};

use super::{sort_passages, SearchFilter, VectorStore};

struct StoredChunk {
    owner_user_id: String,
    text: String,
    vector: Vec<f32>,
}

/// In-memory store used by unit and pipeline tests.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    /// Keyed by `(document_id, chunk_index)` — the idempotence key.
    chunks: RwLock<HashMap<(String, i64), StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        match docs.get_mut(id) {
            Some(doc) => {
                doc.status = status;
                Ok(())
            }
            None => Err(Error::VectorStore(format!("unknown document: {}", id))),
        }
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.get(id).cloned())
    }

    async fn list_documents(&self, owner_user_id: &str) -> Result<Vec<Document>> {
        let docs = self.docs.read().unwrap();
        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| d.owner_user_id == owner_user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // Owner invariant is enforced here, at write time.
        let mut max_index: HashMap<String, i64> = HashMap::new();
        {
            let docs = self.docs.read().unwrap();
            for ec in chunks {
                let doc = docs.get(&ec.chunk.document_id).ok_or_else(|| {
                    Error::VectorStore(format!("unknown document: {}", ec.chunk.document_id))
                })?;
                if doc.owner_user_id != ec.chunk.owner_user_id {
                    return Err(Error::VectorStore(format!(
                        "chunk owner {} does not match document owner {}",
                        ec.chunk.owner_user_id, doc.owner_user_id
                    )));
                }
                let entry = max_index.entry(ec.chunk.document_id.clone()).or_insert(-1);
                *entry = (*entry).max(ec.chunk.chunk_index);
            }
        }

        let mut stored = self.chunks.write().unwrap();
        // Drop stale tail indices from a previous, longer ingestion.
        stored.retain(|(doc_id, index), _| match max_index.get(doc_id) {
            Some(max) => index <= max,
            None => true,
        });
        for ec in chunks {
            stored.insert(
                (ec.chunk.document_id.clone(), ec.chunk.chunk_index),
                StoredChunk {
                    owner_user_id: ec.chunk.owner_user_id.clone(),
                    text: ec.chunk.text.clone(),
                    vector: ec.vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn chunk_count(&self, document_id: &str) -> Result<usize> {
        let stored = self.chunks.read().unwrap();
        Ok(stored
            .keys()
            .filter(|(doc_id, _)| doc_id == document_id)
            .count())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<Passage>> {
        filter.validate()?;
        if filter.document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.chunks.read().unwrap();
        let mut passages = Vec::new();
        for ((doc_id, index), sc) in stored.iter() {
            if sc.owner_user_id != filter.owner_user_id || !filter.document_ids.contains(doc_id) {
                continue;
            }
            if sc.vector.len() != query_vec.len() {
                return Err(Error::VectorStore(format!(
                    "stored vector dimensionality {} does not match query {}",
                    sc.vector.len(),
                    query_vec.len()
                )));
            }
            passages.push(Passage {
                document_id: doc_id.clone(),
                chunk_index: *index,
                chunk_text: sc.text.clone(),
                similarity: cosine_similarity(query_vec, &sc.vector) as f64,
            });
        }

        sort_passages(&mut passages);
        passages.truncate(k);
        Ok(passages)
    }
}
