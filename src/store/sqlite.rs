//! SQLite-backed [`VectorStore`] implementation.
//!
//! Documents and chunks live in two tables; chunk vectors are stored
//! inline as little-endian f32 BLOBs. Chunk rows are keyed by
//! `(document_id, chunk_index)` so re-ingestion overwrites in place.
//! WAL journal mode (see [`crate::db`]) lets chat searches proceed while
//! another document is being ingested.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Document, DocumentStatus, EmbeddedChunk, Passage};

use super::{sort_passages, SearchFilter, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let status_str: String = row.get("status");
    let status = DocumentStatus::parse(&status_str)
        .ok_or_else(|| Error::VectorStore(format!("invalid document status: {}", status_str)))?;
    Ok(Document {
        id: row.get("id"),
        owner_user_id: row.get("owner_user_id"),
        source_path: row.get("source_path"),
        status,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn create_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_user_id, source_path, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_path = excluded.source_path,
                status = excluded.status
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner_user_id)
        .bind(&doc.source_path)
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::VectorStore(format!("unknown document: {}", id)));
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, owner_user_id, source_path, status, created_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_document(&r)).transpose()
    }

    async fn list_documents(&self, owner_user_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_user_id, source_path, status, created_at
            FROM documents
            WHERE owner_user_id = ?
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        // Owner invariant enforced at write time against the parent rows.
        let mut max_index: std::collections::HashMap<&str, i64> = std::collections::HashMap::new();
        for ec in chunks {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT owner_user_id FROM documents WHERE id = ?")
                    .bind(&ec.chunk.document_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match owner {
                None => {
                    return Err(Error::VectorStore(format!(
                        "unknown document: {}",
                        ec.chunk.document_id
                    )))
                }
                Some(owner) if owner != ec.chunk.owner_user_id => {
                    return Err(Error::VectorStore(format!(
                        "chunk owner {} does not match document owner {}",
                        ec.chunk.owner_user_id, owner
                    )))
                }
                Some(_) => {}
            }
            let entry = max_index.entry(ec.chunk.document_id.as_str()).or_insert(-1);
            *entry = (*entry).max(ec.chunk.chunk_index);
        }

        // Drop stale tail rows from a previous, longer ingestion.
        for (doc_id, max) in &max_index {
            sqlx::query("DELETE FROM chunks WHERE document_id = ? AND chunk_index > ?")
                .bind(doc_id)
                .bind(max)
                .execute(&mut *tx)
                .await?;
        }

        for ec in chunks {
            let blob = vec_to_blob(&ec.vector);
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, owner_user_id, chunk_index, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                    owner_user_id = excluded.owner_user_id,
                    text = excluded.text,
                    hash = excluded.hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&ec.chunk.document_id)
            .bind(&ec.chunk.owner_user_id)
            .bind(ec.chunk.chunk_index)
            .bind(&ec.chunk.text)
            .bind(&ec.chunk.hash)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunk_count(&self, document_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
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

        // The scope is applied in SQL; similarity is computed over the
        // already-filtered candidate set only.
        let placeholders = vec!["?"; filter.document_ids.len()].join(", ");
        let sql = format!(
            "SELECT document_id, chunk_index, text, embedding FROM chunks \
             WHERE owner_user_id = ? AND document_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(&filter.owner_user_id);
        for doc_id in &filter.document_ids {
            query = query.bind(doc_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut passages = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            if vector.len() != query_vec.len() {
                return Err(Error::VectorStore(format!(
                    "stored vector dimensionality {} does not match query {}",
                    vector.len(),
                    query_vec.len()
                )));
            }
            passages.push(Passage {
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                chunk_text: row.get("text"),
                similarity: cosine_similarity(query_vec, &vector) as f64,
            });
        }

        sort_passages(&mut passages);
        passages.truncate(k);
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::models::Chunk;
    use crate::{db, migrate};
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let config = DbConfig {
            path: tmp.path().join("docchat.sqlite"),
        };
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn doc(id: &str, owner: &str) -> Document {
        Document {
            id: id.to_string(),
            owner_user_id: owner.to_string(),
            source_path: format!("{}.txt", id),
            status: DocumentStatus::Processing,
            created_at: 100,
        }
    }

    fn embedded(doc_id: &str, owner: &str, index: i64, text: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                document_id: doc_id.to_string(),
                owner_user_id: owner.to_string(),
                chunk_index: index,
                text: text.to_string(),
                hash: format!("h{}", index),
            },
            vector,
        }
    }

    fn scope(owner: &str, docs: &[&str]) -> SearchFilter {
        SearchFilter::new(owner, docs.iter().map(|s| s.to_string()).collect::<HashSet<_>>())
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let (_tmp, store) = test_store().await;
        store.create_document(&doc("d1", "u1")).await.unwrap();

        let fetched = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Processing);

        store
            .set_document_status("d1", DocumentStatus::Ready)
            .await
            .unwrap();
        let fetched = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Ready);

        assert!(store.get_document("missing").await.unwrap().is_none());
        assert!(store
            .set_document_status("missing", DocumentStatus::Error)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_documents_scoped_to_owner() {
        let (_tmp, store) = test_store().await;
        store.create_document(&doc("d1", "u1")).await.unwrap();
        store.create_document(&doc("d2", "u2")).await.unwrap();

        let docs = store.list_documents("u1").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "d1");
    }

    #[tokio::test]
    async fn test_owner_isolation_in_search() {
        let (_tmp, store) = test_store().await;
        for (doc_id, owner) in [("d1", "u1"), ("d2", "u1"), ("d3", "u2"), ("d4", "u2")] {
            store.create_document(&doc(doc_id, owner)).await.unwrap();
            let chunks: Vec<EmbeddedChunk> = (0..3)
                .map(|i| {
                    embedded(
                        doc_id,
                        owner,
                        i,
                        &format!("{} chunk {}", doc_id, i),
                        vec![1.0, i as f32],
                    )
                })
                .collect();
            store.upsert_chunks(&chunks).await.unwrap();
        }

        // Requesting another owner's documents yields nothing of theirs.
        let results = store
            .search(&[1.0, 1.0], 20, &scope("u1", &["d1", "d2", "d3", "d4"]))
            .await
            .unwrap();
        assert!(!results.is_empty());
        for p in &results {
            assert!(p.document_id == "d1" || p.document_id == "d2");
        }

        // Same owner, single-document scope.
        let results = store
            .search(&[1.0, 1.0], 20, &scope("u1", &["d2"]))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        for p in &results {
            assert_eq!(p.document_id, "d2");
        }
    }

    #[tokio::test]
    async fn test_reingest_no_duplicates() {
        let (_tmp, store) = test_store().await;
        store.create_document(&doc("d1", "u1")).await.unwrap();

        let chunks: Vec<EmbeddedChunk> = (0..4)
            .map(|i| embedded("d1", "u1", i, &format!("chunk {}", i), vec![0.5, 0.5]))
            .collect();
        store.upsert_chunks(&chunks).await.unwrap();
        store.upsert_chunks(&chunks).await.unwrap();
        assert_eq!(store.chunk_count("d1").await.unwrap(), 4);

        let shorter: Vec<EmbeddedChunk> = (0..2)
            .map(|i| embedded("d1", "u1", i, &format!("rewritten {}", i), vec![0.5, 0.5]))
            .collect();
        store.upsert_chunks(&shorter).await.unwrap();
        assert_eq!(store.chunk_count("d1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_owner_mismatch() {
        let (_tmp, store) = test_store().await;
        store.create_document(&doc("d1", "u1")).await.unwrap();

        let err = store
            .upsert_chunks(&[embedded("d1", "u2", 0, "text", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
    }

    #[tokio::test]
    async fn test_empty_scope_fails_closed() {
        let (_tmp, store) = test_store().await;
        store.create_document(&doc("d1", "u1")).await.unwrap();
        store
            .upsert_chunks(&[embedded("d1", "u1", 0, "text", vec![1.0])])
            .await
            .unwrap();

        let results = store.search(&[1.0], 5, &scope("u1", &[])).await.unwrap();
        assert!(results.is_empty());

        let err = store.search(&[1.0], 5, &scope("", &["d1"])).await.unwrap_err();
        assert!(matches!(err, Error::ScopeViolation(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let (_tmp, store) = test_store().await;
        store.create_document(&doc("d1", "u1")).await.unwrap();
        store
            .upsert_chunks(&[embedded("d1", "u1", 0, "text", vec![1.0, 2.0, 3.0])])
            .await
            .unwrap();

        let err = store
            .search(&[1.0, 2.0], 5, &scope("u1", &["d1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
    }
}
