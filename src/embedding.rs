//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are not configured.
//! - **[`HuggingFaceEmbedder`]** — calls the Hugging Face Inference API
//!   feature-extraction endpoint with batching, retry, and backoff.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`] — decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! Transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! A batch either succeeds whole or fails whole; no partial vectors are
//! ever returned to the caller.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const HF_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction";

/// Trait for embedding providers.
///
/// `embed` is order-preserving: one vector per input text, in input order.
/// `embed_query` exists as a distinct call site for single short queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed(&[text.to_string()]).await?;
        if results.len() != 1 {
            return Err(Error::EmbeddingProvider(
                "expected exactly one query vector".to_string(),
            ));
        }
        Ok(results.remove(0))
    }
}

/// A no-op embedder that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::EmbeddingProvider(
            "embedding provider is disabled".to_string(),
        ))
    }
}

/// Embedding provider backed by the Hugging Face Inference API.
///
/// Sends texts to `POST {base}/{model}` in batches of `batch_size`.
/// Requires the `HUGGINGFACE_API_KEY` environment variable.
pub struct HuggingFaceEmbedder {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl HuggingFaceEmbedder {
    /// Create a provider from configuration.
    ///
    /// Fails if the API key is missing from the environment so that
    /// misconfiguration surfaces at startup, not mid-ingestion.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("HUGGINGFACE_API_KEY")
            .map_err(|_| Error::Config("HUGGINGFACE_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::EmbeddingProvider(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            api_key,
            client,
            base_url: HF_INFERENCE_BASE.to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/{}", self.base_url, self.model);
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::EmbeddingProvider(e.to_string()))?;
                        return self.parse_response(&json, texts.len());
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::EmbeddingProvider(format!(
                            "HF API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Other client errors: don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::EmbeddingProvider(format!(
                        "HF API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::EmbeddingProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::EmbeddingProvider("embedding failed after retries".into())))
    }

    /// Parse the feature-extraction response: an array of float arrays,
    /// one per input, each of the configured dimensionality.
    fn parse_response(&self, json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
        let rows = json
            .as_array()
            .ok_or_else(|| Error::EmbeddingProvider("invalid HF response: not an array".into()))?;

        if rows.len() != expected {
            return Err(Error::EmbeddingProvider(format!(
                "invalid HF response: expected {} vectors, got {}",
                expected,
                rows.len()
            )));
        }

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let values = row.as_array().ok_or_else(|| {
                Error::EmbeddingProvider("invalid HF response: row is not an array".into())
            })?;
            let vec: Vec<f32> = values
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| Error::EmbeddingProvider("non-numeric embedding value".into()))
                })
                .collect::<Result<_>>()?;
            if vec.len() != self.dims {
                return Err(Error::EmbeddingProvider(format!(
                    "embedding dimensionality mismatch: expected {}, got {}",
                    self.dims,
                    vec.len()
                )));
            }
            vectors.push(vec);
        }

        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.embed_batch(batch).await?;
            all.extend(vectors);
        }
        Ok(all)
    }
}

/// Create the appropriate [`Embedder`] based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "huggingface" => Ok(Box::new(HuggingFaceEmbedder::new(config)?)),
        other => Err(Error::Config(format!("unknown embedding provider: {}", other))),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Callers are responsible for rejecting vectors of mismatched
/// dimensionality before comparing; see
/// [`VectorStore::search`](crate::store::VectorStore::search).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip_preserves_query_vector() {
        // Values in the range a sentence-transformer actually emits.
        let vec: Vec<f32> = (0..384).map(|i| ((i as f32) - 192.0) * 0.0042).collect();
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 384 * 4);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_blob_of_empty_vector_is_empty() {
        assert!(vec_to_blob(&[]).is_empty());
        assert!(blob_to_vec(&[]).is_empty());
    }

    #[test]
    fn test_cosine_is_magnitude_invariant() {
        let a = vec![0.2, -0.7, 0.4];
        let scaled: Vec<f32> = a.iter().map(|x| x * 9.5).collect();
        assert!((cosine_similarity(&a, &scaled) - 1.0).abs() < 1e-5);
        let flipped: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &flipped) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_unrelated_directions_score_zero() {
        let sim = cosine_similarity(&[0.0, 0.0, 0.6, 0.0], &[0.0, 0.3, 0.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs_score_zero() {
        // Mismatched lengths and zero vectors are the store's job to
        // reject; the utility itself stays total.
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_embedder_errors() {
        let e = DisabledEmbedder;
        let err = e.embed(&["hi".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingProvider(_)));
    }
}
