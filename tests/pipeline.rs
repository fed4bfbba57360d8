//! End-to-end pipeline tests: ingest into a real SQLite store, then chat
//! over it with mock embedding and chat providers.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docchat::answer::AnswerGenerator;
use docchat::config::{ChunkingConfig, Config, DbConfig, EmbeddingConfig, LlmConfig, RetrievalConfig};
use docchat::db;
use docchat::embedding::Embedder;
use docchat::error::{Error, Result};
use docchat::ingest::Ingestor;
use docchat::llm::{ChatModel, LlmMessage};
use docchat::migrate;
use docchat::models::{DocumentStatus, Role};
use docchat::rephrase::QueryRephraser;
use docchat::retriever::Retriever;
use docchat::session::{ChatPipeline, ChatSession, TurnState};
use docchat::store::{SqliteStore, VectorStore};

/// Embeds text as keyword-presence coordinates so similarity search is
/// deterministic: chunks about the query's topic always rank first.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        vec![
            if lower.contains("deadline") { 1.0 } else { 0.0 },
            if lower.contains("budget") { 1.0 } else { 0.0 },
            0.1,
        ]
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Echoes rephrase requests and answers generation requests with a fixed
/// grounded reply.
struct ScriptedModel;

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-test"
    }

    async fn complete(&self, messages: &[LlmMessage]) -> Result<String> {
        if messages.iter().any(|m| m.role == "system") {
            Ok("According to the documents, the deadline is March 15.".to_string())
        } else {
            // Rephrase request: the question precedes the final instruction
            // message; pass it through unchanged.
            Ok(messages
                .iter()
                .rev()
                .nth(1)
                .map(|m| m.content.clone())
                .unwrap_or_default())
        }
    }
}

struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    async fn complete(&self, _messages: &[LlmMessage]) -> Result<String> {
        Err(Error::LlmProvider("service unavailable".to_string()))
    }
}

fn test_config(dir: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: dir.path().join("docchat.db"),
        },
        chunking: ChunkingConfig {
            chunk_size: 120,
            chunk_overlap: 20,
        },
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        llm: LlmConfig::default(),
    }
}

async fn open_store(cfg: &Config) -> Arc<SqliteStore> {
    let pool = db::connect(&cfg.db).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

fn pipeline_with(
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    cfg: &Config,
) -> ChatPipeline {
    let retriever = Retriever::new(
        QueryRephraser::new(model.clone()),
        embedder,
        store,
        cfg.retrieval.top_k,
    );
    let generator = AnswerGenerator::new(model, cfg.llm.max_context_chars);
    ChatPipeline::new(retriever, generator)
}

const DOC_TEXT: &str = "The project deadline was moved to March 15 after the review. \
All deliverables must be submitted before the deadline.\n\n\
The budget for the quarter was increased by ten percent to cover the new hires. \
Travel spend remains capped.\n\n\
Office hours are Tuesdays and Thursdays in the main building.";

#[tokio::test]
async fn test_full_pipeline_answers_from_ingested_document() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir);
    let store = open_store(&cfg).await;

    let embedder = Arc::new(KeywordEmbedder::new());
    let ingestor = Ingestor::new(store.clone(), embedder.clone(), &cfg);
    let doc = ingestor.ingest_text("alice", "handbook", DOC_TEXT).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Ready);

    let pipeline = pipeline_with(store.clone(), embedder, Arc::new(ScriptedModel), &cfg);
    let mut session = ChatSession::new("alice");
    session
        .select_documents(store.as_ref(), HashSet::from([doc.id.clone()]))
        .await
        .unwrap();

    let reply = pipeline
        .run_turn(&mut session, "When is the deadline?")
        .await
        .unwrap();

    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.content.contains("March 15"));
    assert!(!reply.sources.is_empty());
    assert!(reply.sources.len() <= cfg.retrieval.top_k);
    for source in &reply.sources {
        assert_eq!(source.document_id, doc.id);
    }
    // Best-matching passage mentions the topic of the question.
    assert!(reply.sources[0].chunk_text.to_lowercase().contains("deadline"));
}

#[tokio::test]
async fn test_empty_selection_answers_without_retrieval() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir);
    let store = open_store(&cfg).await;

    let embedder = Arc::new(KeywordEmbedder::new());
    let pipeline = pipeline_with(
        store.clone(),
        embedder.clone(),
        Arc::new(ScriptedModel),
        &cfg,
    );

    let mut session = ChatSession::new("alice");
    let reply = pipeline
        .run_turn(&mut session, "When is the deadline?")
        .await
        .unwrap();

    assert!(reply.sources.is_empty());
    // No selection means no rephrase and no embedding call at all.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_llm_failure_leaves_session_consistent() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir);
    let store = open_store(&cfg).await;

    let embedder = Arc::new(KeywordEmbedder::new());
    let ingestor = Ingestor::new(store.clone(), embedder.clone(), &cfg);
    let doc = ingestor.ingest_text("alice", "handbook", DOC_TEXT).await.unwrap();

    let pipeline = pipeline_with(store.clone(), embedder, Arc::new(FailingModel), &cfg);
    let mut session = ChatSession::new("alice");
    session
        .select_documents(store.as_ref(), HashSet::from([doc.id]))
        .await
        .unwrap();

    let err = pipeline
        .run_turn(&mut session, "When is the deadline?")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LlmProvider(_)));

    assert_eq!(session.state(), TurnState::Idle);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history()[0].role, Role::User);

    // The session accepts a new turn after the failure.
    let err = pipeline.run_turn(&mut session, "retry").await.unwrap_err();
    assert!(matches!(err, Error::LlmProvider(_)));
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_users_cannot_select_each_others_documents() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir);
    let store = open_store(&cfg).await;

    let embedder = Arc::new(KeywordEmbedder::new());
    let ingestor = Ingestor::new(store.clone(), embedder.clone(), &cfg);
    let alice_doc = ingestor
        .ingest_text("alice", "alice-notes", "the deadline for alice is March 15")
        .await
        .unwrap();
    let bob_doc = ingestor
        .ingest_text("bob", "bob-notes", "the deadline for bob is April 1")
        .await
        .unwrap();

    // Bob cannot put alice's document in scope even knowing its id.
    let mut bob_session = ChatSession::new("bob");
    let err = bob_session
        .select_documents(store.as_ref(), HashSet::from([alice_doc.id.clone()]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ScopeViolation(_)));

    // Alice's retrieval never surfaces bob's chunks.
    let pipeline = pipeline_with(
        store.clone(),
        embedder,
        Arc::new(ScriptedModel),
        &cfg,
    );
    let mut alice_session = ChatSession::new("alice");
    alice_session
        .select_documents(store.as_ref(), HashSet::from([alice_doc.id.clone()]))
        .await
        .unwrap();
    let reply = pipeline
        .run_turn(&mut alice_session, "When is the deadline?")
        .await
        .unwrap();
    for source in &reply.sources {
        assert_eq!(source.document_id, alice_doc.id);
        assert_ne!(source.document_id, bob_doc.id);
    }
}

#[tokio::test]
async fn test_processing_document_not_selectable_until_ready() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir);
    let store = open_store(&cfg).await;

    let doc = docchat::models::Document {
        id: "pending-doc".to_string(),
        owner_user_id: "alice".to_string(),
        source_path: "big.pdf".to_string(),
        status: DocumentStatus::Processing,
        created_at: 0,
    };
    store.create_document(&doc).await.unwrap();

    let mut session = ChatSession::new("alice");
    let err = session
        .select_documents(store.as_ref(), HashSet::from(["pending-doc".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DocumentNotReady(_)));

    store
        .set_document_status("pending-doc", DocumentStatus::Ready)
        .await
        .unwrap();
    session
        .select_documents(store.as_ref(), HashSet::from(["pending-doc".to_string()]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_file_ingestion_is_visible_and_isolated() {
    let dir = TempDir::new().unwrap();
    let cfg = test_config(&dir);
    let store = open_store(&cfg).await;

    let good = dir.path().join("good.txt");
    let bad = dir.path().join("bad.bin");
    std::fs::write(&good, "the deadline is March 15").unwrap();
    std::fs::write(&bad, [0u8, 1, 2, 3]).unwrap();

    let embedder = Arc::new(KeywordEmbedder::new());
    let ingestor = Ingestor::new(store.clone(), embedder, &cfg);
    let outcomes = ingestor
        .ingest_files("alice", &[PathBuf::from(&good), PathBuf::from(&bad)])
        .await;

    assert!(outcomes[0].1.is_ok());
    assert!(outcomes[1].1.is_err());

    let docs = store.list_documents("alice").await.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().any(|d| d.status == DocumentStatus::Ready));
    assert!(docs.iter().any(|d| d.status == DocumentStatus::Error));
}
