//! # DocChat CLI (`docchat`)
//!
//! The `docchat` binary is the primary interface for DocChat. It provides
//! commands for database initialization, document ingestion, and asking
//! questions over a user's selected documents.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat ingest <files>` | Chunk, embed, and store documents for a user |
//! | `docchat docs` | List a user's documents and their status |
//! | `docchat ask "<q>"` | Ask a single question over selected documents |
//! | `docchat chat` | Interactive chat session over selected documents |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! docchat init
//!
//! # Ingest a report for alice
//! docchat ingest report.pdf notes.md --user alice
//!
//! # See what alice has (and whether ingestion finished)
//! docchat docs --user alice
//!
//! # One-shot question scoped to two documents
//! docchat ask "what changed in Q3?" --user alice --docs <id1> --docs <id2>
//!
//! # Interactive session
//! docchat chat --user alice --docs <id1>
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use docchat::answer::AnswerGenerator;
use docchat::config::{self, Config};
use docchat::db;
use docchat::embedding::{self, Embedder};
use docchat::ingest::Ingestor;
use docchat::llm::{self, ChatModel};
use docchat::migrate;
use docchat::models::{Document, Passage};
use docchat::rephrase::QueryRephraser;
use docchat::retriever::Retriever;
use docchat::session::{ChatPipeline, ChatSession};
use docchat::store::{SqliteStore, VectorStore};

/// DocChat CLI — document question answering with per-user isolation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "DocChat — ask questions over your own documents",
    version,
    long_about = "DocChat ingests a user's documents (plain text, Markdown, PDF), embeds them \
    into a SQLite-backed vector store, and answers questions grounded in a selected subset of \
    those documents. Retrieval is always scoped to the owning user."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents and chunks
    /// tables. Idempotent — running it multiple times is safe.
    Init,

    /// Ingest one or more files for a user.
    ///
    /// Each file is extracted, chunked, embedded, and stored. Files are
    /// processed concurrently and one failure never aborts the rest;
    /// failed documents stay listed with an `error` status.
    Ingest {
        /// Files to ingest (`.txt`, `.md`, `.pdf`, ...).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Owner of the ingested documents.
        #[arg(long)]
        user: String,
    },

    /// List a user's documents and their ingestion status.
    Docs {
        /// User whose documents to list.
        #[arg(long)]
        user: String,
    },

    /// Ask a single question over a selection of documents.
    ///
    /// Retrieval is scoped to the given user and document ids; with no
    /// `--docs` the answer is generated without any document context.
    Ask {
        /// The question to ask.
        question: String,

        /// User asking the question.
        #[arg(long)]
        user: String,

        /// Document ids to search (repeatable). Only `ready` documents
        /// owned by the user are accepted.
        #[arg(long = "docs")]
        docs: Vec<String>,
    },

    /// Start an interactive chat session over a selection of documents.
    ///
    /// Follow-up questions are rephrased against the conversation so far
    /// before retrieval. Type `exit` or press Ctrl-D to leave.
    Chat {
        /// User who owns the session.
        #[arg(long)]
        user: String,

        /// Document ids to search (repeatable).
        #[arg(long = "docs")]
        docs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { files, user } => {
            run_ingest(&cfg, &user, files).await?;
        }
        Commands::Docs { user } => {
            run_docs(&cfg, &user).await?;
        }
        Commands::Ask {
            question,
            user,
            docs,
        } => {
            run_ask(&cfg, &user, docs, &question).await?;
        }
        Commands::Chat { user, docs } => {
            run_chat(&cfg, &user, docs).await?;
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let pool = db::connect(&cfg.db).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn run_ingest(cfg: &Config, user: &str, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let store = open_store(cfg).await?;
    let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_embedder(&cfg.embedding)?);
    let ingestor = Ingestor::new(store, embedder, cfg);

    let outcomes = ingestor.ingest_files(user, &files).await;

    let mut ok = 0usize;
    let mut failed = 0usize;
    for (path, result) in &outcomes {
        match result {
            Ok(doc) => {
                ok += 1;
                println!("  {}  {}", doc.id, path.display());
            }
            Err(e) => {
                failed += 1;
                println!("  FAILED  {}: {}", path.display(), e);
            }
        }
    }
    println!("ingested {} of {} files ({} failed)", ok, outcomes.len(), failed);
    Ok(())
}

async fn run_docs(cfg: &Config, user: &str) -> anyhow::Result<()> {
    let store = open_store(cfg).await?;
    let docs = store.list_documents(user).await?;

    if docs.is_empty() {
        println!("no documents for user {}", user);
        return Ok(());
    }

    for doc in &docs {
        println!("{}", format_document(doc));
    }
    println!("{} document(s)", docs.len());
    Ok(())
}

fn format_document(doc: &Document) -> String {
    let created = chrono::DateTime::from_timestamp(doc.created_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| doc.created_at.to_string());
    format!(
        "{}  {:<10}  {}  {}",
        doc.id,
        doc.status.as_str(),
        created,
        doc.source_path
    )
}

fn build_pipeline(cfg: &Config, store: Arc<SqliteStore>) -> anyhow::Result<ChatPipeline> {
    let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_embedder(&cfg.embedding)?);
    let model: Arc<dyn ChatModel> = Arc::from(llm::create_chat_model(&cfg.llm)?);

    let retriever = Retriever::new(
        QueryRephraser::new(model.clone()),
        embedder,
        store,
        cfg.retrieval.top_k,
    );
    let generator = AnswerGenerator::new(model, cfg.llm.max_context_chars);
    Ok(ChatPipeline::new(retriever, generator))
}

fn print_sources(sources: &[Passage]) {
    if sources.is_empty() {
        return;
    }
    println!("\nsources:");
    for p in sources {
        let preview: String = p.chunk_text.chars().take(80).collect();
        println!(
            "  [{} #{}] ({:.3}) {}",
            p.document_id, p.chunk_index, p.similarity, preview
        );
    }
}

async fn run_ask(cfg: &Config, user: &str, docs: Vec<String>, question: &str) -> anyhow::Result<()> {
    let store = open_store(cfg).await?;
    let pipeline = build_pipeline(cfg, store.clone())?;

    let mut session = ChatSession::new(user);
    let selection: HashSet<String> = docs.into_iter().collect();
    session
        .select_documents(store.as_ref() as &dyn VectorStore, selection)
        .await?;

    let reply = pipeline.run_turn(&mut session, question).await?;
    println!("{}", reply.content);
    print_sources(&reply.sources);
    Ok(())
}

async fn run_chat(cfg: &Config, user: &str, docs: Vec<String>) -> anyhow::Result<()> {
    let store = open_store(cfg).await?;
    let pipeline = build_pipeline(cfg, store.clone())?;

    let mut session = ChatSession::new(user);
    let selection: HashSet<String> = docs.into_iter().collect();
    session
        .select_documents(store.as_ref() as &dyn VectorStore, selection)
        .await?;

    println!(
        "chatting as {} over {} document(s); type 'exit' to quit",
        user,
        session.selected_document_ids().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match pipeline.run_turn(&mut session, question).await {
            Ok(reply) => {
                println!("{}", reply.content);
                print_sources(&reply.sources);
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                println!("sorry, I couldn't answer that; please try again.");
            }
        }
    }

    Ok(())
}
