//! # DocChat
//!
//! A document question-answering service with strict per-user isolation.
//!
//! DocChat ingests a user's documents (plain text, Markdown, PDF), chunks
//! and embeds them into a SQLite-backed vector store, and answers
//! questions over a selected subset of those documents through a
//! rephrase → retrieve → generate chat pipeline. Retrieval is always
//! scoped to the owning user and an explicit document selection; one
//! user's content can never surface in another user's answers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │  Files    │──▶│   Pipeline   │──▶│  SQLite  │
//! │ txt/md/pdf│   │ Chunk+Embed  │   │ vectors  │
//! └───────────┘   └──────────────┘   └────┬─────┘
//!                                         │ scoped search
//!                 ┌──────────┐   ┌────────┴────────┐
//!                 │   CLI    │──▶│  Chat pipeline  │
//!                 │ (docchat)│   │ rephrase→answer │
//!                 └──────────┘   └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat init                               # create database
//! docchat ingest report.pdf notes.md --user alice
//! docchat docs --user alice                  # list documents + status
//! docchat ask "when is the deadline?" --user alice --docs <id>
//! docchat chat --user alice --docs <id>      # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | File-to-text extraction |
//! | [`chunker`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Scoped vector store (in-memory + SQLite) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`llm`] | Chat completion provider abstraction |
//! | [`rephrase`] | History-aware query rewriting |
//! | [`retriever`] | Scoped similarity retrieval |
//! | [`answer`] | Grounded answer generation |
//! | [`session`] | Chat session state and turn orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod rephrase;
pub mod retriever;
pub mod session;
pub mod store;
