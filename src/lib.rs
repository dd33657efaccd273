//! # mmrag
//!
//! A local-first multimodal ingestion and retrieval pipeline.
//!
//! mmrag chunks text, image and audio files, embeds every chunk with a
//! modality-specific model, and stores the vectors in one collection per
//! modality. Queries are answered within a single modality.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │    Files     │──▶│   Chunkers   │──▶│  Embedders   │──▶│  SQLite  │
//! │ txt/img/wav  │   │ text/img/aud │   │ local / http │   │ 3 colls  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └────┬─────┘
//!                                                                │
//!                                   ┌────────────────────────────┘
//!                                   ▼
//!                            ┌─────────────┐
//!                            │  Retriever  │◀── query (one modality)
//!                            └─────────────┘
//! ```
//!
//! Modality types, the text splitter, the [`Embedder`](mmrag_core::embedding::Embedder)
//! trait and the [`VectorStore`](mmrag_core::store::VectorStore) contract
//! live in the `mmrag-core` crate; this crate supplies the concrete
//! backends, both pipelines and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! mmrag init                            # create the store and collections
//! mmrag ingest ./data/raw               # chunk, embed, store
//! mmrag query --text "bridge history"   # ranked text chunks
//! mmrag stats                           # record counts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`chunker`] | Text, image and audio chunkers |
//! | [`embedding`] | Embedder backends (fastembed, Ollama, HTTP) |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Retrieval pipeline |
//! | [`progress`] | Ingestion progress sinks |
//! | [`services`] | Store, embedder and collection wiring |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod ingest_cmd;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod query;
pub mod reset;
pub mod retrieve;
pub mod services;
pub mod sqlite_store;
pub mod stats;
