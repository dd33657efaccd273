//! # mmrag core
//!
//! Shared logic for mmrag: the modality model, chunk and payload types,
//! the recursive text splitter, the embedder trait with vector helpers,
//! and the vector store abstraction with an in-memory backend.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or model runtimes.
//! Concrete chunkers, embedders, and the SQLite store live in the `mmrag`
//! application crate.

pub mod embedding;
pub mod models;
pub mod splitter;
pub mod store;
