//! # repo-chat core
//!
//! Shared logic for repo-chat: data models, character chunking, text
//! decoding with encoding fallback, the embedding cost formula, the
//! vector store abstraction, and max-marginal-relevance retrieval.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem code. The
//! `repo-chat` app crate supplies the I/O-bound pieces (SQLite store,
//! OpenAI providers, repository fetcher) on top of these types.

pub mod chunk;
pub mod cost;
pub mod decode;
pub mod embedding;
pub mod models;
pub mod retrieval;
pub mod store;
