//! # repo-chat
//!
//! Ingest a remote source repository into a shared vector index and chat
//! with it through retrieval-augmented generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │  Fetch   │──▶│ Estimate │──▶│  Ingest   │──▶│  SQLite  │
//! │ zip/HTTP │   │ tiktoken │   │chunk+embed│   │  chunks  │
//! └──────────┘   └──────────┘   └─────┬─────┘   └────┬─────┘
//!                                     ▼              │
//!                               ┌──────────┐   ┌─────▼─────┐
//!                               │ Registry │   │  Session  │
//!                               │   JSON   │   │ MMR+chain │
//!                               └──────────┘   └───────────┘
//! ```
//!
//! Every chunk carries the name of its repository; retrieval filters on
//! that name, which is the only thing separating repositories in the
//! shared store.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`fetch`] | Default branch resolution, archive download, extraction |
//! | [`source_files`] | Allow-listed file discovery and decoding |
//! | [`cost`] | Token counting and cost estimate |
//! | [`ingest`] | Chunking, embedding, and batch commit |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`embedding`] | OpenAI embeddings |
//! | [`llm`] | Chat model trait and OpenAI chat completions |
//! | [`chain`] | Conversational retrieval chain |
//! | [`session`] | Repository binding and chat history |
//! | [`registry`] | Registered repository names |
//! | [`workflow`] | Add-repository flow |
//! | [`chat_cmd`] | Interactive chat and one-shot questions |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod chain;
pub mod chat_cmd;
pub mod config;
pub mod cost;
pub mod db;
pub mod embedding;
pub mod fetch;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod prompt;
pub mod registry;
pub mod session;
pub mod source_files;
pub mod sqlite_store;
pub mod workflow;
