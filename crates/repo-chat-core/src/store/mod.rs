//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the contract between ingestion, which
//! commits embedded chunks, and retrieval, which searches them. One store
//! is shared by every repository; a [`MetadataFilter`] on the `repo` tag
//! keeps searches scoped.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, EmbeddedChunk, ScoredChunk};
use crate::retrieval::DistanceMetric;

/// Metadata equality filter. A chunk matches when its `repo` tag equals
/// `repo` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub repo: String,
}

impl MetadataFilter {
    pub fn repo(name: &str) -> Self {
        Self {
            repo: name.to_string(),
        }
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.metadata.repo == self.repo
    }
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Commit a batch of embedded chunks |
/// | [`search`](VectorStore::search) | Filtered similarity search |
/// | [`count`](VectorStore::count) | Count chunks matching a filter |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Commit a batch of chunks. Either every chunk is stored or none is.
    ///
    /// Returns the number of chunks committed.
    async fn add(&self, chunks: &[EmbeddedChunk]) -> Result<usize>;

    /// Return up to `fetch_k` chunks matching `filter`, best first.
    async fn search(
        &self,
        query_vec: &[f32],
        filter: &MetadataFilter,
        fetch_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks matching `filter`.
    async fn count(&self, filter: &MetadataFilter) -> Result<usize>;
}

/// Score every candidate against the query, sort best first, and keep
/// `fetch_k`. Shared by stores that rank in process.
pub fn rank_candidates(
    query_vec: &[f32],
    candidates: Vec<(Chunk, Vec<f32>)>,
    fetch_k: usize,
    metric: DistanceMetric,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|(chunk, vector)| {
            let score = metric.score(query_vec, &vector);
            ScoredChunk {
                chunk,
                vector,
                score,
            }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(fetch_k);
    scored
}
