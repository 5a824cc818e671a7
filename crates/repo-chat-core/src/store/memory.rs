//! In-memory [`VectorStore`] implementation for tests and embedding into
//! other processes.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Search is brute-force over all
//! stored vectors that pass the filter.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Chunk, EmbeddedChunk, ScoredChunk};
use crate::retrieval::DistanceMetric;

use super::{rank_candidates, MetadataFilter, VectorStore};

/// In-memory store.
pub struct InMemoryStore {
    chunks: RwLock<Vec<EmbeddedChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every stored chunk, in insertion order.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        match self.chunks.read() {
            Ok(guard) => guard.iter().map(|c| c.chunk.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        stored.extend_from_slice(chunks);
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        filter: &MetadataFilter,
        fetch_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let candidates: Vec<(Chunk, Vec<f32>)> = stored
            .iter()
            .filter(|ec| filter.matches(&ec.chunk))
            .map(|ec| (ec.chunk.clone(), ec.vector.clone()))
            .collect();
        Ok(rank_candidates(query_vec, candidates, fetch_k, metric))
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(stored.iter().filter(|ec| filter.matches(&ec.chunk)).count())
    }
}
