//! Repository-scoped retrieval with max-marginal-relevance re-ranking.
//!
//! # Algorithm
//!
//! 1. Embed the query.
//! 2. Fetch `candidate_pool_size` candidates from the store, restricted to
//!    chunks tagged with `repo_filter` and ranked by `distance_metric`.
//! 3. If `use_mmr`, greedily pick `result_count` candidates maximizing
//!    `λ × sim(query, c) − (1 − λ) × max sim(c, picked)`.
//!    Otherwise keep the top `result_count` candidates.
//!
//! The repository filter is the only isolation between repositories that
//! share one physical store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, embed_query, l2_distance, Embedder};
use crate::models::ScoredChunk;
use crate::store::{MetadataFilter, VectorStore};

pub const DEFAULT_FETCH_K: usize = 100;
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;

/// Distance metric used to rank candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    #[default]
    #[serde(rename = "cos")]
    Cosine,
    #[serde(rename = "l2")]
    L2,
}

impl DistanceMetric {
    /// Similarity score where higher always means closer.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(query, candidate),
            DistanceMetric::L2 => -l2_distance(query, candidate),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => f.write_str("cos"),
            DistanceMetric::L2 => f.write_str("l2"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cos" | "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "L2" => Ok(DistanceMetric::L2),
            other => Err(format!("unknown distance metric '{}'. Use cos or l2.", other)),
        }
    }
}

/// Typed retriever parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    pub distance_metric: DistanceMetric,
    /// Candidates fetched from the store before re-ranking (`fetch_k`).
    pub candidate_pool_size: usize,
    pub use_mmr: bool,
    /// Final number of chunks returned (`k`).
    pub result_count: usize,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 is pure diversity.
    pub mmr_lambda: f32,
    /// Repository tag every returned chunk must carry.
    pub repo_filter: String,
}

impl RetrieverConfig {
    /// Defaults: cosine, 100 candidates, MMR on, 10 results.
    pub fn for_repo(repo: &str) -> Self {
        Self {
            distance_metric: DistanceMetric::Cosine,
            candidate_pool_size: DEFAULT_FETCH_K,
            use_mmr: true,
            result_count: DEFAULT_K,
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            repo_filter: repo.to_string(),
        }
    }
}

/// A query interface over a shared store, scoped to one repository.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn repo(&self) -> &str {
        &self.config.repo_filter
    }

    /// Return up to `result_count` chunks relevant to `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let filter = MetadataFilter::repo(&self.config.repo_filter);
        let candidates = self
            .store
            .search(
                &query_vec,
                &filter,
                self.config.candidate_pool_size,
                self.config.distance_metric,
            )
            .await?;

        if self.config.use_mmr {
            Ok(maximal_marginal_relevance(
                &query_vec,
                candidates,
                self.config.result_count,
                self.config.mmr_lambda,
            ))
        } else {
            let mut top = candidates;
            top.truncate(self.config.result_count);
            Ok(top)
        }
    }
}

/// Greedy max-marginal-relevance selection of `k` candidates.
///
/// Relevance and redundancy are both measured with cosine similarity.
/// Returns candidates in selection order.
pub fn maximal_marginal_relevance(
    query_vec: &[f32],
    candidates: Vec<ScoredChunk>,
    k: usize,
    lambda: f32,
) -> Vec<ScoredChunk> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query_vec, &c.vector))
        .collect();

    let mut picked: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while picked.len() < k && !remaining.is_empty() {
        let mut best_pos = 0usize;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = picked
                .iter()
                .map(|&p| cosine_similarity(&candidates[idx].vector, &candidates[p].vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if picked.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        picked.push(remaining.remove(best_pos));
    }

    let mut slots: Vec<Option<ScoredChunk>> = candidates.into_iter().map(Some).collect();
    picked
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};

    fn candidate(id: &str, vector: Vec<f32>) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                chunk_index: 0,
                text: id.to_string(),
                hash: String::new(),
                metadata: ChunkMetadata {
                    repo: "r".to_string(),
                    source: "f".to_string(),
                },
            },
            vector,
            score: 0.0,
        }
    }

    fn ids(chunks: &[ScoredChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_mmr_empty() {
        assert!(maximal_marginal_relevance(&[1.0, 0.0], Vec::new(), 3, 0.5).is_empty());
    }

    #[test]
    fn test_mmr_first_pick_is_most_relevant() {
        let cands = vec![
            candidate("far", vec![0.0, 1.0]),
            candidate("near", vec![1.0, 0.0]),
        ];
        let out = maximal_marginal_relevance(&[1.0, 0.0], cands, 1, 0.5);
        assert_eq!(ids(&out), vec!["near"]);
    }

    #[test]
    fn test_mmr_prefers_diverse_second_pick() {
        // "dup" is nearly identical to "a"; "b" is less relevant but different.
        let cands = vec![
            candidate("a", vec![1.0, 0.1]),
            candidate("dup", vec![1.0, 0.05]),
            candidate("b", vec![1.0, 1.0]),
        ];
        let out = maximal_marginal_relevance(&[1.0, 0.2], cands, 2, 0.5);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_mmr_lambda_one_is_pure_relevance() {
        let cands = vec![
            candidate("a", vec![1.0, 0.1]),
            candidate("dup", vec![1.0, 0.05]),
            candidate("b", vec![1.0, 1.0]),
        ];
        let out = maximal_marginal_relevance(&[1.0, 0.2], cands, 2, 1.0);
        assert_eq!(ids(&out), vec!["a", "dup"]);
    }

    #[test]
    fn test_mmr_k_larger_than_pool() {
        let cands = vec![candidate("a", vec![1.0]), candidate("b", vec![0.5])];
        assert_eq!(maximal_marginal_relevance(&[1.0], cands, 10, 0.5).len(), 2);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("cos".parse::<DistanceMetric>(), Ok(DistanceMetric::Cosine));
        assert_eq!("l2".parse::<DistanceMetric>(), Ok(DistanceMetric::L2));
        assert!("max".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_l2_score_orders_closer_higher() {
        let near = DistanceMetric::L2.score(&[0.0, 0.0], &[1.0, 0.0]);
        let far = DistanceMetric::L2.score(&[0.0, 0.0], &[5.0, 0.0]);
        assert!(near > far);
    }
}
