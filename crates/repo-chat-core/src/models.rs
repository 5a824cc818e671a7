//! Core data models shared by ingestion, storage, and retrieval.
//!
//! A [`Chunk`] is a bounded span of a single source file, tagged with the
//! repository it belongs to. The repository tag in [`ChunkMetadata`] is the
//! only thing that scopes retrieval to one repository inside a shared store.

use serde::{Deserialize, Serialize};

/// Metadata attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the owning repository. Used as the retrieval filter.
    pub repo: String,
    /// Path of the source file, relative to the repository root.
    pub source: String,
}

/// A chunk of a source file's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// Position of this chunk within its source file, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// A chunk paired with its embedding vector, ready to commit to a store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A stored chunk returned by a similarity search.
///
/// Carries the stored vector so callers can re-rank candidates
/// (max-marginal-relevance) without another store round-trip.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Similarity to the query; higher is closer for every metric.
    pub score: f32,
}

/// One completed question/answer exchange in a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// A single line of a rendered chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub message: String,
    pub is_user: bool,
}

/// Flatten turns into display order: question, answer, question, answer...
pub fn transcript(turns: &[ChatTurn]) -> Vec<TranscriptEntry> {
    turns
        .iter()
        .flat_map(|t| {
            [
                TranscriptEntry {
                    message: t.question.clone(),
                    is_user: true,
                },
                TranscriptEntry {
                    message: t.answer.clone(),
                    is_user: false,
                },
            ]
        })
        .collect()
}
