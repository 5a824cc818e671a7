//! Fixed-size character chunker.
//!
//! Splits one source file's text into [`Chunk`]s of at most `chunk_size`
//! characters. Adjacent chunks share `overlap` characters (0 by default).
//! Sizes count Unicode scalar values, not bytes, so multi-byte text is never
//! cut inside a character.
//!
//! Each chunk gets a random UUID, a SHA-256 hash of its text, and the
//! repository tag it will be filtered on at query time. A call only ever sees
//! one file, so chunks never span file boundaries.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, ChunkMetadata};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between adjacent chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 0;

/// Split `text` into character windows.
///
/// Window `i` starts at `i * (chunk_size - overlap)`. The last window may be
/// shorter. Empty text yields no windows. An `overlap >= chunk_size` still
/// advances one character per window.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<&str> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let step = chunk_size.saturating_sub(overlap).max(1);

    // Byte offset of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = bounds.len();
    bounds.push(text.len());

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(char_count);
        pieces.push(&text[bounds[start]..bounds[end]]);
        if end == char_count {
            break;
        }
        start += step;
    }
    pieces
}

/// Split one file's text into tagged chunks with contiguous indices from 0.
pub fn chunk_file(
    repo: &str,
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(repo, source, i as i64, piece))
        .collect()
}

fn make_chunk(repo: &str, source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        metadata: ChunkMetadata {
            repo: repo.to_string(),
            source: source.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_file("repo", "a.md", "Hello, world!", 1000, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].metadata.repo, "repo");
        assert_eq!(chunks[0].metadata.source, "a.md");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_file("repo", "empty.py", "", 1000, 0).is_empty());
    }

    #[test]
    fn test_1500_chars_two_chunks() {
        let text = "x".repeat(1500);
        let chunks = chunk_file("repo", "a.py", &text, 1000, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[1].text.len(), 500);
    }

    #[test]
    fn test_exact_multiple() {
        let text = "y".repeat(2000);
        assert_eq!(split_text(&text, 1000, 0).len(), 2);
    }

    #[test]
    fn test_overlap_shares_characters() {
        let pieces = split_text("abcdefghij", 4, 2);
        assert_eq!(pieces, vec!["abcd", "cdef", "efgh", "ghij"]);
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let text = "é".repeat(5);
        let pieces = split_text(&text, 2, 0);
        assert_eq!(pieces, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_no_text_lost_without_overlap() {
        let text = (0..300)
            .map(|i| format!("line {}\n", i))
            .collect::<String>();
        let joined: String = split_text(&text, 97, 0).concat();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = "z".repeat(4321);
        let chunks = chunk_file("repo", "big.rs", &text, 1000, 0);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let c1 = chunk_file("repo", "f", "Alpha Beta", 4, 0);
        let c2 = chunk_file("repo", "f", "Alpha Beta", 4, 0);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_ne!(a.id, b.id);
        }
    }
}
