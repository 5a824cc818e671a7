//! SQLite-backed [`VectorStore`] implementation.
//!
//! Chunks live in a single `chunks` table with the embedding stored as a
//! little-endian `f32` BLOB. The repository filter is applied in SQL; the
//! matching rows are then scored and ranked in process.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use repo_chat_core::embedding::{blob_to_vec, vec_to_blob};
use repo_chat_core::models::{Chunk, ChunkMetadata, EmbeddedChunk, ScoredChunk};
use repo_chat_core::retrieval::DistanceMetric;
use repo_chat_core::store::{rank_candidates, MetadataFilter, VectorStore};

use crate::db;
use crate::migrate;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `db_path` and bring the schema up to date.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add(&self, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for item in chunks {
            let chunk = &item.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, repo, source, chunk_index, text, hash, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.metadata.repo)
            .bind(&chunk.metadata.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&item.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        filter: &MetadataFilter,
        fetch_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, repo, source, chunk_index, text, hash, embedding FROM chunks WHERE repo = ?",
        )
        .bind(&filter.repo)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk = Chunk {
                    id: row.get("id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                    metadata: ChunkMetadata {
                        repo: row.get("repo"),
                        source: row.get("source"),
                    },
                };
                (chunk, blob_to_vec(&blob))
            })
            .collect();

        Ok(rank_candidates(query_vec, candidates, fetch_k, metric))
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE repo = ?")
            .bind(&filter.repo)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
