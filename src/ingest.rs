//! Directory ingestion: files → chunks → embeddings → vector store.
//!
//! Walks the directory with the extension allow-list, decodes each file
//! with the encoding fallback list, splits it into character chunks tagged
//! with the repository name, embeds every chunk, and commits them all with
//! a single [`VectorStore::add`] call.
//!
//! A file or directory that cannot be read is logged and skipped. Embedding or commit
//! failures abort the whole ingestion before anything is stored.

use std::path::Path;

use anyhow::{bail, Result};

use repo_chat_core::chunk::chunk_file;
use repo_chat_core::embedding::Embedder;
use repo_chat_core::models::{Chunk, EmbeddedChunk};
use repo_chat_core::store::VectorStore;

use crate::app::App;
use crate::config::IngestConfig;
use crate::source_files::{build_allowlist, load_text, matching_files, FileLoadError};
use crate::workflow::commit_repository;

#[derive(Debug)]
pub struct IngestReport {
    pub repo: String,
    pub files_matched: usize,
    /// `(relative path, chunk count)` for every loaded file, in walk order.
    pub files_loaded: Vec<(String, usize)>,
    pub skipped: Vec<FileLoadError>,
    pub chunks_committed: usize,
}

impl IngestReport {
    pub fn print(&self) {
        println!("ingest {}", self.repo);
        println!("  files matched: {}", self.files_matched);
        println!("  files loaded: {}", self.files_loaded.len());
        if !self.skipped.is_empty() {
            println!("  files skipped: {}", self.skipped.len());
            for err in &self.skipped {
                println!("    {}", err);
            }
        }
        println!("  chunks committed: {}", self.chunks_committed);
    }
}

/// Ingest every allow-listed file under `local_path` as repository `repo`.
pub async fn ingest(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    config: &IngestConfig,
    repo: &str,
    local_path: &Path,
) -> Result<IngestReport> {
    if !local_path.is_dir() {
        bail!("Not a directory: {}", local_path.display());
    }

    let allowlist = build_allowlist(&config.extensions)?;
    let encodings = config.encoding_list()?;
    let walk = matching_files(local_path, &allowlist)?;
    let files = walk.files;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut files_loaded = Vec::new();
    let mut skipped = walk.unreadable;

    for file in &files {
        let text = match load_text(&file.path, &encodings) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(repo = %repo, file = %file.relative, error = %e.reason, "skipping file");
                skipped.push(e);
                continue;
            }
        };

        let file_chunks = chunk_file(
            repo,
            &file.relative,
            &text,
            config.chunk_size,
            config.chunk_overlap,
        );
        files_loaded.push((file.relative.clone(), file_chunks.len()));
        chunks.extend(file_chunks);
    }

    let chunks_committed = if chunks.is_empty() {
        0
    } else {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();
        store.add(&embedded).await?
    };

    tracing::info!(
        repo = %repo,
        files = files_loaded.len(),
        skipped = skipped.len(),
        chunks = chunks_committed,
        "ingested directory"
    );

    Ok(IngestReport {
        repo: repo.to_string(),
        files_matched: files.len(),
        files_loaded,
        skipped,
        chunks_committed,
    })
}

/// `repochat ingest <dir> --name <repo>`
///
/// Ingests a local directory and registers it. The directory is left in place.
pub async fn run_ingest(app: &mut App, dir: &Path, repo: &str) -> Result<()> {
    let report = commit_repository(app, repo, dir).await?;
    report.print();
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use repo_chat_core::store::memory::InMemoryStore;
    use repo_chat_core::store::MetadataFilter;
    use std::fs;
    use tempfile::TempDir;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("provider unavailable")
        }
    }

    #[tokio::test]
    async fn test_chunks_per_file_and_tags() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "x".repeat(2500)).unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("docs/b.md"), "y".repeat(10)).unwrap();
        fs::write(tmp.path().join("ignored.txt"), "z").unwrap();

        let store = InMemoryStore::new();
        let report = ingest(&store, &LenEmbedder, &IngestConfig::default(), "demo", tmp.path())
            .await
            .unwrap();

        assert_eq!(report.files_matched, 2);
        assert_eq!(
            report.files_loaded,
            vec![("a.py".to_string(), 3), ("docs/b.md".to_string(), 1)]
        );
        assert_eq!(report.chunks_committed, 4);
        assert!(store.all_chunks().iter().all(|c| c.metadata.repo == "demo"));
    }

    #[tokio::test]
    async fn test_empty_file_contributes_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.rs"), "").unwrap();

        let store = InMemoryStore::new();
        let report = ingest(&store, &LenEmbedder, &IngestConfig::default(), "demo", tmp.path())
            .await
            .unwrap();
        assert_eq!(report.files_loaded, vec![("empty.rs".to_string(), 0)]);
        assert_eq!(report.chunks_committed, 0);
    }

    #[tokio::test]
    async fn test_undecodable_file_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.rs"), "fn main() {}").unwrap();
        fs::write(tmp.path().join("bad.rs"), [0xFFu8, 0xFE]).unwrap();

        let config = IngestConfig {
            encodings: vec!["utf-8".to_string()],
            ..IngestConfig::default()
        };
        let store = InMemoryStore::new();
        let report = ingest(&store, &LenEmbedder, &config, "demo", tmp.path())
            .await
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("bad.rs"));
        assert_eq!(report.chunks_committed, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.rs"), "fn main() {}").unwrap();
        let locked = tmp.path().join("vendor");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("dep.rs"), "fn dep() {}").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let privileged = fs::read_dir(&locked).is_ok();

        let store = InMemoryStore::new();
        let result = ingest(&store, &LenEmbedder, &IngestConfig::default(), "demo", tmp.path()).await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let report = result.unwrap();
        if privileged {
            assert_eq!(report.chunks_committed, 2);
            return;
        }
        assert_eq!(report.files_loaded, vec![("good.rs".to_string(), 1)]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("vendor"));
        assert_eq!(report.chunks_committed, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.rs"), "fn a() {}").unwrap();

        let store = InMemoryStore::new();
        let result = ingest(
            &store,
            &FailingEmbedder,
            &IngestConfig::default(),
            "demo",
            tmp.path(),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(store.count(&MetadataFilter::repo("demo")).await.unwrap(), 0);
    }
}
