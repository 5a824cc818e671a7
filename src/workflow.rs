//! Adding a repository: fetch, estimate, confirm, ingest, register.
//!
//! ```text
//! URL ─▶ prepare ─┬─▶ AlreadyRegistered
//!                 └─▶ AwaitingConfirmation(PendingIngest)
//!                         ├─ confirm ─▶ ingest ─▶ registry append ─▶ remove work dir
//!                         └─ cancel  ─▶ remove work dir
//! ```
//!
//! The registry is appended only after the chunks are committed, so a
//! registered name always has data behind it. The fetched working
//! directory is removed whichever way the pending ingestion ends, including
//! when a [`PendingIngest`] is dropped on an error path.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};

use repo_chat_core::cost::CostEstimate;

use crate::app::App;
use crate::config::Config;
use crate::cost;
use crate::fetch::{repo_name_from_url, FetchedRepo, RepoFetcher};
use crate::ingest::{ingest, IngestReport};
use crate::prompt;

pub enum Prepared {
    AlreadyRegistered(String),
    AwaitingConfirmation(PendingIngest),
}

/// A fetched and estimated repository waiting for the user's go-ahead.
#[derive(Debug)]
pub struct PendingIngest {
    pub repo: FetchedRepo,
    pub estimate: CostEstimate,
}

impl PendingIngest {
    /// Ingest and register the repository, then remove the working directory.
    pub async fn confirm(self, app: &mut App) -> Result<IngestReport> {
        let result = commit_repository(app, &self.repo.name, &self.repo.local_path).await;
        remove_workdir(&self.repo.local_path);
        result
    }

    /// Drop the fetched working directory without ingesting anything.
    pub fn cancel(self) {
        tracing::info!(repo = %self.repo.name, "ingestion cancelled");
        remove_workdir(&self.repo.local_path);
    }
}

impl Drop for PendingIngest {
    fn drop(&mut self) {
        remove_workdir(&self.repo.local_path);
    }
}

/// Fetch `url` and estimate its ingestion cost.
///
/// Nothing is fetched when the repository name is already registered. If
/// the estimate fails, the fetched directory is removed before returning.
pub async fn prepare(app: &App, url: &str) -> Result<Prepared> {
    let name = repo_name_from_url(url)?;
    if app.registry.contains(&name) {
        return Ok(Prepared::AlreadyRegistered(name));
    }
    check_destination(&app.config, &name)?;

    let fetcher = RepoFetcher::new(&app.config.fetch)?;
    let repo = fetcher.fetch(url).await?;

    match cost::estimate(&app.config, &repo.local_path) {
        Ok(estimate) => Ok(Prepared::AwaitingConfirmation(PendingIngest { repo, estimate })),
        Err(e) => {
            remove_workdir(&repo.local_path);
            Err(e)
        }
    }
}

/// Ingest `local_path` as `repo` into the shared store, then register it.
pub async fn commit_repository(app: &mut App, repo: &str, local_path: &Path) -> Result<IngestReport> {
    if app.registry.contains(repo) {
        bail!("Repository '{}' is already registered", repo);
    }

    let report = ingest(
        app.store.as_ref(),
        app.embedder.as_ref(),
        &app.config.ingest,
        repo,
        local_path,
    )
    .await?;

    if report.chunks_committed == 0 {
        bail!(
            "Nothing to ingest in {}: no non-empty files match the extension allow-list",
            local_path.display()
        );
    }

    app.registry.append(repo)?;
    Ok(report)
}

/// Refuse a fetch destination that is, or contains, the database or the
/// registry file. Extraction clears the destination first.
pub fn check_destination(config: &Config, name: &str) -> Result<()> {
    let dest = lexical_absolute(&config.fetch.work_dir.join(name));
    for (what, path) in [("database", &config.db.path), ("registry", &config.registry.path)] {
        if lexical_absolute(path).starts_with(&dest) {
            bail!(
                "Refusing to fetch '{}' into {}: it would overwrite the {} at {}",
                name,
                dest.display(),
                what,
                path.display()
            );
        }
    }
    Ok(())
}

/// Absolute form of `path` with `.` segments dropped and `..` applied,
/// without touching the filesystem.
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn remove_workdir(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove working directory");
    }
}

/// `repochat add <url> [--yes]`
pub async fn run_add(app: &mut App, url: &str, yes: bool) -> Result<()> {
    let pending = match prepare(app, url).await? {
        Prepared::AlreadyRegistered(name) => {
            println!("add {}", name);
            println!("  already registered");
            println!("ok");
            return Ok(());
        }
        Prepared::AwaitingConfirmation(pending) => pending,
    };

    println!("add {}", pending.repo.name);
    println!("  branch: {}", pending.repo.branch);
    println!("  total tokens: {}", pending.estimate.total_tokens);
    println!("  estimated cost: {:.2} USD", pending.estimate.cost_usd);

    let proceed = if yes {
        true
    } else if prompt::is_interactive() {
        prompt::stdio().confirm("Ingest this repository?")?
    } else {
        pending.cancel();
        bail!("Confirmation required: stdin is not a terminal, re-run with --yes");
    };

    if !proceed {
        pending.cancel();
        println!("  cancelled");
        return Ok(());
    }

    let report = pending.confirm(app).await?;
    report.print();
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn pending(local_path: PathBuf) -> PendingIngest {
        PendingIngest {
            repo: FetchedRepo {
                name: "demo".to_string(),
                branch: "main".to_string(),
                local_path,
            },
            estimate: CostEstimate::from_tokens(10, 0.0001),
        }
    }

    #[test]
    fn test_dropped_pending_removes_workdir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("demo");
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("src/a.rs"), "fn a() {}").unwrap();

        let result: Result<()> = (|| {
            let _pending = pending(dir.clone());
            bail!("prompt failed")
        })();

        assert!(result.is_err());
        assert!(!dir.exists());
    }

    #[test]
    fn test_cancel_removes_workdir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("demo");
        fs::create_dir_all(&dir).unwrap();
        pending(dir.clone()).cancel();
        assert!(!dir.exists());
    }

    #[test]
    fn test_destination_over_data_dir_refused() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.fetch.work_dir = tmp.path().to_path_buf();
        config.db.path = tmp.path().join("data/repochat.sqlite");
        config.registry.path = tmp.path().join("./data/repos.json");

        let err = check_destination(&config, "data").unwrap_err();
        assert!(err.to_string().contains("database"));
        assert!(check_destination(&config, "demo").is_ok());
    }

    #[test]
    fn test_destination_relative_paths_compared_lexically() {
        let mut config = Config::minimal();
        config.fetch.work_dir = PathBuf::from(".");
        config.db.path = PathBuf::from("./store/db.sqlite");
        config.registry.path = PathBuf::from("data/repos.json");

        let err = check_destination(&config, "data").unwrap_err();
        assert!(err.to_string().contains("registry"));
        assert!(check_destination(&config, "store").is_err());
        assert!(check_destination(&config, "datastore").is_ok());
    }

    #[test]
    fn test_default_layout_keeps_data_safe() {
        let config = Config::minimal();
        assert!(check_destination(&config, "data").is_ok());
        assert!(check_destination(&config, "repos").is_ok());
    }
}
