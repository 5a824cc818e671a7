//! Repository registry: the names of every repository that has been
//! ingested.
//!
//! Persisted as a JSON array of strings. The file is read once and kept in
//! memory; every change rewrites it whole through a temporary file and a
//! rename, so a crash mid-write leaves the previous list in place.
//!
//! Names are unique and keep the order in which they were first added.
//! Duplicates already present in the file are collapsed on load.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::Config;

#[derive(Debug)]
pub enum RegistryError {
    Io { path: PathBuf, reason: String },
    Corrupt { path: PathBuf, reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Io { path, reason } => {
                write!(f, "registry I/O error at {}: {}", path.display(), reason)
            }
            RegistryError::Corrupt { path, reason } => {
                write!(f, "registry file {} is not a list of names: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Clone)]
pub struct RepoRegistry {
    path: PathBuf,
    names: Vec<String>,
}

impl RepoRegistry {
    /// Load the registry at `path`. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let names = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => {
                let raw: Vec<String> =
                    serde_json::from_str(&content).map_err(|e| RegistryError::Corrupt {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
                dedup_preserving_order(raw)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(RegistryError::Io {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Add `name` and persist. Returns `false` without writing when the name
    /// is already registered.
    ///
    /// On a write failure the in-memory list is left as it was.
    pub fn append(&mut self, name: &str) -> Result<bool, RegistryError> {
        if self.contains(name) {
            return Ok(false);
        }

        self.names.push(name.to_string());
        if let Err(e) = self.persist() {
            self.names.pop();
            return Err(e);
        }
        tracing::info!(repo = %name, path = %self.path.display(), "registered repository");
        Ok(true)
    }

    fn persist(&self) -> Result<(), RegistryError> {
        let io_err = |e: std::io::Error| RegistryError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.names).map_err(|e| RegistryError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn dedup_preserving_order(raw: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// `repochat repos`
pub fn run_list(config: &Config) -> Result<()> {
    let registry = RepoRegistry::load(&config.registry.path)?;

    if registry.names().is_empty() {
        println!("No repositories registered.");
        println!("Add one with: repochat add <url>");
        return Ok(());
    }

    println!("repos ({})", registry.path().display());
    for name in registry.names() {
        println!("  {}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let reg = RepoRegistry::load(&tmp.path().join("repos.json")).unwrap();
        assert!(reg.names().is_empty());
    }

    #[test]
    fn test_load_dedups_in_first_seen_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repos.json");
        fs::write(&path, r#"["b", "a", "b", "c", "a"]"#).unwrap();
        let reg = RepoRegistry::load(&path).unwrap();
        assert_eq!(reg.names(), ["b", "a", "c"]);
    }

    #[test]
    fn test_append_persists_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/repos.json");

        let mut reg = RepoRegistry::load(&path).unwrap();
        assert!(reg.append("tiktoken").unwrap());
        assert!(!reg.append("tiktoken").unwrap());
        assert!(reg.append("cargo").unwrap());

        let reloaded = RepoRegistry::load(&path).unwrap();
        assert_eq!(reloaded.names(), ["tiktoken", "cargo"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repos.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RepoRegistry::load(&path),
            Err(RegistryError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let tmp = TempDir::new().unwrap();
        // The registry path is a directory, so the final rename fails.
        let path = tmp.path().join("repos.json");
        fs::create_dir_all(path.join("occupied")).unwrap();

        let mut reg = RepoRegistry {
            path: path.clone(),
            names: Vec::new(),
        };
        assert!(matches!(reg.append("x"), Err(RegistryError::Io { .. })));
        assert!(reg.names().is_empty());
    }
}
