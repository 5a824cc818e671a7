//! Source file discovery and loading.
//!
//! Walks a directory tree and keeps files whose name ends in one of the
//! allow-listed extensions. Matching is a case-sensitive `*.<ext>` glob on
//! the file name, so `main.PY` does not match `py`. Both the cost estimator
//! and the ingestor use this module, so they always see the same file set.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use repo_chat_core::decode::{decode_with, Decoded, Encoding};

/// A file selected for estimation or ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the walk root, with `/` separators.
    pub relative: String,
}

/// A single file could not be loaded. Ingestion skips the file and
/// carries on.
#[derive(Debug, Clone)]
pub struct FileLoadError {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for FileLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load {}: {}", self.path.display(), self.reason)
    }
}

impl std::error::Error for FileLoadError {}

/// Build a matcher for `*.<ext>` over file names.
pub fn build_allowlist(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let ext = ext.trim_start_matches('.');
        builder.add(Glob::new(&format!("*.{}", ext))?);
    }
    Ok(builder.build()?)
}

/// Result of walking a directory: the matching files, and the entries the
/// walk could not read.
#[derive(Debug, Default)]
pub struct SourceWalk {
    /// Sorted by relative path.
    pub files: Vec<SourceFile>,
    pub unreadable: Vec<FileLoadError>,
}

/// All files under `root` whose name matches `allowlist`.
///
/// Entries below the root that cannot be read (a directory without
/// permission, a vanished file) are logged and collected in
/// [`SourceWalk::unreadable`] instead of ending the walk. Failing to read
/// `root` itself is an error.
pub fn matching_files(root: &Path, allowlist: &GlobSet) -> Result<SourceWalk> {
    let mut walk = SourceWalk::default();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                walk.unreadable.push(FileLoadError {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !allowlist.is_match(name.as_ref()) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        walk.files.push(SourceFile {
            path: path.to_path_buf(),
            relative,
        });
    }

    // Sort for deterministic ordering
    walk.files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(walk)
}

/// Read a file and decode it with the first encoding that accepts it.
pub fn load_text(path: &Path, encodings: &[Encoding]) -> Result<String, FileLoadError> {
    let bytes = std::fs::read(path).map_err(|e| FileLoadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match decode_with(&bytes, encodings) {
        Decoded::Text { text, .. } => Ok(text),
        Decoded::Failed => Err(FileLoadError {
            path: path.to_path_buf(),
            reason: format!(
                "not decodable as any of: {}",
                encodings
                    .iter()
                    .map(|e| e.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }),
    }
}
