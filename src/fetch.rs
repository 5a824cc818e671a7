//! Repository fetcher: URL → extracted working directory.
//!
//! Workflow:
//! 1. Derive the repository name from the last URL path segment.
//! 2. Resolve the default branch, either by scraping the repository page
//!    for the branch indicator element or by asking the metadata API.
//! 3. Download `<url>/archive/refs/heads/<branch>.zip`.
//! 4. Clear `<work_dir>/<name>`, extract into it, and unwrap the single
//!    top-level folder archive hosts add (`repo-main/`).
//!
//! Steps 1-3 touch nothing on disk, so a branch or download failure leaves
//! the destination untouched.

use std::fmt;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::config::{BranchSource, FetchConfig};

/// Why a fetch attempt failed. Every variant aborts the attempt without
/// touching the registry or the vector store.
#[derive(Debug)]
pub enum FetchError {
    InvalidUrl(String),
    BranchResolution(String),
    Download(String),
    Timeout(String),
    Extraction(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidUrl(u) => write!(f, "invalid repository URL: {}", u),
            FetchError::BranchResolution(e) => {
                write!(f, "could not resolve default branch: {}", e)
            }
            FetchError::Download(e) => write!(f, "archive download failed: {}", e),
            FetchError::Timeout(e) => write!(f, "request timed out: {}", e),
            FetchError::Extraction(e) => write!(f, "archive extraction failed: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// A repository extracted to the local filesystem.
#[derive(Debug, Clone)]
pub struct FetchedRepo {
    pub name: String,
    pub branch: String,
    pub local_path: PathBuf,
}

/// Last path segment of `url`, without a trailing `.git`.
///
/// The name becomes a directory under the work dir, so it must be a single
/// plain path component: `.`, `..`, and separators are rejected.
pub fn repo_name_from_url(url: &str) -> Result<String, FetchError> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);
    if !is_plain_dir_name(name) {
        return Err(FetchError::InvalidUrl(url.to_string()));
    }
    Ok(name.to_string())
}

fn is_plain_dir_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', ':']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `(owner, name)` from the last two path segments of `url`.
pub fn owner_and_name(url: &str) -> Result<(String, String), FetchError> {
    let name = repo_name_from_url(url)?;
    let trimmed = url.trim().trim_end_matches('/');
    let mut segments = trimmed.rsplit('/');
    segments.next();
    match segments.next() {
        Some(owner) if !owner.is_empty() && !owner.contains(':') => {
            Ok((owner.to_string(), name))
        }
        _ => Err(FetchError::InvalidUrl(url.to_string())),
    }
}

/// Repository URL without trailing `/` or `.git`, used to build archive URLs.
fn base_url(url: &str) -> &str {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

/// Inner text of the first element whose `class` attribute contains
/// `marker` as a whole class name.
///
/// Only a `class=` that follows whitespace inside an open tag counts, so
/// `data-class=` and text that happens to read `class=` are skipped.
pub fn find_branch_marker(html: &str, marker: &str) -> Option<String> {
    let mut from = 0;
    while let Some(found) = html[from..].find("class=") {
        let pos = from + found;
        let after = &html[pos + "class=".len()..];
        from = pos + "class=".len();

        if !is_attribute_start(html, pos) {
            continue;
        }
        let quote = match after.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => continue,
        };
        let value_start = &after[1..];
        let value_end = value_start.find(quote)?;
        let classes = &value_start[..value_end];
        let tail = &value_start[value_end + 1..];

        if classes.split_whitespace().any(|c| c == marker) {
            let tag_end = tail.find('>')?;
            let inner = &tail[tag_end + 1..];
            let text_end = inner.find('<').unwrap_or(inner.len());
            let text = inner[..text_end].trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
        from = html.len() - tail.len();
    }
    None
}

/// True when the byte before `pos` is whitespace and `pos` sits inside a tag.
fn is_attribute_start(html: &str, pos: usize) -> bool {
    let before = &html[..pos];
    let preceded_by_space = before
        .as_bytes()
        .last()
        .is_some_and(|b| b.is_ascii_whitespace());
    let in_tag = match (before.rfind('<'), before.rfind('>')) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    };
    preceded_by_space && in_tag
}

/// Unwrap a single top-level directory: if `root` holds exactly one entry
/// and it is a directory, move its children up one level and remove it.
///
/// Any other layout is left as is. Returns `root`.
pub fn normalize_extracted_layout(root: &Path) -> std::io::Result<PathBuf> {
    let entries: Vec<_> = std::fs::read_dir(root)?.collect::<Result<_, _>>()?;
    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(root.to_path_buf());
    }

    // Rename the wrapper first so a child with the same name can move up.
    let wrapper = root.join(format!(".unwrap-{}", Uuid::new_v4()));
    std::fs::rename(entries[0].path(), &wrapper)?;

    for child in std::fs::read_dir(&wrapper)? {
        let child = child?;
        std::fs::rename(child.path(), root.join(child.file_name()))?;
    }
    std::fs::remove_dir(&wrapper)?;

    Ok(root.to_path_buf())
}

/// Clear `dest`, extract the zip `bytes` into it, and normalize the layout.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<PathBuf, FetchError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| FetchError::Extraction(e.to_string()))?;

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| {
            FetchError::Extraction(format!("failed to clear {}: {}", dest.display(), e))
        })?;
    }
    std::fs::create_dir_all(dest).map_err(|e| {
        FetchError::Extraction(format!("failed to create {}: {}", dest.display(), e))
    })?;

    let result = archive
        .extract(dest)
        .map_err(|e| FetchError::Extraction(e.to_string()))
        .and_then(|_| {
            normalize_extracted_layout(dest).map_err(|e| {
                FetchError::Extraction(format!("failed to flatten {}: {}", dest.display(), e))
            })
        });

    if result.is_err() {
        let _ = std::fs::remove_dir_all(dest);
    }
    result
}

fn transport_error(err: reqwest::Error, wrap: fn(String) -> FetchError) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else {
        wrap(err.to_string())
    }
}

/// Downloads and extracts repositories from an archive host.
pub struct RepoFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl RepoFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repochat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Fetch `url` into `<work_dir>/<repo name>`.
    pub async fn fetch(&self, url: &str) -> Result<FetchedRepo, FetchError> {
        let name = repo_name_from_url(url)?;
        let branch = self.resolve_default_branch(url).await?;
        tracing::info!(repo = %name, branch = %branch, "resolved default branch");

        let bytes = self.download_archive(url, &branch).await?;
        let dest = self.config.work_dir.join(&name);
        if dest.parent() != Some(self.config.work_dir.as_path()) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let local_path = extract_archive(&bytes, &dest)?;
        tracing::info!(repo = %name, path = %local_path.display(), "extracted archive");

        Ok(FetchedRepo {
            name,
            branch,
            local_path,
        })
    }

    pub async fn resolve_default_branch(&self, url: &str) -> Result<String, FetchError> {
        match self.config.branch_source {
            BranchSource::Page => self.branch_from_page(url).await,
            BranchSource::Api => self.branch_from_api(url).await,
        }
    }

    async fn branch_from_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(base_url(url))
            .send()
            .await
            .map_err(|e| transport_error(e, FetchError::BranchResolution))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BranchResolution(format!(
                "repository page returned {}",
                status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| transport_error(e, FetchError::BranchResolution))?;

        find_branch_marker(&html, &self.config.branch_marker).ok_or_else(|| {
            FetchError::BranchResolution(format!(
                "no element with class '{}' on {}",
                self.config.branch_marker, url
            ))
        })
    }

    async fn branch_from_api(&self, url: &str) -> Result<String, FetchError> {
        let (owner, name) = owner_and_name(url)?;
        let api_url = format!(
            "{}/repos/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            owner,
            name
        );

        let response = self
            .client
            .get(&api_url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error(e, FetchError::BranchResolution))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BranchResolution(format!(
                "metadata API returned {}",
                status
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, FetchError::BranchResolution))?;

        json.get("default_branch")
            .and_then(|b| b.as_str())
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                FetchError::BranchResolution(format!("no default_branch in {}", api_url))
            })
    }

    async fn download_archive(&self, url: &str, branch: &str) -> Result<Vec<u8>, FetchError> {
        let zip_url = format!("{}/archive/refs/heads/{}.zip", base_url(url), branch);
        let response = self
            .client
            .get(&zip_url)
            .send()
            .await
            .map_err(|e| transport_error(e, FetchError::Download))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Download(format!("{} returned {}", zip_url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, FetchError::Download))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_repo_name_strips_git() {
        assert_eq!(
            repo_name_from_url("https://github.com/openai/tiktoken.git").unwrap(),
            "tiktoken"
        );
        assert_eq!(
            repo_name_from_url("https://github.com/openai/tiktoken/").unwrap(),
            "tiktoken"
        );
    }

    #[test]
    fn test_repo_name_rejects_empty() {
        assert!(repo_name_from_url("").is_err());
        assert!(repo_name_from_url("https://").is_err());
    }

    #[test]
    fn test_repo_name_rejects_dot_segments() {
        for url in [
            "https://github.com/owner/..",
            "https://github.com/owner/../",
            "https://github.com/owner/.",
            "https://github.com/owner/..git",
            "https://github.com/owner/a\\..",
        ] {
            assert!(
                matches!(repo_name_from_url(url), Err(FetchError::InvalidUrl(_))),
                "accepted {}",
                url
            );
        }
        assert_eq!(repo_name_from_url("https://github.com/owner/.dotfiles").unwrap(), ".dotfiles");
    }

    #[test]
    fn test_owner_and_name() {
        let (owner, name) = owner_and_name("https://github.com/rust-lang/cargo.git").unwrap();
        assert_eq!(owner, "rust-lang");
        assert_eq!(name, "cargo");
    }

    #[test]
    fn test_find_branch_marker() {
        let html = r#"<div><span class="btn css-truncate-target" data-menu-button>develop</span></div>"#;
        assert_eq!(
            find_branch_marker(html, "css-truncate-target"),
            Some("develop".to_string())
        );
    }

    #[test]
    fn test_find_branch_marker_whole_class_only() {
        let html = r#"<span class="css-truncate-target-wide">nope</span>"#;
        assert_eq!(find_branch_marker(html, "css-truncate-target"), None);
    }

    #[test]
    fn test_find_branch_marker_skips_empty_element() {
        let html = r#"<i class="css-truncate-target"></i><b class='css-truncate-target'> main </b>"#;
        assert_eq!(
            find_branch_marker(html, "css-truncate-target"),
            Some("main".to_string())
        );
    }

    #[test]
    fn test_find_branch_marker_ignores_data_class_and_text() {
        let html = concat!(
            r#"<div data-class="css-truncate-target">wrong</div>"#,
            r#"<p>set class="css-truncate-target">also wrong</p>"#,
            r#"<span class="css-truncate-target">trunk</span>"#,
        );
        assert_eq!(
            find_branch_marker(html, "css-truncate-target"),
            Some("trunk".to_string())
        );
    }

    #[test]
    fn test_find_branch_marker_absent() {
        assert_eq!(find_branch_marker("<html></html>", "css-truncate-target"), None);
    }

    #[test]
    fn test_normalize_unwraps_single_dir() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("repo-main/sub")).unwrap();
        fs::write(root.join("repo-main/a.txt"), "a").unwrap();
        fs::write(root.join("repo-main/sub/b.txt"), "b").unwrap();

        normalize_extracted_layout(root).unwrap();

        assert!(root.join("a.txt").is_file());
        assert!(root.join("sub/b.txt").is_file());
        assert!(!root.join("repo-main").exists());
    }

    #[test]
    fn test_normalize_child_named_like_wrapper() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("x/x")).unwrap();
        fs::write(root.join("x/x/inner.txt"), "i").unwrap();

        normalize_extracted_layout(root).unwrap();

        assert!(root.join("x/inner.txt").is_file());
        assert_eq!(fs::read_dir(root).unwrap().count(), 1);
    }

    #[test]
    fn test_normalize_leaves_flat_layout() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("README.md"), "r").unwrap();

        normalize_extracted_layout(root).unwrap();

        assert!(root.join("src").is_dir());
        assert!(root.join("README.md").is_file());
    }

    #[test]
    fn test_normalize_single_file_untouched() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("only.txt"), "o").unwrap();
        normalize_extracted_layout(tmp.path()).unwrap();
        assert!(tmp.path().join("only.txt").is_file());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("repo");
        let err = extract_archive(b"not a zip", &dest).unwrap_err();
        assert!(matches!(err, FetchError::Extraction(_)));
        assert!(!dest.exists());
    }
}
