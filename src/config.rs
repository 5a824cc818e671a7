//! TOML configuration parsing and validation.
//!
//! Every section and field has a default, so an empty file (or no file at
//! the default path) yields a working configuration. See
//! [`load_config`] for the validation rules.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use repo_chat_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use repo_chat_core::cost::DEFAULT_USD_PER_1K_TOKENS;
use repo_chat_core::decode::Encoding;
use repo_chat_core::retrieval::{
    DistanceMetric, RetrieverConfig, DEFAULT_FETCH_K, DEFAULT_K, DEFAULT_MMR_LAMBDA,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/repochat.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./data/repos.json")
}

/// How the default branch of a repository is discovered.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BranchSource {
    /// Scrape the repository web page for the branch indicator element.
    #[default]
    Page,
    /// Ask the repository metadata API for `default_branch`.
    Api,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Parent directory for extracted repositories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub branch_source: BranchSource,
    /// CSS class of the element holding the branch name on the repository page.
    #[serde(default = "default_branch_marker")]
    pub branch_marker: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            timeout_secs: default_fetch_timeout_secs(),
            branch_source: BranchSource::default(),
            branch_marker: default_branch_marker(),
            api_base: default_api_base(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./repos")
}
fn default_fetch_timeout_secs() -> u64 {
    60
}
fn default_branch_marker() -> String {
    "css-truncate-target".to_string()
}
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// File extensions (without the dot) that are estimated and ingested.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Encodings tried in order when reading a file.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            encodings: default_encodings(),
        }
    }
}

/// Source and text extensions estimated and ingested by default.
pub const DEFAULT_EXTENSIONS: [&str; 34] = [
    "py", "js", "ts", "html", "css", "scss", "json", "xml", "yml", "md", "java", "cpp", "h", "c",
    "php", "rb", "go", "swift", "kt", "sql", "cs", "sh", "pyc", "rs", "tsx", "jsx", "sass",
    "less", "vue", "rbw", "pl", "ps1", "bat", "cmd",
];

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}
fn default_encodings() -> Vec<String> {
    vec!["utf-8".to_string(), "iso-8859-1".to_string()]
}

impl IngestConfig {
    /// Parsed encoding list. Validated by [`load_config`].
    pub fn encoding_list(&self) -> Result<Vec<Encoding>> {
        self.encodings
            .iter()
            .map(|e| e.parse::<Encoding>().map_err(|msg| anyhow::anyhow!(msg)))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CostConfig {
    #[serde(default = "default_usd_per_1k_tokens")]
    pub usd_per_1k_tokens: f64,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            usd_per_1k_tokens: default_usd_per_1k_tokens(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_usd_per_1k_tokens() -> f64 {
    DEFAULT_USD_PER_1K_TOKENS
}
fn default_tokenizer() -> String {
    "cl100k_base".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_true")]
    pub maximal_marginal_relevance: bool,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            distance_metric: DistanceMetric::default(),
            fetch_k: default_fetch_k(),
            maximal_marginal_relevance: true,
            k: default_k(),
            mmr_lambda: default_mmr_lambda(),
        }
    }
}

fn default_fetch_k() -> usize {
    DEFAULT_FETCH_K
}
fn default_true() -> bool {
    true
}
fn default_k() -> usize {
    DEFAULT_K
}
fn default_mmr_lambda() -> f32 {
    DEFAULT_MMR_LAMBDA
}

impl RetrievalConfig {
    /// Retriever parameters scoped to `repo`.
    pub fn for_repo(&self, repo: &str) -> RetrieverConfig {
        RetrieverConfig {
            distance_metric: self.distance_metric,
            candidate_pool_size: self.fetch_k,
            use_mmr: self.maximal_marginal_relevance,
            result_count: self.k,
            mmr_lambda: self.mmr_lambda,
            repo_filter: repo.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            timeout_secs: default_chat_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    60
}

impl Config {
    /// All defaults. Used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate ingest
    if config.ingest.chunk_size == 0 {
        anyhow::bail!("ingest.chunk_size must be > 0");
    }
    if config.ingest.chunk_overlap >= config.ingest.chunk_size {
        anyhow::bail!("ingest.chunk_overlap must be < ingest.chunk_size");
    }
    if config.ingest.encodings.is_empty() {
        anyhow::bail!("ingest.encodings must list at least one encoding");
    }
    config
        .ingest
        .encoding_list()
        .with_context(|| "Invalid ingest.encodings")?;

    // Validate cost
    if config.cost.usd_per_1k_tokens < 0.0 {
        anyhow::bail!("cost.usd_per_1k_tokens must be >= 0");
    }
    if config.cost.tokenizer != "cl100k_base" {
        anyhow::bail!(
            "Unknown tokenizer: '{}'. Must be cl100k_base.",
            config.cost.tokenizer
        );
    }

    // Validate retrieval
    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.k {
        anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&config.retrieval.mmr_lambda) {
        anyhow::bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}

/// Provider credential, read once from the environment at startup.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

/// `OPENAI_API_KEY` is missing or empty.
#[derive(Debug)]
pub struct CredentialMissing;

impl fmt::Display for CredentialMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OPENAI_API_KEY environment variable not set")
    }
}

impl std::error::Error for CredentialMissing {}

impl Credentials {
    pub fn from_env() -> Result<Self, CredentialMissing> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Self {
                openai_api_key: key,
            }),
            _ => Err(CredentialMissing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.ingest.chunk_size, 1000);
        assert_eq!(cfg.ingest.chunk_overlap, 0);
        assert_eq!(cfg.ingest.extensions.len(), 34);
        assert_eq!(cfg.retrieval.fetch_k, 100);
        assert_eq!(cfg.retrieval.k, 10);
        assert!(cfg.retrieval.maximal_marginal_relevance);
        assert_eq!(cfg.retrieval.distance_metric, DistanceMetric::Cosine);
        assert_eq!(cfg.fetch.branch_source, BranchSource::Page);
        assert_eq!(cfg.fetch.work_dir, PathBuf::from("./repos"));
        assert!((cfg.cost.usd_per_1k_tokens - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_overrides() {
        let cfg = parse(
            r#"
            [ingest]
            chunk_size = 500
            chunk_overlap = 50
            extensions = ["rs"]

            [retrieval]
            distance_metric = "l2"
            k = 4
            fetch_k = 20

            [fetch]
            branch_source = "api"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ingest.chunk_size, 500);
        assert_eq!(cfg.ingest.extensions, vec!["rs".to_string()]);
        assert_eq!(cfg.retrieval.distance_metric, DistanceMetric::L2);
        assert_eq!(cfg.fetch.branch_source, BranchSource::Api);

        let rc = cfg.retrieval.for_repo("demo");
        assert_eq!(rc.result_count, 4);
        assert_eq!(rc.candidate_pool_size, 20);
        assert_eq!(rc.repo_filter, "demo");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse("[ingest]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_fetch_k_at_least_k() {
        assert!(parse("[retrieval]\nk = 20\nfetch_k = 10\n").is_err());
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        assert!(parse("[ingest]\nencodings = [\"utf-16\"]\n").is_err());
    }

    #[test]
    fn test_negative_rate_rejected() {
        assert!(parse("[cost]\nusd_per_1k_tokens = -1.0\n").is_err());
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let cfg = parse(include_str!("../config/repochat.example.toml")).unwrap();
        assert_eq!(cfg.ingest.extensions, default_extensions());
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.chat.model, "gpt-3.5-turbo");
        assert_eq!(cfg.fetch.work_dir, default_work_dir());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let cfg = load_or_minimal(Path::new("/nonexistent/repochat.toml")).unwrap();
        assert_eq!(cfg.ingest.chunk_size, 1000);
    }
}
