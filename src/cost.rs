//! Token counting and cost estimation for a directory tree.
//!
//! Counts `cl100k_base` tokens over every allow-listed file and converts
//! the total to USD with the configured rate. Special-token text such as
//! `<|endoftext|>` is counted as ordinary text. Purely advisory: nothing is
//! written anywhere.
//!
//! Files are decoded with the same encoding fallback as ingestion. With the
//! default list this never fails, so binary files that happen to match the
//! allow-list (e.g. `.pyc`) are counted as if they were text.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tiktoken_rs::CoreBPE;

use repo_chat_core::cost::CostEstimate;

use crate::config::Config;
use crate::source_files::{build_allowlist, load_text, matching_files};

/// Token counter for the configured tokenizer.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    pub fn new(tokenizer: &str) -> Result<Self> {
        let bpe = match tokenizer {
            "cl100k_base" => tiktoken_rs::cl100k_base()?,
            other => bail!("Unknown tokenizer: '{}'", other),
        };
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> u64 {
        self.bpe.encode_ordinary(text).len() as u64
    }
}

/// Estimate tokens and cost for every allow-listed file under `dir`.
///
/// A file that cannot be decoded fails the whole estimate. Directories the
/// walk cannot enter are skipped with a warning, as ingestion skips them.
pub fn estimate(config: &Config, dir: &Path) -> Result<CostEstimate> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let counter = TokenCounter::new(&config.cost.tokenizer)?;
    let allowlist = build_allowlist(&config.ingest.extensions)?;
    let encodings = config.ingest.encoding_list()?;

    let mut total_tokens = 0u64;
    for file in matching_files(dir, &allowlist)?.files {
        let text = load_text(&file.path, &encodings)
            .with_context(|| format!("Failed to count tokens in {}", file.relative))?;
        total_tokens += counter.count(&text);
    }

    tracing::debug!(dir = %dir.display(), total_tokens, "estimated directory");
    Ok(CostEstimate::from_tokens(
        total_tokens,
        config.cost.usd_per_1k_tokens,
    ))
}

/// `repochat estimate <dir>`
pub fn run_estimate(config: &Config, dir: &Path) -> Result<()> {
    let est = estimate(config, dir)?;
    println!("estimate {}", dir.display());
    println!("  total tokens: {}", est.total_tokens);
    println!("  cost: {:.2} USD", est.cost_usd);
    Ok(())
}
