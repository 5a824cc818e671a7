//! # repochat CLI
//!
//! Ingest a remote source repository into a vector index and ask questions
//! about it.
//!
//! ## Usage
//!
//! ```bash
//! repochat --config ./config/repochat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repochat repos` | List registered repositories |
//! | `repochat estimate <dir>` | Token count and cost for a local directory |
//! | `repochat add <url>` | Fetch, estimate, confirm, ingest, and register a repository |
//! | `repochat ingest <dir> --name <repo>` | Ingest and register a local directory |
//! | `repochat ask --repo <name> "<question>"` | One-shot question |
//! | `repochat chat` | Interactive repository selection and chat |
//!
//! Commands that call the embedding or chat provider need `OPENAI_API_KEY`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use repo_chat::app::App;
use repo_chat::config::{self, CredentialMissing};
use repo_chat::{chat_cmd, cost, ingest, registry, workflow};

#[derive(Parser)]
#[command(
    name = "repochat",
    about = "Chat with a source repository through retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/repochat.toml`. When the file does not exist,
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/repochat.toml")]
    config: PathBuf,

    /// Log progress at info level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered repositories.
    Repos,

    /// Count tokens and estimate ingestion cost for a local directory.
    Estimate {
        /// Directory to walk.
        dir: PathBuf,
    },

    /// Fetch a repository by URL, show its cost, and ingest it on confirmation.
    Add {
        /// Repository URL, e.g. https://github.com/owner/name
        url: String,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Ingest a local directory under a repository name and register it.
    ///
    /// The directory is not removed afterwards.
    Ingest {
        dir: PathBuf,

        /// Repository name to tag chunks with.
        #[arg(long)]
        name: String,
    },

    /// Ask one question about a registered repository.
    Ask {
        #[arg(long)]
        repo: String,

        question: String,
    },

    /// Interactive chat. Prompts for a repository unless --repo is given.
    Chat {
        #[arg(long)]
        repo: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is::<CredentialMissing>() => {
            eprintln!("Error: {}", e);
            eprintln!("Set OPENAI_API_KEY to use the embedding and chat providers.");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_or_minimal(&cli.config)?;

    // Commands that don't need providers
    match &cli.command {
        Commands::Repos => return registry::run_list(&cfg),
        Commands::Estimate { dir } => return cost::run_estimate(&cfg, dir),
        _ => {}
    }

    let mut app = App::open(cfg).await?;

    match cli.command {
        Commands::Repos | Commands::Estimate { .. } => {}
        Commands::Add { url, yes } => {
            workflow::run_add(&mut app, &url, yes).await?;
        }
        Commands::Ingest { dir, name } => {
            ingest::run_ingest(&mut app, &dir, &name).await?;
        }
        Commands::Ask { repo, question } => {
            chat_cmd::run_ask(&app, &repo, &question).await?;
        }
        Commands::Chat { repo } => {
            chat_cmd::run_chat(&mut app, repo).await?;
        }
    }

    Ok(())
}
