//! Process-wide collaborators: the shared vector store, the providers, and
//! the repository registry.

use std::sync::Arc;

use anyhow::Result;

use repo_chat_core::embedding::Embedder;
use repo_chat_core::store::VectorStore;

use crate::config::{Config, Credentials};
use crate::embedding::OpenAIEmbedder;
use crate::llm::{ChatModel, OpenAIChatModel};
use crate::registry::RepoRegistry;
use crate::session::Session;
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn ChatModel>,
    pub registry: RepoRegistry,
}

impl App {
    /// Open the SQLite store and registry and build the OpenAI providers.
    ///
    /// Fails with [`CredentialMissing`](crate::config::CredentialMissing)
    /// before touching the database when `OPENAI_API_KEY` is not set.
    pub async fn open(config: Config) -> Result<Self> {
        let credentials = Credentials::from_env()?;
        let store = SqliteStore::open(&config.db.path).await?;
        let embedder = OpenAIEmbedder::new(&config.embedding, &credentials)?;
        let model = OpenAIChatModel::new(&config.chat, &credentials)?;
        let registry = RepoRegistry::load(&config.registry.path)?;

        Ok(Self::with_parts(
            config,
            Arc::new(store),
            Arc::new(embedder),
            Arc::new(model),
            registry,
        ))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        registry: RepoRegistry,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            model,
            registry,
        }
    }

    /// A fresh session with no repository selected.
    pub fn session(&self) -> Session {
        Session::new(
            self.store.clone(),
            self.embedder.clone(),
            self.model.clone(),
            self.config.retrieval.clone(),
        )
    }
}
