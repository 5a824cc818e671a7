//! Retrieval session: the active repository, its chain, and the chat history.
//!
//! Binding a different repository replaces the chain and clears history in
//! one step, so a chain built for one repository is never used with another.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use repo_chat_core::embedding::Embedder;
use repo_chat_core::models::{transcript, ChatTurn, TranscriptEntry};
use repo_chat_core::retrieval::Retriever;
use repo_chat_core::store::{MetadataFilter, VectorStore};

use crate::chain::{ChainAnswer, ChainError, ConversationalChain, RetrievalChain};
use crate::config::RetrievalConfig;
use crate::llm::ChatModel;

/// The repository currently bound to a session.
pub struct BoundRepository {
    pub repo: String,
    chain: Box<dyn ConversationalChain>,
    history: Vec<ChatTurn>,
}

pub enum SessionState {
    NoRepoSelected,
    Bound(BoundRepository),
}

#[derive(Debug)]
pub enum AskError {
    NoRepoSelected,
    Chain(ChainError),
}

impl fmt::Display for AskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AskError::NoRepoSelected => f.write_str("no repository selected"),
            AskError::Chain(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AskError {}

impl From<ChainError> for AskError {
    fn from(err: ChainError) -> Self {
        AskError::Chain(err)
    }
}

pub struct Session {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    retrieval: RetrievalConfig,
    state: SessionState,
}

impl Session {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            retrieval,
            state: SessionState::NoRepoSelected,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_repo(&self) -> Option<&str> {
        match &self.state {
            SessionState::Bound(bound) => Some(&bound.repo),
            SessionState::NoRepoSelected => None,
        }
    }

    /// Bind `repo`. Returns the number of chunks stored for it.
    ///
    /// Re-selecting the bound repository keeps the session as is. Any other
    /// name gets a fresh retriever, chain, and empty history.
    pub async fn select_repository(&mut self, repo: &str) -> Result<usize> {
        let stored = self.store.count(&MetadataFilter::repo(repo)).await?;
        if stored == 0 {
            tracing::warn!(repo = %repo, "selected repository has no stored chunks");
        }

        if self.current_repo() == Some(repo) {
            return Ok(stored);
        }

        let retriever = Retriever::new(
            self.store.clone(),
            self.embedder.clone(),
            self.retrieval.for_repo(repo),
        );
        let chain = RetrievalChain::new(retriever, self.model.clone());
        self.bind(repo, Box::new(chain));
        Ok(stored)
    }

    /// Bind `repo` to an already built chain.
    pub fn bind(&mut self, repo: &str, chain: Box<dyn ConversationalChain>) {
        tracing::info!(repo = %repo, "session bound");
        self.state = SessionState::Bound(BoundRepository {
            repo: repo.to_string(),
            chain,
            history: Vec::new(),
        });
    }

    /// Drop the binding and its history.
    pub fn deselect(&mut self) {
        self.state = SessionState::NoRepoSelected;
    }

    /// Ask the bound chain. The turn is recorded only when an answer comes back.
    pub async fn ask(&mut self, question: &str) -> Result<ChainAnswer, AskError> {
        let bound = match &mut self.state {
            SessionState::Bound(bound) => bound,
            SessionState::NoRepoSelected => return Err(AskError::NoRepoSelected),
        };

        let answer = bound.chain.ask(question, &bound.history).await?;
        bound.history.push(ChatTurn {
            question: question.to_string(),
            answer: answer.answer.clone(),
        });
        Ok(answer)
    }

    pub fn history(&self) -> &[ChatTurn] {
        match &self.state {
            SessionState::Bound(bound) => bound.history.as_slice(),
            SessionState::NoRepoSelected => &[],
        }
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        transcript(self.history())
    }
}
