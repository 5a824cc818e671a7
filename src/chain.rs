//! Conversational retrieval chain.
//!
//! Per question:
//! 1. With prior turns, ask the chat model to rewrite the question as a
//!    standalone question. Without prior turns the question is used as is.
//! 2. Retrieve chunks for the standalone question from the bound repository.
//! 3. Put the retrieved chunks, labelled with their source paths, into the
//!    answer prompt and ask the chat model to answer.
//!
//! A chain is bound to exactly one repository through its [`Retriever`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use repo_chat_core::models::{ChatTurn, ScoredChunk};
use repo_chat_core::retrieval::Retriever;

use crate::llm::{is_timeout, ChatMessage, ChatModel};

const CONDENSE_INSTRUCTIONS: &str = "Rewrite the follow-up question so it can be understood \
without the conversation. Keep the language of the question. Reply with the rewritten \
question only.";

const ANSWER_INSTRUCTIONS: &str = "You answer questions about a source code repository. \
Use only the excerpts below. If they do not contain the answer, say that you do not know.";

/// Why a question could not be answered. History is never changed when
/// this is returned, so the same question can be asked again.
#[derive(Debug)]
pub enum ChainError {
    Retrieval(String),
    Completion(String),
    Timeout(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Retrieval(e) => write!(f, "retrieval failed: {}", e),
            ChainError::Completion(e) => write!(f, "completion failed: {}", e),
            ChainError::Timeout(e) => write!(f, "provider timed out: {}", e),
        }
    }
}

impl std::error::Error for ChainError {}

impl ChainError {
    fn from_retrieval(err: anyhow::Error) -> Self {
        if is_timeout(&err) {
            ChainError::Timeout(format!("{:#}", err))
        } else {
            ChainError::Retrieval(format!("{:#}", err))
        }
    }

    fn from_completion(err: anyhow::Error) -> Self {
        if is_timeout(&err) {
            ChainError::Timeout(format!("{:#}", err))
        } else {
            ChainError::Completion(format!("{:#}", err))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAnswer {
    pub answer: String,
    /// Source paths of the chunks the answer was grounded on, first use order.
    pub sources: Vec<String>,
}

#[async_trait]
pub trait ConversationalChain: Send + Sync {
    /// Repository this chain retrieves from.
    fn repo(&self) -> &str;

    async fn ask(&self, question: &str, history: &[ChatTurn]) -> Result<ChainAnswer, ChainError>;
}

pub struct RetrievalChain {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
}

impl RetrievalChain {
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>) -> Self {
        Self { retriever, model }
    }

    async fn standalone_question(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, ChainError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let rewritten = self
            .model
            .complete(&condense_messages(question, history))
            .await
            .map_err(ChainError::from_completion)?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}

#[async_trait]
impl ConversationalChain for RetrievalChain {
    fn repo(&self) -> &str {
        self.retriever.repo()
    }

    async fn ask(&self, question: &str, history: &[ChatTurn]) -> Result<ChainAnswer, ChainError> {
        let standalone = self.standalone_question(question, history).await?;
        tracing::debug!(repo = %self.repo(), question = %standalone, "retrieving");

        let chunks = self
            .retriever
            .retrieve(&standalone)
            .await
            .map_err(ChainError::from_retrieval)?;
        if chunks.is_empty() {
            return Err(ChainError::Retrieval(format!(
                "no indexed content for repository '{}'",
                self.repo()
            )));
        }

        let answer = self
            .model
            .complete(&answer_messages(&standalone, &chunks))
            .await
            .map_err(ChainError::from_completion)?;

        Ok(ChainAnswer {
            answer: answer.trim().to_string(),
            sources: distinct_sources(&chunks),
        })
    }
}

/// Prompt asking the model to turn a follow-up into a standalone question.
///
/// Earlier turns are replayed as alternating user and assistant messages.
pub fn condense_messages(question: &str, history: &[ChatTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(CONDENSE_INSTRUCTIONS));
    for turn in history {
        messages.push(ChatMessage::user(turn.question.as_str()));
        messages.push(ChatMessage::assistant(turn.answer.as_str()));
    }
    messages.push(ChatMessage::user(format!("Follow-up question: {}", question)));
    messages
}

/// Prompt with the retrieved excerpts stuffed into the system message.
pub fn answer_messages(question: &str, chunks: &[ScoredChunk]) -> Vec<ChatMessage> {
    let mut context = String::new();
    for scored in chunks {
        context.push_str(&format!(
            "--- {} ---\n{}\n\n",
            scored.chunk.metadata.source, scored.chunk.text
        ));
    }
    vec![
        ChatMessage::system(format!("{}\n\n{}", ANSWER_INSTRUCTIONS, context.trim_end())),
        ChatMessage::user(question),
    ]
}

fn distinct_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for scored in chunks {
        let source = &scored.chunk.metadata.source;
        if !sources.iter().any(|s| s == source) {
            sources.push(source.clone());
        }
    }
    sources
}
