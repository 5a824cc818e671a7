//! Chat completion providers.
//!
//! [`ChatModel`] is the seam between the conversational chain and the
//! provider. [`OpenAIChatModel`] calls `POST {base_url}/chat/completions`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::{ChatConfig, Credentials};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Return the assistant reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// A provider request exceeded its configured timeout.
///
/// Providers wrap timed-out requests in this type so callers can tell a
/// timeout apart from other failures with [`is_timeout`].
#[derive(Debug)]
pub struct RequestTimeout {
    pub what: String,
}

impl fmt::Display for RequestTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} timed out", self.what)
    }
}

impl std::error::Error for RequestTimeout {}

pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<RequestTimeout>())
}

/// Map a transport error, turning timeouts into [`RequestTimeout`].
pub(crate) fn transport_error(err: reqwest::Error, what: &str) -> anyhow::Error {
    if err.is_timeout() {
        anyhow::Error::new(RequestTimeout {
            what: what.to_string(),
        })
    } else {
        anyhow::Error::new(err).context(format!("{} failed", what))
    }
}

pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    config: ChatConfig,
}

impl OpenAIChatModel {
    pub fn new(config: &ChatConfig, credentials: &Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: credentials.openai_api_key.clone(),
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "chat completion request"))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, "chat completion response"))?;
        parse_completion_response(&json)
    }
}

/// Extract `choices[0].message.content`.
pub fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_completion() {
        let body = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "It parses TOML."}}]
        });
        assert_eq!(parse_completion_response(&body).unwrap(), "It parses TOML.");
    }

    #[test]
    fn test_parse_completion_missing_choices() {
        assert!(parse_completion_response(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(msg, json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_is_timeout_through_context() {
        let err = anyhow::Error::new(RequestTimeout {
            what: "embedding request".into(),
        })
        .context("retrieval failed");
        assert!(is_timeout(&err));
        assert!(!is_timeout(&anyhow::anyhow!("boom")));
    }
}
