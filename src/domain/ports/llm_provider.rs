use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Provider failures. Display strings keep the words "timeout",
/// "rate limit" and "network" so job messages stay greppable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("LLM request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("LLM rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("LLM network error: {0}")]
    Network(String),
    #[error("LLM authentication failed: {0}")]
    Auth(String),
    #[error("LLM provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("LLM returned malformed response: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn category(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "timeout",
            GenerationError::RateLimited(_) => "rate-limit",
            GenerationError::Network(_) => "network",
            GenerationError::Auth(_) => "auth",
            GenerationError::Provider { .. } => "provider",
            GenerationError::Malformed(_) => "malformed",
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One chat completion; returns the assistant text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError>;
}
