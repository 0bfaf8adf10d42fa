pub mod json_repair;
#[cfg(test)]
pub mod mock;
pub mod openai;

pub use json_repair::*;
#[cfg(test)]
pub use mock::*;
pub use openai::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Invalid LLM endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("LLM returned no choices")]
    EmptyResponse,

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("LLM request rejected: {0}")]
    InvalidRequest(String),
}

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
    /// Short label used in logs (e.g. "next_question").
    pub task: &'static str,
}

impl CompletionRequest {
    pub fn json(task: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            max_tokens: 800,
            json_mode: true,
            task,
        }
    }

    pub fn text(task: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            json_mode: false,
            ..Self::json(task, system, user)
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Abstraction over the completion backend (enables mock testing).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}
