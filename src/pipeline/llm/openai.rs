use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{CompletionRequest, LlmClient, LlmError};
use crate::config::LlmConfig;

/// Attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Zeroizing<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = validate_base_url(&config.base_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to create HTTP client: {e}")))?;

        tracing::info!(base_url = %base_url, model = %config.model, "LLM client created");

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if request.user.trim().is_empty() {
            return Err(LlmError::InvalidRequest("user content cannot be empty".into()));
        }

        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.user,
        });

        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let url = self.endpoint();
        let mut last_error = LlmError::Transport("no attempt made".into());

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = calculate_backoff(attempt - 1);
                tracing::warn!(
                    task = request.task,
                    attempt,
                    ?backoff,
                    "LLM call failed, retrying: {last_error}"
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(self.api_key.as_str())
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if is_retryable_error(&e) => {
                    last_error = LlmError::Transport(e.to_string());
                    continue;
                }
                Err(e) => return Err(LlmError::Transport(e.to_string())),
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = LlmError::Status {
                    status: status.as_u16(),
                    body,
                };
                if is_retryable_status(status) {
                    last_error = err;
                    continue;
                }
                tracing::error!(task = request.task, "LLM call rejected: {err}");
                return Err(err);
            }

            let parsed: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or(LlmError::EmptyResponse)?;

            tracing::debug!(task = request.task, chars = content.len(), "LLM call completed");
            return Ok(content);
        }

        tracing::error!(
            task = request.task,
            attempts = MAX_ATTEMPTS,
            "LLM call failed: {last_error}"
        );
        Err(last_error)
    }
}

/// Accept only http(s) URLs without embedded credentials.
fn validate_base_url(raw: &str) -> Result<String, LlmError> {
    let cleaned = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(cleaned)
        .map_err(|e| LlmError::InvalidEndpoint(format!("'{cleaned}': {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LlmError::InvalidEndpoint(format!(
            "scheme must be http or https, got {}",
            parsed.scheme()
        )));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(LlmError::InvalidEndpoint(
            "URL must not contain credentials".into(),
        ));
    }
    Ok(cleaned.to_string())
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    err.status().is_some_and(is_retryable_status)
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Exponential backoff, capped, with up to 100ms jitter.
fn calculate_backoff(attempt: u32) -> Duration {
    let base = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    let jitter = rand::random::<u64>() % 100;
    Duration::from_millis(base.min(MAX_BACKOFF_MS) + jitter)
}
