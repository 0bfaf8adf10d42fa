use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CompletionRequest, LlmClient, LlmError};

/// Scripted LLM for unit tests.
///
/// Replies are consumed in order. When the script runs out every call
/// fails with `LlmError::Transport`, which exercises the fallback paths.
#[derive(Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(error));
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(LlmError::Transport("mock script exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_in_order_then_fails() {
        let mock = MockLlmClient::with_replies(["first", "second"]);
        let req = CompletionRequest::text("test", "sys", "hello");
        assert_eq!(mock.complete(&req).await.unwrap(), "first");
        assert_eq!(mock.complete(&req).await.unwrap(), "second");
        assert!(mock.complete(&req).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn scripted_errors_surface() {
        let mock = MockLlmClient::new();
        mock.push_error(LlmError::EmptyResponse);
        let err = mock
            .complete(&CompletionRequest::json("test", "", "x"))
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::EmptyResponse);
        assert_eq!(mock.requests()[0].task, "test");
    }
}
