//! Scripted LLM client.
//!
//! Answers each call with the next queued response and records the most
//! recent requests it receives. An exhausted script answers with an
//! `AppError::Llm`.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use groundwork_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Requests kept for inspection; older ones are dropped.
pub const MAX_RECORDED_REQUESTS: usize = 64;

/// LLM client that replays a fixed script.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<VecDeque<LlmRequest>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    /// Create a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client that answers with `responses` in order.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for response in responses {
            client.push_ok(response);
        }
        client
    }

    /// Queue a successful completion.
    pub fn push_ok(&self, content: impl Into<String>) {
        self.lock_script().push_back(Ok(content.into()));
    }

    /// Queue a transport failure.
    pub fn push_err(&self, message: impl Into<String>) {
        self.lock_script().push_back(Err(message.into()));
    }

    /// Up to [`MAX_RECORDED_REQUESTS`] latest requests, oldest first.
    pub fn requests(&self) -> Vec<LlmRequest> {
        let guard = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.iter().cloned().collect()
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, request: &LlmRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.len() == MAX_RECORDED_REQUESTS {
            guard.pop_front();
        }
        guard.push_back(request.clone());
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.record(request);

        let next = self.lock_script().pop_front();
        match next {
            Some(Ok(content)) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::default(),
            }),
            Some(Err(message)) => Err(AppError::Llm(message)),
            None => Err(AppError::Llm("mock script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let client = MockLlmClient::with_responses(["first", "second"]);
        let request = LlmRequest::new("q", "m");

        assert_eq!(client.complete(&request).await.unwrap().content, "first");
        assert_eq!(client.complete(&request).await.unwrap().content, "second");
        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let client = MockLlmClient::new();
        client.push_err("connection refused");

        let err = client
            .complete(&LlmRequest::new("q", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(ref m) if m == "connection refused"));
    }

    #[tokio::test]
    async fn test_records_requests() {
        let client = MockLlmClient::with_responses(["{}"]);
        let request = LlmRequest::new("rank these", "llama3.2").with_system("rubric");
        client.complete(&request).await.unwrap();

        let seen = client.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "rank these");
        assert_eq!(seen[0].system.as_deref(), Some("rubric"));
    }

    #[tokio::test]
    async fn test_history_is_capped_but_calls_are_counted() {
        let client = MockLlmClient::new();
        let total = MAX_RECORDED_REQUESTS + 10;
        for i in 0..total {
            let _ = client.complete(&LlmRequest::new(format!("q{}", i), "m")).await;
        }

        assert_eq!(client.call_count(), total);
        let seen = client.requests();
        assert_eq!(seen.len(), MAX_RECORDED_REQUESTS);
        assert_eq!(seen[0].prompt, "q10");
        assert_eq!(seen[MAX_RECORDED_REQUESTS - 1].prompt, format!("q{}", total - 1));
    }
}
