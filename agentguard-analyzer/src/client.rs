//! Rate-limited, timeout-bounded Anthropic HTTP client.

use crate::types::{ApiError, MessageRequest, MessageResponse};
use agentguard_core::AnalyzerError;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Anthropic Messages API client with a semaphore-bounded rate limiter and
/// an explicit per-call timeout deadline, since the backend is a metered
/// external collaborator the classifier must never block on indefinitely.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    started_at: Instant,
}

impl AnthropicClient {
    /// `requests_per_minute` bounds both the number of concurrent in-flight
    /// requests and the minimum spacing between them.
    pub fn new(api_key: impl Into<String>, requests_per_minute: u32) -> Self {
        let permits = (requests_per_minute as usize).max(1);
        let min_interval_ms = (60_000 / requests_per_minute.max(1) as u64).max(10);

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            rate_limiter: Arc::new(Semaphore::new(permits)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            started_at: Instant::now(),
        }
    }

    /// Point this client at a non-default base URL (test doubles).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a `messages` request, bounded by `timeout`. Any failure —
    /// transport, non-2xx, malformed body, deadline exceeded — comes back
    /// as an [`AnalyzerError`]; callers fall back rather than propagate.
    pub async fn send(
        &self,
        body: MessageRequest,
        timeout: Duration,
    ) -> Result<MessageResponse, AnalyzerError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| AnalyzerError::Transport { reason: "rate limiter closed".to_string() })?;

        let now_ms = self.started_at.elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);
        if elapsed < self.min_request_interval_ms {
            tokio::time::sleep(Duration::from_millis(self.min_request_interval_ms - elapsed)).await;
        }
        self.last_request.store(self.started_at.elapsed().as_millis() as u64, Ordering::Relaxed);

        let url = format!("{}/messages", self.base_url);
        let request_future = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = tokio::time::timeout(timeout, request_future)
            .await
            .map_err(|_| AnalyzerError::Timeout { timeout_ms: timeout.as_millis() as u64 })?
            .map_err(|e| AnalyzerError::Transport { reason: e.to_string() })?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| AnalyzerError::InvalidResponse { reason: e.to_string() })
        } else {
            let text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            Err(match status {
                StatusCode::TOO_MANY_REQUESTS => AnalyzerError::RateLimited { retry_after_ms: 1000 },
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AnalyzerError::InvalidApiKey,
                _ => AnalyzerError::Transport { reason: message },
            })
        }
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
