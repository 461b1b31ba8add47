//! Requests-per-minute ceiling for any `LlmProvider`.
//!
//! Callers over the limit wait for a slot instead of failing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter: at most `limit` admissions in any `window`.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a slot is free, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();
                while admitted
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    admitted.pop_front();
                }
                if admitted.len() < self.limit {
                    admitted.push_back(now);
                    return;
                }
                match admitted.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "LLM rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Wraps a provider so that every `complete` call passes the RPM limiter first.
pub struct RateLimitedProvider {
    inner: Arc<dyn LlmProvider>,
    limiter: SlidingWindow,
}

impl RateLimitedProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, requests_per_minute: u32) -> Self {
        Self {
            inner,
            limiter: SlidingWindow::new(requests_per_minute as usize, WINDOW),
        }
    }
}

#[async_trait]
impl LlmProvider for RateLimitedProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.limiter.acquire().await;
        self.inner.complete(request).await
    }
}
