//! Retry wrapper for transient provider failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

const BASE_DELAY: Duration = Duration::from_millis(250);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Retries transient errors with exponential backoff and jitter.
pub struct RetryProvider {
    inner: Arc<dyn LlmProvider>,
    max_retries: u32,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }
}

/// Backoff for the given attempt (0-based), honouring a provider hint.
pub(crate) fn backoff_delay(attempt: u32, hint: Option<Duration>) -> Duration {
    if let Some(hint) = hint {
        return hint.min(MAX_DELAY);
    }
    let exp = BASE_DELAY.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis() as u64 / 4);
    exp + Duration::from_millis(jitter_ms)
}

#[async_trait]
impl LlmProvider for RetryProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        self.inner.cost_per_token()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let hint = match &err {
                        LlmError::RateLimited { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    let delay = backoff_delay(attempt, hint);
                    tracing::warn!(
                        model = self.inner.model_name(),
                        attempt = attempt + 1,
                        ?delay,
                        "LLM call failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
