//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::{ModelBackend, ModelRequest};
use crate::error::Result;
use crate::types::{ModelResponse, ModelStreamEvent};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Execute an async operation, retrying errors that report
    /// [`crate::BatonError::is_retryable`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.max_attempts.max(1) {
                        return Err(e);
                    }

                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Retrying backend call"
                    );

                    // Jitter: 75%-125% of backoff
                    let jitter_factor = 0.75 + (rand_factor() * 0.5);
                    tokio::time::sleep(Duration::from_secs_f64(
                        backoff.as_secs_f64() * jitter_factor,
                    ))
                    .await;

                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.multiplier)
                            .min(self.max_backoff.as_secs_f64()),
                    );
                }
            }
        }
    }
}

/// Backend decorator that retries transient failures.
///
/// Streaming calls are retried only while opening the stream; errors after
/// the first event are passed through.
pub struct RetryingBackend {
    inner: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ModelBackend for RetryingBackend {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.policy
            .execute(move || self.inner.generate(request))
            .await
    }

    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>> {
        self.policy
            .execute(move || self.inner.stream(request))
            .await
    }
}

/// Pseudo-random factor in [0, 1) derived from the clock.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    (hasher.finish() % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BatonError, ErrorCode};
    use crate::model::ScriptedBackend;
    use crate::types::{Item, ModelSettings};

    fn request() -> ModelRequest {
        ModelRequest {
            agent: "a".into(),
            instructions: String::new(),
            input: vec![Item::user("hi")],
            tools: vec![],
            settings: ModelSettings::default(),
            output_schema: None,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let inner = Arc::new(ScriptedBackend::from_results([
            Err(BatonError::backend(ErrorCode::ServiceUnavailable, "busy")),
            Err(BatonError::backend(ErrorCode::RateLimitExceeded, "slow")),
            Ok(ModelResponse::message("done")),
        ]));
        let backend = RetryingBackend::new(inner.clone(), fast_policy());

        let response = backend.generate(&request()).await.unwrap();

        assert_eq!(response.items, vec![Item::assistant("done")]);
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_fail_immediately() {
        let inner = Arc::new(ScriptedBackend::from_results([
            Err(BatonError::backend(ErrorCode::InvalidRequest, "bad")),
            Ok(ModelResponse::message("unreachable")),
        ]));
        let backend = RetryingBackend::new(inner.clone(), fast_policy());

        let err = backend.generate(&request()).await.unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(inner.call_count(), 1);
    }
}
