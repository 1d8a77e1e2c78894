// Bounded retry executor with exponential backoff
// The executor knows nothing about the operation it wraps: navigation,
// element waits, clicks and whole workflow stages all plug in the same way.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::policy::RetryPolicy;
use crate::observability::WorkflowMetrics;

/// A single attempt exceeded the policy's `attempt_timeout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("attempt timed out after {}ms", .0.as_millis())]
pub struct AttemptTimedOut(pub Duration);

/// Result of one attempt
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    Success(T),
    Failure { error: E, attempt: u32 },
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed; carries the last observed error
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// The call site's `retry_if` predicate refused to retry this error
    #[error("not retried after attempt {attempt}: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Hook invoked after a failed attempt and before the backoff sleep
#[async_trait]
pub trait RetryObserver<E: Sync>: Send + Sync {
    async fn on_retry(&self, error: &E, attempt: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl<E: Sync> RetryObserver<E> for NoopObserver {
    async fn on_retry(&self, _error: &E, _attempt: u32) {}
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    operation: String,
    metrics: Option<Arc<WorkflowMetrics>>,
}

impl RetryExecutor {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `operation` under `policy`, retrying every failure
    pub async fn execute<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AttemptTimedOut> + Display + Send + Sync,
    {
        self.execute_with(policy, operation, &NoopObserver, |_: &E| true)
            .await
    }

    /// Run `operation` under `policy` with an observer and a retry predicate.
    ///
    /// The operation receives the 1-based attempt number. Errors for which
    /// `retry_if` returns false end the call immediately with
    /// [`RetryError::Aborted`].
    pub async fn execute_with<T, E, F, Fut, O, P>(
        &self,
        policy: &RetryPolicy,
        mut operation: F,
        observer: &O,
        retry_if: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AttemptTimedOut> + Display + Send + Sync,
        O: RetryObserver<E> + ?Sized,
        P: Fn(&E) -> bool,
    {
        let total_attempts = policy.total_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_attempt();
            }

            let result = match policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                    Ok(result) => result,
                    Err(_) => Err(E::from(AttemptTimedOut(limit))),
                },
                None => operation(attempt).await,
            };

            let outcome = match result {
                Ok(value) => AttemptOutcome::Success(value),
                Err(error) => AttemptOutcome::Failure { error, attempt },
            };

            let (error, attempt) = match outcome {
                AttemptOutcome::Success(value) => {
                    debug!(operation = %self.operation, attempt, "Operation succeeded");
                    return Ok(value);
                }
                AttemptOutcome::Failure { error, attempt } => (error, attempt),
            };

            if !retry_if(&error) {
                warn!(
                    operation = %self.operation,
                    attempt,
                    error = %error,
                    "Operation failed (non-retryable)"
                );
                return Err(RetryError::Aborted { attempt, error });
            }

            if attempt >= total_attempts {
                error!(
                    operation = %self.operation,
                    attempts = attempt,
                    error = %error,
                    "Operation failed, retries exhausted"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_exhausted();
                }
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = policy.jittered(policy.delay_before_retry(attempt));
            warn!(
                operation = %self.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_retry();
            }

            observer.on_retry(&error, attempt).await;
            tokio::time::sleep(delay).await;
        }
    }
}
