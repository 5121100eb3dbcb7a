//! Deadlines and retries around the external ports.
//!
//! ```text
//! TimedGenerator  → every generate() bounded by the call timeout, never retried
//! ResilientIndex  → every call bounded; reads retried with exponential backoff
//!                   (base, 2·base, 4·base, ...) on Transient / RateLimit errors
//! ```
//!
//! An elapsed deadline surfaces as `ServiceUnavailable` with kind `Timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ResilienceConfig;
use crate::errors::{PipelineError, Service, Unavailability};
use crate::generation::{GenerationRequest, Generator};
use crate::retrieval::{
    EnsureOutcome, IndexSpec, IndexStats, PolicyIndex, PolicyPassage, PolicyRecord, SearchRequest,
};

/// Bounded exponential backoff for idempotent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.retrieval_max_retries,
            base_delay: config.backoff_base(),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `fut` under `deadline`, mapping expiry onto the error taxonomy.
pub async fn with_timeout<T, F>(
    service: Service,
    deadline: Duration,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::unavailable(
            service,
            Unavailability::Timeout,
            format!("no response within {}s", deadline.as_secs_f64()),
        )),
    }
}

/// Retry `op` while it fails with a retriable error and budget remains.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt < policy.max_retries => {
                let backoff = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Generator decorator enforcing the per-call deadline.
pub struct TimedGenerator {
    inner: Arc<dyn Generator>,
    timeout: Duration,
}

impl TimedGenerator {
    pub fn new(inner: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Generator for TimedGenerator {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        with_timeout(
            Service::Generation,
            self.timeout,
            self.inner.generate(request),
        )
        .await
    }
}

/// Index decorator: deadline on every call, backoff on reads.
pub struct ResilientIndex {
    inner: Arc<dyn PolicyIndex>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ResilientIndex {
    pub fn new(inner: Arc<dyn PolicyIndex>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            inner,
            timeout,
            retry,
        }
    }

    pub fn from_config(inner: Arc<dyn PolicyIndex>, config: &ResilienceConfig) -> Self {
        Self::new(
            inner,
            config.call_timeout(),
            RetryPolicy::from_config(config),
        )
    }
}

#[async_trait]
impl PolicyIndex for ResilientIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, PipelineError> {
        retry_with_backoff(self.retry, "ensure_index", || {
            with_timeout(
                Service::Retrieval,
                self.timeout,
                self.inner.ensure_index(spec),
            )
        })
        .await
    }

    async fn upsert(&self, namespace: &str, records: &[PolicyRecord]) -> Result<(), PipelineError> {
        with_timeout(
            Service::Retrieval,
            self.timeout,
            self.inner.upsert(namespace, records),
        )
        .await
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<PolicyPassage>, PipelineError> {
        retry_with_backoff(self.retry, "search", || {
            with_timeout(Service::Retrieval, self.timeout, self.inner.search(request))
        })
        .await
    }

    async fn describe(&self) -> Result<IndexStats, PipelineError> {
        retry_with_backoff(self.retry, "describe", || {
            with_timeout(Service::Retrieval, self.timeout, self.inner.describe())
        })
        .await
    }
}
