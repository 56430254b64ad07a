//! Deadline and retry policy for remote calls
//!
//! Every attempt is bounded by a timeout. Only `BackendUnavailable` is retried,
//! with a fixed backoff schedule. Uploads get the deadline but no retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use super::reader::{ensure_full_range, RangeSource, SeekableRemoteReader};
use super::{RemoteStore, StoreError};
use crate::media::MediaFile;
use crate::principal::Principal;

/// Default per-attempt timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of retries for retryable errors
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Timeout and retry parameters applied to each remote call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry N (the last entry repeats)
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            backoff: [500, 1000, 2000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .get(attempt as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    async fn attempt<Fut, T>(&self, operation: &str, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::BackendUnavailable(format!(
                "{} timed out after {:?}",
                operation, self.timeout
            ))),
        }
    }

    /// Run `f` under the deadline, retrying `BackendUnavailable` failures
    pub async fn run<F, Fut, T>(&self, operation: &str, file_id: &str, f: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(operation, f()).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    warn!(
                        operation = operation,
                        file_id = file_id,
                        attempt = attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying remote operation"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(operation = operation, file_id = file_id, error = %e, "Remote operation failed");
                    return Err(e);
                }
            }
        }
    }

    /// Run a single attempt under the deadline
    pub async fn run_once<Fut, T>(&self, operation: &str, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.attempt(operation, fut).await
    }
}

/// RangeSource wrapper that bounds and retries each range fetch
struct RetryingSource {
    inner: Arc<dyn RangeSource>,
    policy: RetryPolicy,
}

#[async_trait]
impl RangeSource for RetryingSource {
    async fn fetch_range(
        &self,
        principal: &Principal,
        file_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StoreError> {
        let inner = &self.inner;
        self.policy
            .run("fetch_range", file_id, move || async move {
                let bytes = inner.fetch_range(principal, file_id, start, end).await?;
                ensure_full_range(&bytes, file_id, start, end)?;
                Ok(bytes)
            })
            .await
    }
}

/// RemoteStore wrapper applying a RetryPolicy to every call
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn generate_id(&self, principal: &Principal) -> Result<String, StoreError> {
        let inner = &self.inner;
        self.policy
            .run("generate_id", "", move || inner.generate_id(principal))
            .await
    }

    async fn save(&self, principal: &Principal, file: &MediaFile) -> Result<(), StoreError> {
        self.policy
            .run_once("save", self.inner.save(principal, file))
            .await
    }

    async fn get(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<SeekableRemoteReader, StoreError> {
        let inner = &self.inner;
        let reader = self
            .policy
            .run("get", file_id, move || inner.get(principal, file_id))
            .await?;

        let policy = self.policy.clone();
        Ok(reader.map_source(move |source| -> Arc<dyn RangeSource> {
            Arc::new(RetryingSource {
                inner: source,
                policy,
            })
        }))
    }
}
