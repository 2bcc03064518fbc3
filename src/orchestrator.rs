//! Request orchestrator
//!
//! The one entry point for data calls. Reads go through the response cache,
//! writes through the retry policy and, when allowed, the offline queue.
//! Every remote call is bounded by the request timeout.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{CacheKey, ResponseCache};
use crate::client::Mutation;
use crate::error::{ApiError, Error, Result};
use crate::network::NetworkMonitor;
use crate::queue::{DrainReport, MutationExecutor, OfflineQueue};
use crate::retry::{QueueHandoff, RetryPolicy, WriteOutcome};

/// Bound a remote call; running out of time counts as a network failure
pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Network(format!(
            "Request timed out after {}s",
            timeout.as_secs_f64()
        ))
        .into()),
    }
}

/// Executor wrapper applying the request timeout to queue replays
struct Timed<'a> {
    inner: &'a dyn MutationExecutor,
    timeout: Duration,
}

#[async_trait]
impl MutationExecutor for Timed<'_> {
    async fn execute(&self, mutation: &Mutation) -> Result<Value> {
        with_timeout(self.timeout, self.inner.execute(mutation)).await
    }
}

/// Shared handle composing cache, retry policy and offline queue
pub struct RequestOrchestrator {
    executor: Arc<dyn MutationExecutor>,
    network: Arc<NetworkMonitor>,
    cache: Arc<ResponseCache>,
    queue: Arc<OfflineQueue>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl RequestOrchestrator {
    pub fn new(
        executor: Arc<dyn MutationExecutor>,
        network: Arc<NetworkMonitor>,
        cache: Arc<ResponseCache>,
        queue: Arc<OfflineQueue>,
    ) -> Self {
        Self {
            executor,
            network,
            cache,
            queue,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// Cached read. `fetcher` runs only when online; see
    /// [`ResponseCache::query_with_cache`] for the hit/miss behavior.
    pub async fn read<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let timeout = self.request_timeout;
        let fetch_json = move || async move {
            let value = with_timeout(timeout, fetcher()).await?;
            Ok::<Value, Error>(serde_json::to_value(value)?)
        };

        let value = self
            .cache
            .query_with_cache(&self.network, key, ttl, fetch_json)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Write through the retry policy.
    ///
    /// `queueable` writes are deferred to the offline queue on connectivity
    /// failures; pass `false` for writes that must not be replayed later.
    /// A completed write invalidates the resource's cached reads.
    pub async fn write(
        &self,
        mutation: Mutation,
        queueable: bool,
        owner: Option<String>,
    ) -> Result<WriteOutcome<Value>> {
        let label = mutation.label();
        let handoff = queueable.then(|| QueueHandoff {
            queue: &self.queue,
            mutation: mutation.clone(),
            owner,
        });

        let outcome = self
            .retry
            .run(&label, &self.network, handoff, || {
                with_timeout(self.request_timeout, self.executor.execute(&mutation))
            })
            .await?;

        if let WriteOutcome::Completed(_) = outcome {
            self.cache.invalidate_resource(mutation.resource().name());
        }
        Ok(outcome)
    }

    /// Non-cached, non-queueable call with retries (session and profile)
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.request_timeout;
        match self
            .retry
            .run(operation, &self.network, None, || with_timeout(timeout, op()))
            .await?
        {
            WriteOutcome::Completed(value) => Ok(value),
            WriteOutcome::Queued(id) => Err(Error::Other(format!(
                "{} was unexpectedly queued as {}",
                operation, id
            ))),
        }
    }

    /// Replay the offline queue and invalidate what it touched
    pub async fn drain_queue(&self) -> DrainReport {
        let timed = Timed {
            inner: self.executor.as_ref(),
            timeout: self.request_timeout,
        };
        let report = self.queue.drain(&timed, &self.network).await;

        let touched: HashSet<_> = report
            .succeeded
            .iter()
            .map(|op| op.mutation.resource())
            .collect();
        for resource in touched {
            self.cache.invalidate_resource(resource.name());
        }
        report
    }

    /// Give background cache refreshes a bounded chance to land before the
    /// process exits
    pub async fn settle(&self) {
        let grace = self.cache.revalidate_delay() + self.request_timeout;
        self.cache.flush_revalidations(grace).await;
    }

    /// Forget everything cached for the previous principal
    pub fn reset_for_principal_change(&self) {
        let removed = self.cache.clear();
        info!("Principal changed, cleared {} cached responses", removed);
    }
}
