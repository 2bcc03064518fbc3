//! Exponential backoff with jitter, handing writes to the offline queue
//!
//! Each call is independent: the attempt counter lives on the stack of one
//! `run` invocation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;

use crate::client::Mutation;
use crate::error::{ApiError, ErrorClass, Result};
use crate::network::NetworkMonitor;
use crate::queue::OfflineQueue;

/// Result of a write that may have been deferred
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The platform accepted the write
    Completed(T),
    /// The write is parked in the offline queue under this id
    Queued(String),
}

impl<T> WriteOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, WriteOutcome::Queued(_))
    }
}

/// Where a queueable write goes if it cannot complete now
pub struct QueueHandoff<'a> {
    pub queue: &'a OfflineQueue,
    pub mutation: Mutation,
    pub owner: Option<String>,
}

impl QueueHandoff<'_> {
    fn enqueue<T>(self, operation: &str, reason: &str) -> Result<WriteOutcome<T>> {
        let id = self.queue.enqueue(self.mutation, self.owner)?;
        info!("{}: {}, queued as {}", operation, reason, id);
        Ok(WriteOutcome::Queued(id))
    }
}

/// Backoff parameters
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Relative jitter; 0.1 spreads delays over ±10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 1.5,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Default::default()
        }
    }

    /// Un-jittered delay before retry number `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.initial_delay
            .mul_f64(self.multiplier.max(1.0).powi(exponent))
    }

    /// Jittered delay before retry number `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        base.mul_f64(factor)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// With a `handoff`, connectivity problems (and, as a last resort,
    /// exhausted retries) park the write in the offline queue instead of
    /// failing. Without one, the final error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        network: &Arc<NetworkMonitor>,
        mut handoff: Option<QueueHandoff<'_>>,
        mut op: F,
    ) -> Result<WriteOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if network.is_offline() {
            return match handoff.take() {
                Some(handoff) => handoff.enqueue(operation, "offline"),
                None => {
                    Err(ApiError::Network(format!("offline; {} not attempted", operation)).into())
                }
            };
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(WriteOutcome::Completed(value));
                }
                Err(e) => e,
            };

            let class = err.class();
            warn!(
                "{} failed on attempt {}/{} ({}): {}",
                operation,
                attempt,
                self.max_retries + 1,
                class,
                err
            );

            if class == ErrorClass::Network
                && let Some(handoff) = handoff.take()
            {
                return handoff.enqueue(operation, "network unavailable");
            }

            if !class.is_retryable() {
                return Err(err);
            }

            if attempt > self.max_retries {
                return match handoff.take() {
                    Some(handoff) => handoff.enqueue(operation, "retries exhausted"),
                    None => Err(err),
                };
            }

            let delay = self.delay(attempt);
            debug!("Retrying {} in {:?}", operation, delay);
            tokio::time::sleep(delay).await;
        }
    }
}
