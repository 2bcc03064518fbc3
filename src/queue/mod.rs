//! Durable offline write queue
//!
//! Writes that could not reach the platform wait here as [`Mutation`]
//! descriptors and are replayed in FIFO attempt order once connectivity
//! returns. The queue is persisted on every change, so a restart loses
//! nothing but in-flight executions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::client::{DataApi, Mutation};
use crate::error::{Error, Result};
use crate::network::NetworkMonitor;
use crate::storage::{self, DurableStore};

/// Durable store key holding the serialized queue
pub const QUEUE_KEY: &str = "offline_queue";

/// Turns a queued descriptor back into a remote call
#[async_trait]
pub trait MutationExecutor: Send + Sync {
    async fn execute(&self, mutation: &Mutation) -> Result<Value>;
}

#[async_trait]
impl<T: DataApi + ?Sized> MutationExecutor for T {
    async fn execute(&self, mutation: &Mutation) -> Result<Value> {
        self.mutate(mutation).await
    }
}

/// A write waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: String,
    pub mutation: Mutation,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Principal that issued the write, if any
    #[serde(default)]
    pub owner: Option<String>,
}

/// A queued write that used up its attempts
#[derive(Debug, Clone)]
pub struct QueueFailure {
    pub operation: QueuedOperation,
    pub message: String,
}

impl QueueFailure {
    pub fn to_error(&self) -> Error {
        Error::QueueExhausted {
            id: self.operation.id.clone(),
            kind: self.operation.mutation.label(),
            attempts: self.operation.attempt_count,
        }
    }
}

/// What one `drain()` call did
#[derive(Debug, Default)]
pub struct DrainReport {
    pub executed: usize,
    pub succeeded: Vec<QueuedOperation>,
    pub requeued: usize,
    pub failed: Vec<QueueFailure>,
    /// A drain was already running; this call only asked it to go again
    pub coalesced: bool,
    /// Entries left when the drain stopped (non-zero if connectivity dropped)
    pub remaining: usize,
    /// The platform rejected the session; the drain stopped with the
    /// rejected entry back at the head and its attempt not counted
    pub rejected: Option<String>,
}

impl DrainReport {
    pub(crate) fn absorb(&mut self, other: DrainReport) {
        self.executed += other.executed;
        self.succeeded.extend(other.succeeded);
        self.requeued += other.requeued;
        self.failed.extend(other.failed);
        self.remaining = other.remaining;
        if other.rejected.is_some() {
            self.rejected = other.rejected;
        }
    }
}

/// Bounded FIFO of pending writes backed by a [`DurableStore`]
pub struct OfflineQueue {
    store: Arc<dyn DurableStore>,
    entries: Mutex<VecDeque<QueuedOperation>>,
    capacity: usize,
    max_attempts: u32,
    draining: AtomicBool,
    rerun: AtomicBool,
    failures: broadcast::Sender<QueueFailure>,
}

impl OfflineQueue {
    /// Open the queue, restoring whatever a previous process left behind
    pub fn new(store: Arc<dyn DurableStore>, capacity: usize, max_attempts: u32) -> Self {
        let entries = match storage::load_json::<VecDeque<QueuedOperation>>(store.as_ref(), QUEUE_KEY)
        {
            Ok(Some(entries)) => {
                if !entries.is_empty() {
                    debug!("Restored {} queued operations", entries.len());
                }
                entries
            }
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!("Discarding unreadable offline queue: {}", e);
                VecDeque::new()
            }
        };
        let (failures, _) = broadcast::channel(64);

        Self {
            store,
            entries: Mutex::new(entries),
            capacity: capacity.max(1),
            max_attempts: max_attempts.max(1),
            draining: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            failures,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedOperation>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &VecDeque<QueuedOperation>) -> Result<()> {
        storage::save_json(self.store.as_ref(), QUEUE_KEY, entries)
    }

    /// Persist after a drain step; the in-memory queue stays authoritative
    fn persist_logged(&self, entries: &VecDeque<QueuedOperation>) {
        if let Err(e) = self.persist(entries) {
            warn!("Failed to persist offline queue: {}", e);
        }
    }

    /// Append a write. When full, the oldest entry is evicted to make room.
    pub fn enqueue(&self, mutation: Mutation, owner: Option<String>) -> Result<String> {
        let operation = QueuedOperation {
            id: uuid::Uuid::new_v4().to_string(),
            mutation,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            max_attempts: self.max_attempts,
            owner,
        };
        let id = operation.id.clone();

        let mut entries = self.lock();
        let snapshot = entries.clone();
        entries.push_back(operation);
        while entries.len() > self.capacity {
            if let Some(evicted) = entries.pop_front() {
                warn!(
                    "Offline queue full, dropping oldest {} ({})",
                    evicted.mutation.label(),
                    evicted.id
                );
            }
        }

        if let Err(e) = self.persist(&entries) {
            *entries = snapshot;
            return Err(e);
        }

        info!("Queued {} for when connectivity returns", id);
        Ok(id)
    }

    /// Replay queued writes in order.
    ///
    /// A failed entry goes to the tail until it runs out of attempts, so
    /// later entries are never stuck behind it. Stops early if the network
    /// drops or the platform rejects the session; a rejection costs the
    /// entry no attempt, since a fresh session may well succeed. A call made while another drain runs is coalesced into it.
    pub async fn drain<E: MutationExecutor + ?Sized>(
        &self,
        executor: &E,
        network: &NetworkMonitor,
    ) -> DrainReport {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("Drain already running, coalescing");
            self.rerun.store(true, Ordering::SeqCst);
            return DrainReport {
                coalesced: true,
                remaining: self.len(),
                ..Default::default()
            };
        }

        let mut report = DrainReport::default();
        loop {
            self.rerun.store(false, Ordering::SeqCst);
            let pass = self.drain_pass(executor, network).await;
            report.absorb(pass);

            if report.rejected.is_none() && self.rerun.load(Ordering::SeqCst) {
                continue;
            }
            self.draining.store(false, Ordering::SeqCst);

            // A request landing between the check and the release would be lost
            if self.rerun.swap(false, Ordering::SeqCst)
                && report.rejected.is_none()
                && !self.draining.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            break;
        }

        if report.executed > 0 {
            info!(
                "Drained offline queue: {} succeeded, {} requeued, {} failed, {} remaining",
                report.succeeded.len(),
                report.requeued,
                report.failed.len(),
                report.remaining
            );
        }
        report
    }

    async fn drain_pass<E: MutationExecutor + ?Sized>(
        &self,
        executor: &E,
        network: &NetworkMonitor,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if network.is_offline() {
                debug!("Connectivity lost mid-drain, stopping");
                break;
            }
            let Some(mut operation) = self.lock().pop_front() else {
                break;
            };

            let attempt = operation.attempt_count + 1;
            debug!(
                "Replaying {} ({}), attempt {}/{}",
                operation.mutation.label(),
                operation.id,
                attempt,
                operation.max_attempts
            );
            report.executed += 1;
            let result = executor.execute(&operation.mutation).await;

            let mut entries = self.lock();
            match result {
                Ok(_) => {
                    self.persist_logged(&entries);
                    drop(entries);
                    report.succeeded.push(operation);
                }
                Err(e) if e.is_authorization() => {
                    warn!(
                        "Replay of {} ({}) rejected by the platform, pausing drain: {}",
                        operation.mutation.label(),
                        operation.id,
                        e
                    );
                    entries.push_front(operation);
                    self.persist_logged(&entries);
                    drop(entries);
                    report.rejected = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    operation.attempt_count = attempt;
                    if operation.attempt_count < operation.max_attempts {
                        debug!(
                            "Replay of {} failed ({}), requeueing: {}",
                            operation.id,
                            e.class(),
                            e
                        );
                        entries.push_back(operation);
                        self.persist_logged(&entries);
                        report.requeued += 1;
                    } else {
                        self.persist_logged(&entries);
                        drop(entries);
                        error!(
                            "Queued {} ({}) failed permanently after {} attempts ({}): {}",
                            operation.mutation.label(),
                            operation.id,
                            operation.attempt_count,
                            e.class(),
                            e
                        );
                        let failure = QueueFailure {
                            operation,
                            message: e.to_string(),
                        };
                        let _ = self.failures.send(failure.clone());
                        report.failed.push(failure);
                    }
                }
            }
        }

        report.remaining = self.len();
        report
    }

    /// Drop every entry issued by `owner`. Returns how many were removed.
    pub fn purge_owner(&self, owner: &str) -> Result<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|op| op.owner.as_deref() != Some(owner));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
            info!("Discarded {} queued operations for signed-out user", removed);
        }
        Ok(removed)
    }

    /// Snapshot of pending entries in queue order
    pub fn list(&self) -> Vec<QueuedOperation> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove everything. Returns how many entries were dropped.
    pub fn clear(&self) -> Result<usize> {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        self.persist(&entries)?;
        Ok(removed)
    }

    /// Receive permanently failed writes
    pub fn subscribe_failures(&self) -> broadcast::Receiver<QueueFailure> {
        self.failures.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Resource;
    use crate::error::ApiError;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Executor failing each target a scripted number of times
    #[derive(Default)]
    struct ScriptedExecutor {
        failures_left: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<(String, bool)>>,
        delay: Option<Duration>,
        reject_session: bool,
    }

    impl ScriptedExecutor {
        fn failing(target: &str, times: u32) -> Self {
            let exec = Self::default();
            exec.failures_left
                .lock()
                .unwrap()
                .insert(target.to_string(), times);
            exec
        }

        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MutationExecutor for ScriptedExecutor {
        async fn execute(&self, mutation: &Mutation) -> Result<Value> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let target = mutation.target().unwrap_or_default().to_string();
            if self.reject_session {
                self.calls.lock().unwrap().push((target, false));
                return Err(ApiError::Unauthorized.into());
            }
            let fail = {
                let mut left = self.failures_left.lock().unwrap();
                match left.get_mut(&target) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        true
                    }
                    _ => false,
                }
            };
            self.calls.lock().unwrap().push((target, !fail));
            if fail {
                Err(ApiError::Network("connection reset".to_string()).into())
            } else {
                Ok(Value::Null)
            }
        }
    }

    fn update(id: &str) -> Mutation {
        Mutation::Update {
            resource: Resource::Schools,
            id: id.to_string(),
            data: json!({"name": id}),
        }
    }

    fn queue(capacity: usize) -> (OfflineQueue, Arc<dyn DurableStore>) {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        (OfflineQueue::new(Arc::clone(&store), capacity, 3), store)
    }

    #[test]
    fn test_enqueue_starts_at_zero_attempts() {
        let (queue, _) = queue(10);
        let id = queue.enqueue(update("a"), Some("u-1".to_string())).unwrap();

        let ops = queue.list();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, id);
        assert_eq!(ops[0].attempt_count, 0);
        assert_eq!(ops[0].max_attempts, 3);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (queue, _) = queue(2);
        queue.enqueue(update("a"), None).unwrap();
        queue.enqueue(update("b"), None).unwrap();
        queue.enqueue(update("c"), None).unwrap();

        let targets: Vec<_> = queue
            .list()
            .iter()
            .map(|op| op.mutation.target().unwrap().to_string())
            .collect();
        assert_eq!(targets, vec!["b", "c"]);
    }

    #[test]
    fn test_survives_restart() {
        let (queue, store) = queue(10);
        queue.enqueue(update("a"), None).unwrap();
        queue.enqueue(update("b"), None).unwrap();
        drop(queue);

        let restored = OfflineQueue::new(store, 10, 3);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.list()[0].mutation, update("a"));
    }

    #[test]
    fn test_corrupt_persisted_queue_starts_empty() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        store.set(QUEUE_KEY, "not json").unwrap();
        let queue = OfflineQueue::new(store, 10, 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_block_later_ones() {
        let (queue, _) = queue(10);
        queue.enqueue(update("a"), None).unwrap();
        queue.enqueue(update("b"), None).unwrap();
        let exec = ScriptedExecutor::failing("a", 1);

        let report = queue.drain(&exec, &NetworkMonitor::new(false)).await;

        assert_eq!(
            exec.calls(),
            vec![
                ("a".to_string(), false),
                ("b".to_string(), true),
                ("a".to_string(), true)
            ]
        );
        assert_eq!(report.executed, 3);
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.requeued, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_entry_is_reported() {
        let (queue, store) = queue(10);
        let mut failures = queue.subscribe_failures();
        queue.enqueue(update("a"), None).unwrap();
        let exec = ScriptedExecutor::failing("a", 10);

        let report = queue.drain(&exec, &NetworkMonitor::new(false)).await;

        assert_eq!(exec.calls().len(), 3);
        assert_eq!(report.failed.len(), 1);
        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.operation.attempt_count, 3);
        assert!(matches!(
            failure.to_error(),
            Error::QueueExhausted { attempts: 3, .. }
        ));
        assert!(queue.is_empty());
        assert_eq!(store.get(QUEUE_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_rejected_session_pauses_drain_without_spending_attempts() {
        let (queue, store) = queue(10);
        let mut failures = queue.subscribe_failures();
        queue.enqueue(update("a"), None).unwrap();
        queue.enqueue(update("b"), None).unwrap();
        let exec = ScriptedExecutor {
            reject_session: true,
            ..Default::default()
        };

        let report = queue.drain(&exec, &NetworkMonitor::new(false)).await;

        assert_eq!(exec.calls(), vec![("a".to_string(), false)]);
        assert!(report.rejected.is_some());
        assert!(report.failed.is_empty());
        assert_eq!(report.remaining, 2);

        let pending = queue.list();
        assert_eq!(pending[0].mutation, update("a"));
        assert_eq!(pending[0].attempt_count, 0);
        assert!(failures.try_recv().is_err());

        let restored = OfflineQueue::new(store, 10, 3);
        assert_eq!(restored.list(), pending);
    }

    #[tokio::test]
    async fn test_drain_does_nothing_offline() {
        let (queue, _) = queue(10);
        queue.enqueue(update("a"), None).unwrap();
        let exec = ScriptedExecutor::default();

        let report = queue.drain(&exec, &NetworkMonitor::new(true)).await;

        assert!(exec.calls().is_empty());
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_drains_are_coalesced() {
        let (queue, _) = queue(10);
        let queue = Arc::new(queue);
        queue.enqueue(update("a"), None).unwrap();
        let exec = Arc::new(ScriptedExecutor {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let network = Arc::new(NetworkMonitor::new(false));

        let first = {
            let (queue, exec, network) = (queue.clone(), exec.clone(), network.clone());
            tokio::spawn(async move { queue.drain(exec.as_ref(), &network).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.enqueue(update("b"), None).unwrap();
        let second = queue.drain(exec.as_ref(), &network).await;
        assert!(second.coalesced);

        let first = first.await.unwrap();
        assert_eq!(first.succeeded.len(), 2);
        // Each entry ran exactly once
        assert_eq!(exec.calls().len(), 2);
    }

    #[test]
    fn test_purge_owner() {
        let (queue, _) = queue(10);
        queue.enqueue(update("a"), Some("u-1".to_string())).unwrap();
        queue.enqueue(update("b"), Some("u-2".to_string())).unwrap();
        queue.enqueue(update("c"), None).unwrap();

        assert_eq!(queue.purge_owner("u-1").unwrap(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clear() {
        let (queue, store) = queue(10);
        queue.enqueue(update("a"), None).unwrap();
        assert_eq!(queue.clear().unwrap(), 1);

        let restored = OfflineQueue::new(store, 10, 3);
        assert!(restored.is_empty());
    }
}
