//! In-memory response cache with TTL and a bounded entry count
//!
//! Eviction is FIFO by insertion: when full, the entry inserted longest ago
//! goes, regardless of how recently it was read. Entries can optionally be
//! written through to a [`DurableStore`] so later processes start warm.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::CacheKey;
use crate::error::ErrorClass;
use crate::storage::DurableStore;

/// Namespace for persisted entries inside the durable store
const PERSIST_PREFIX: &str = "cache:";

/// One cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
    /// Insertion sequence; lower means inserted earlier
    seq: u64,
}

impl CacheEntry {
    /// Whether the entry may still be returned
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Entry shape inside the durable store
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    value: Value,
    stored_at: DateTime<Utc>,
    ttl_ms: u64,
}

/// A swallowed background refresh failure
#[derive(Debug, Clone)]
pub struct RevalidationFailure {
    pub key: String,
    pub resource: String,
    pub class: ErrorClass,
    pub message: String,
}

#[derive(Default)]
pub(super) struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
    /// Bumped by `clear()` so in-flight refreshes from a previous principal
    /// can tell they are stale
    pub(super) epoch: u64,
    /// Per-resource counters bumped by `invalidate_resource`, so a fetch
    /// that started before a write cannot put back what the write replaced
    generations: HashMap<String, u64>,
    pub(super) revalidating: HashSet<CacheKey>,
}

impl CacheState {
    pub(super) fn generation(&self, resource: &str) -> Generation {
        Generation {
            epoch: self.epoch,
            resource: self.generations.get(resource).copied().unwrap_or(0),
        }
    }
}

/// Counters a fetch must still match when it lands for its result to be
/// stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Generation {
    epoch: u64,
    resource: u64,
}

impl Generation {
    pub(super) fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Statistics about cache state
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
    pub expired: usize,
    pub max_entries: usize,
    pub oldest_age: Option<Duration>,
    pub newest_age: Option<Duration>,
}

/// Bounded, TTL-based response cache
pub struct ResponseCache {
    pub(super) state: Mutex<CacheState>,
    max_entries: usize,
    persistence: Option<Arc<dyn DurableStore>>,
    pub(super) inflight: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
    pub(super) revalidate_delay: Duration,
    pub(super) failures: broadcast::Sender<RevalidationFailure>,
    pub(super) revalidations: Mutex<JoinSet<()>>,
}

impl ResponseCache {
    /// Create an empty cache holding at most `max_entries` responses
    pub fn new(max_entries: usize) -> Self {
        let (failures, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries: max_entries.max(1),
            persistence: None,
            inflight: Mutex::new(HashMap::new()),
            revalidate_delay: Duration::from_millis(100),
            failures,
            revalidations: Mutex::new(JoinSet::new()),
        }
    }

    /// Delay before a stale-while-revalidate refresh fires
    pub fn with_revalidate_delay(mut self, delay: Duration) -> Self {
        self.revalidate_delay = delay;
        self
    }

    pub fn revalidate_delay(&self) -> Duration {
        self.revalidate_delay
    }

    /// Write entries through to `store` and load whatever is still fresh.
    pub fn with_persistence(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.hydrate(store.as_ref());
        self.persistence = Some(store);
        self
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave entries half-written
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the value if unexpired; an expired entry is evicted on the way.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.lock();
        let fresh = state.entries.get(key).map(|entry| entry.is_fresh(now));
        match fresh {
            Some(true) => state.entries.get(key).map(|entry| entry.value.clone()),
            Some(false) => {
                debug!("Cache entry expired: {}", key);
                state.entries.remove(key);
                drop(state);
                self.unpersist(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite. Inserting a new key into a full cache first
    /// evicts the oldest insertion; overwriting never evicts.
    pub fn set(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let mut state = self.lock();
        let evicted = self.insert_locked(&mut state, key, value.clone(), ttl);
        drop(state);

        if let Some(old) = evicted {
            self.unpersist(&old);
        }
        self.persist(key, &value, ttl);
    }

    /// Snapshot taken before a network fetch for `resource` starts
    pub(super) fn generation(&self, resource: &str) -> Generation {
        self.lock().generation(resource)
    }

    /// Store a fetched value unless the cache was cleared or the resource
    /// invalidated since `since` was taken. Returns whether it was stored.
    pub(super) fn refresh(
        &self,
        key: &CacheKey,
        value: Value,
        ttl: Duration,
        since: Generation,
    ) -> bool {
        let mut state = self.lock();
        if state.generation(key.resource()) != since {
            return false;
        }
        let evicted = self.insert_locked(&mut state, key, value.clone(), ttl);
        drop(state);

        if let Some(old) = evicted {
            self.unpersist(&old);
        }
        self.persist(key, &value, ttl);
        true
    }

    fn insert_locked(
        &self,
        state: &mut CacheState,
        key: &CacheKey,
        value: Value,
        ttl: Duration,
    ) -> Option<CacheKey> {
        let mut evicted = None;
        if !state.entries.contains_key(key) && state.entries.len() >= self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Cache full, evicting oldest entry {}", oldest);
                state.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                seq,
            },
        );
        evicted
    }

    /// Drop every entry belonging to a resource family. Returns the count.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let mut state = self.lock();
        let doomed: Vec<CacheKey> = state
            .entries
            .keys()
            .filter(|k| k.resource() == resource)
            .cloned()
            .collect();
        for key in &doomed {
            state.entries.remove(key);
        }
        *state.generations.entry(resource.to_string()).or_default() += 1;
        drop(state);

        if let Some(ref store) = self.persistence {
            let prefix = format!("{}{}:", PERSIST_PREFIX, resource);
            match store.keys(&prefix) {
                Ok(keys) => {
                    for k in keys {
                        let _ = store.remove(&k);
                    }
                }
                Err(e) => warn!("Failed to invalidate persisted {} entries: {}", resource, e),
            }
        }

        if !doomed.is_empty() {
            debug!("Invalidated {} cached {} entries", doomed.len(), resource);
        }
        doomed.len()
    }

    /// Remove everything, including persisted entries, and abandon pending
    /// refreshes. Used whenever the principal changes.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.revalidating.clear();
        state.epoch += 1;
        drop(state);

        if let Some(ref store) = self.persistence {
            match store.keys(PERSIST_PREFIX) {
                Ok(keys) => {
                    for k in keys {
                        let _ = store.remove(&k);
                    }
                }
                Err(e) => warn!("Failed to clear persisted cache: {}", e),
            }
        }

        debug!("Cache cleared ({} entries)", removed);
        removed
    }

    /// Number of entries currently held, fresh or not
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Whether `key` is present (fresh or not) without evicting it
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.lock();
        let fresh = state.entries.values().filter(|e| e.is_fresh(now)).count();
        let ages = state
            .entries
            .values()
            .map(|e| now.saturating_duration_since(e.stored_at));
        CacheStats {
            entries: state.entries.len(),
            fresh,
            expired: state.entries.len() - fresh,
            max_entries: self.max_entries,
            oldest_age: ages.clone().max(),
            newest_age: ages.min(),
        }
    }

    /// Receive background refresh failures (they are never returned to callers)
    pub fn subscribe_revalidation_failures(&self) -> broadcast::Receiver<RevalidationFailure> {
        self.failures.subscribe()
    }

    fn persist(&self, key: &CacheKey, value: &Value, ttl: Duration) {
        let Some(ref store) = self.persistence else {
            return;
        };
        let entry = PersistedEntry {
            value: value.clone(),
            stored_at: Utc::now(),
            ttl_ms: ttl.as_millis() as u64,
        };
        let result = serde_json::to_string(&entry)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                store
                    .set(&format!("{}{}", PERSIST_PREFIX, key), &raw)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!("Failed to persist cache entry {}: {}", key, e);
        }
    }

    fn unpersist(&self, key: &CacheKey) {
        if let Some(ref store) = self.persistence {
            let _ = store.remove(&format!("{}{}", PERSIST_PREFIX, key));
        }
    }

    /// Load still-fresh persisted entries, oldest first, dropping the rest.
    fn hydrate(&mut self, store: &dyn DurableStore) {
        let keys = match store.keys(PERSIST_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to read persisted cache: {}", e);
                return;
            }
        };

        let now = Utc::now();
        let mut live = Vec::new();
        for raw_key in keys {
            let parsed = CacheKey::parse(&raw_key[PERSIST_PREFIX.len()..]);
            let entry = store
                .get(&raw_key)
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<PersistedEntry>(&raw).ok());

            let (Some(key), Some(entry)) = (parsed, entry) else {
                let _ = store.remove(&raw_key);
                continue;
            };

            let age = (now - entry.stored_at).to_std().unwrap_or_default();
            let ttl = Duration::from_millis(entry.ttl_ms);
            if age >= ttl {
                let _ = store.remove(&raw_key);
                continue;
            }
            live.push((entry.stored_at, key, entry.value, ttl - age));
        }

        live.sort_by_key(|(stored_at, ..)| *stored_at);
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        let count = live.len();
        for (_, key, value, remaining) in live {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                key,
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                    ttl: remaining,
                    seq,
                },
            );
        }

        // Persisted set may exceed a smaller configured bound
        while state.entries.len() > self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    state.entries.remove(&k);
                    let _ = store.remove(&format!("{}{}", PERSIST_PREFIX, k));
                }
                None => break,
            }
        }

        if count > 0 {
            debug!("Loaded {} persisted cache entries", state.entries.len());
        }
    }
}
