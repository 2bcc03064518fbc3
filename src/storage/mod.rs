//! Durable local key-value storage
//!
//! Synchronous, string-keyed, capacity-limited storage shared by the offline
//! queue, the persisted session and the response cache. Every key is
//! namespaced with [`KEY_PREFIX`] so unrelated data in the same store never
//! collides with ours.

pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::StorageError;

pub use sqlite::SqliteStore;

/// Fixed namespace for every key this crate writes
pub const KEY_PREFIX: &str = "edureg:";

/// Largest value a single key may hold
pub const MAX_VALUE_BYTES: usize = 5 * 1024 * 1024;

type Result<T> = std::result::Result<T, StorageError>;

/// Prefix a caller key with the crate namespace
pub fn namespaced(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Synchronous durable key-value store.
///
/// Keys passed in and returned are un-namespaced; implementations add and
/// strip [`KEY_PREFIX`] themselves.
pub trait DurableStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in lexical order
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Number of entries and their total size
    fn usage(&self) -> Result<StoreUsage>;
}

/// Size summary of a durable store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreUsage {
    pub entries: usize,
    pub total_bytes: usize,
}

/// Read and deserialize a JSON value
pub fn load_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> crate::error::Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and write a JSON value
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
) -> crate::error::Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)?;
    Ok(())
}

fn check_quota(key: &str, value: &str) -> Result<()> {
    if value.len() > MAX_VALUE_BYTES {
        return Err(StorageError::QuotaExceeded {
            key: namespaced(key),
            size: value.len(),
        });
    }
    Ok(())
}

/// In-process store used by tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Io("memory store lock poisoned".to_string()))
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(&namespaced(key)).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_quota(key, value)?;
        self.lock()?.insert(namespaced(key), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(&namespaced(key)).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let full = namespaced(prefix);
        Ok(self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(&full))
            .map(|k| k[KEY_PREFIX.len()..].to_string())
            .collect())
    }

    fn usage(&self) -> Result<StoreUsage> {
        let entries = self.lock()?;
        Ok(StoreUsage {
            entries: entries.len(),
            total_bytes: entries.values().map(String::len).sum(),
        })
    }
}
