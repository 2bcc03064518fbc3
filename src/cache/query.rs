//! Cache-aware fetch path
//!
//! Offline reads are answered from the cache or fail with
//! [`Error::NoCachedData`]. Online hits are served immediately and refreshed
//! in a background task the cache keeps track of, so a short-lived process
//! can wait for it with [`ResponseCache::flush_revalidations`]. Misses go to
//! the network once per key even when many callers ask at the same time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use super::response::{ResponseCache, RevalidationFailure};
use super::CacheKey;
use crate::error::{Error, Result};
use crate::network::NetworkMonitor;

impl ResponseCache {
    /// Fetch through the cache.
    ///
    /// `fetcher` is only invoked when the network is believed reachable. On a
    /// fresh hit it runs later, in the background, and its result (success or
    /// failure) never reaches this caller.
    pub async fn query_with_cache<F, Fut>(
        self: &Arc<Self>,
        network: &Arc<NetworkMonitor>,
        key: &CacheKey,
        ttl: Duration,
        fetcher: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if network.is_offline() {
            return match self.get(key) {
                Some(value) => {
                    debug!("Offline, serving cached {}", key);
                    Ok(value)
                }
                None => Err(Error::NoCachedData {
                    resource: key.resource().to_string(),
                }),
            };
        }

        if let Some(value) = self.get(key) {
            debug!("Cache hit: {}", key);
            self.spawn_revalidation(network, key, ttl, fetcher);
            return Ok(value);
        }

        let gate = self.flight_gate(key);
        let _turn = gate.lock().await;

        // Someone else may have filled it while we waited
        if let Some(value) = self.get(key) {
            debug!("Cache filled by concurrent fetch: {}", key);
            self.release_gate(key, &gate);
            return Ok(value);
        }

        debug!("Cache miss: {}", key);
        let since = self.generation(key.resource());
        let result = fetcher().await;
        if let Ok(ref value) = result
            && !self.refresh(key, value.clone(), ttl, since)
        {
            debug!("Not caching {}, invalidated while it was fetched", key);
        }
        self.release_gate(key, &gate);
        result
    }

    /// Per-key lock serializing network fetches on a miss
    fn flight_gate(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(inflight.entry(key.clone()).or_default())
    }

    /// Drop the gate once nobody but the map and this caller hold it
    fn release_gate(&self, key: &CacheKey, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(gate) <= 2 {
            inflight.remove(key);
        }
    }

    /// Schedule one background refresh for `key`. A refresh already pending
    /// for the same key absorbs this one.
    fn spawn_revalidation<F, Fut>(
        self: &Arc<Self>,
        network: &Arc<NetworkMonitor>,
        key: &CacheKey,
        ttl: Duration,
        fetcher: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let since = {
            let mut state = self.lock();
            if !state.revalidating.insert(key.clone()) {
                return;
            }
            state.generation(key.resource())
        };

        let cache = Arc::clone(self);
        let network = Arc::clone(network);
        let key = key.clone();
        let delay = self.revalidate_delay;

        let mut tasks = self.revalidations.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            tokio::time::sleep(delay).await;

            if network.is_offline() {
                debug!("Skipping revalidation of {} while offline", key);
            } else {
                match fetcher().await {
                    Ok(value) => {
                        if cache.refresh(&key, value, ttl, since) {
                            debug!("Revalidated {}", key);
                        } else {
                            debug!("Discarding revalidation of {}, cache changed meanwhile", key);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Background revalidation of {} failed ({}): {}",
                            key,
                            e.class(),
                            e
                        );
                        let _ = cache.failures.send(RevalidationFailure {
                            key: key.to_string(),
                            resource: key.resource().to_string(),
                            class: e.class(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            let mut state = cache.lock();
            if state.epoch == since.epoch() {
                state.revalidating.remove(&key);
            }
        });
    }

    /// Wait up to `timeout` for pending background refreshes to land.
    ///
    /// Anything still running after that is aborted. Returns how many
    /// refreshes completed.
    pub async fn flush_revalidations(&self, timeout: Duration) -> usize {
        let mut pending =
            std::mem::take(&mut *self.revalidations.lock().unwrap_or_else(|e| e.into_inner()));
        if pending.is_empty() {
            return 0;
        }
        debug!("Waiting for {} background refreshes", pending.len());

        let mut completed = 0;
        let finished = tokio::time::timeout(timeout, async {
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    warn!("Background refresh task failed: {}", e);
                }
                completed += 1;
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                "Abandoning {} background refreshes after {:?}",
                pending.len(),
                timeout
            );
            pending.abort_all();
            self.lock().revalidating.clear();
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ErrorClass};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    fn setup(offline: bool) -> (Arc<ResponseCache>, Arc<NetworkMonitor>) {
        (
            Arc::new(ResponseCache::new(10).with_revalidate_delay(Duration::from_millis(100))),
            Arc::new(NetworkMonitor::new(offline)),
        )
    }

    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
        value: Value,
    ) -> impl FnOnce() -> std::future::Ready<Result<Value>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_without_cache_never_fetches() {
        let (cache, network) = setup(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("schools", &[]);

        let err = cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!([])))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoCachedData { ref resource } if resource == "schools"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_serves_cache_without_fetching() {
        let (cache, network) = setup(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("schools", &[]);
        cache.set(&key, json!(["cached"]), TTL);

        let value = cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!(["new"])))
            .await
            .unwrap();

        assert_eq!(value, json!(["cached"]));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_fetches_and_caches() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("regions", &[]);

        let value = cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!([1])))
            .await
            .unwrap();

        assert_eq!(value, json!([1]));
        assert_eq!(cache.get(&key), Some(json!([1])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_failure_is_not_cached() {
        let (cache, network) = setup(false);
        let key = CacheKey::new("regions", &[]);

        let err = cache
            .query_with_cache(&network, &key, TTL, || async {
                Err::<Value, Error>(ApiError::ServerError("down".to_string()).into())
            })
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_returns_stale_then_revalidates() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("sectors", &[]);
        cache.set(&key, json!("old"), TTL);

        let value = cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!("new")))
            .await
            .unwrap();
        assert_eq!(value, json!("old"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&key), Some(json!("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_failure_is_swallowed_and_reported() {
        let (cache, network) = setup(false);
        let mut failures = cache.subscribe_revalidation_failures();
        let key = CacheKey::new("sectors", &[]);
        cache.set(&key, json!("old"), TTL);

        let value = cache
            .query_with_cache(&network, &key, TTL, || async {
                Err::<Value, Error>(ApiError::Network("reset".to_string()).into())
            })
            .await
            .unwrap();
        assert_eq!(value, json!("old"));

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.resource, "sectors");
        assert_eq!(failure.class, ErrorClass::Network);
        assert_eq!(cache.get(&key), Some(json!("old")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_pending_revalidation() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("users", &[]);
        cache.set(&key, json!("alice's view"), TTL);

        cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!("stale")))
            .await
            .unwrap();
        cache.clear();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_revalidation_discards_result() {
        let (cache, network) = setup(false);
        let key = CacheKey::new("schools", &[]);
        cache.set(&key, json!("before write"), TTL);

        cache
            .query_with_cache(&network, &key, TTL, || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, Error>(json!("before write"))
            })
            .await
            .unwrap();

        // Refresh starts at 100ms and lands at 300ms; the write lands between
        tokio::time::sleep(Duration::from_millis(150)).await;
        cache.invalidate_resource("schools");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_miss_fetch_is_not_cached() {
        let (cache, network) = setup(false);
        let key = CacheKey::new("schools", &[]);

        let reader = {
            let cache = Arc::clone(&cache);
            let network = Arc::clone(&network);
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .query_with_cache(&network, &key, TTL, || async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, Error>(json!("before write"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.invalidate_resource("schools");

        // The caller still gets its answer; the cache just does not keep it
        assert_eq!(reader.await.unwrap().unwrap(), json!("before write"));
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_pending_revalidation() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("regions", &[]);
        cache.set(&key, json!("old"), TTL);

        cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!("new")))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(cache.flush_revalidations(Duration::from_secs(1)).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&key), Some(json!("new")));
        assert_eq!(cache.flush_revalidations(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_gives_up_on_slow_revalidation() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("regions", &[]);
        cache.set(&key, json!("old"), TTL);

        cache
            .query_with_cache(&network, &key, TTL, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, Error>(json!("slow"))
            })
            .await
            .unwrap();

        assert_eq!(cache.flush_revalidations(Duration::from_millis(500)).await, 0);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(cache.get(&key), Some(json!("old")));

        // The abandoned refresh no longer blocks a new one for the same key
        cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!("new")))
            .await
            .unwrap();
        assert_eq!(cache.flush_revalidations(Duration::from_secs(1)).await, 1);
        assert_eq!(cache.get(&key), Some(json!("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_pending_revalidation_per_key() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("schools", &[]);
        cache.set(&key, json!(0), TTL);

        for _ in 0..5 {
            cache
                .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!(1)))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_skipped_if_offline_by_then() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("schools", &[]);
        cache.set(&key, json!(0), TTL);

        cache
            .query_with_cache(&network, &key, TTL, counting_fetcher(&calls, json!(1)))
            .await
            .unwrap();
        network.handle_offline();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_fetch_once() {
        let (cache, network) = setup(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("categories", &[]);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let network = Arc::clone(&network);
            let key = key.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .query_with_cache(&network, &key, TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Error>(json!(["c1"]))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), json!(["c1"]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inflight.lock().unwrap().is_empty());
    }
}
