//! Process-wide TTL cache for catalog lookups.
//!
//! Entries expire lazily: an expired entry is dropped on the read that finds it.
//! Concurrent misses on the same key are single-flight. The first caller runs the
//! loader while later callers wait on a per-key lock and then read its result.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use metabot_core::Clock;
use tracing::debug;

/// Tool name plus normalized arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Argument order does not matter. Values are trimmed and inner whitespace is
    /// collapsed; case is kept because catalog name filters match exactly.
    pub fn new(operation: &str, args: &[(&str, &str)]) -> Self {
        Self::build(operation, args, false)
    }

    /// Like [`CacheKey::new`] but also folds case, for lookups that match names
    /// case-insensitively.
    pub fn case_folded(operation: &str, args: &[(&str, &str)]) -> Self {
        Self::build(operation, args, true)
    }

    fn build(operation: &str, args: &[(&str, &str)], fold_case: bool) -> Self {
        let mut normalized: Vec<(String, String)> = args
            .iter()
            .map(|(name, value)| {
                let value = collapse_whitespace(value);
                let value = if fold_case { value.to_lowercase() } else { value };
                (name.to_ascii_lowercase(), value)
            })
            .collect();
        normalized.sort();

        let query = normalized
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        Self(format!("{operation}?{query}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
}

pub struct TtlCache<V> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    in_flight: FlightMap,
    ttl: Duration,
    enabled: bool,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, enabled: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            ttl,
            enabled,
            clock,
        }
    }

    /// Returns the live entry for `key`, or runs `loader` and stores an `Ok` value
    /// for one TTL from the moment it arrived. Errors are never cached.
    pub async fn fetch<F, Fut, E>(&self, key: &CacheKey, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if !self.enabled {
            return loader().await;
        }

        if let Some(value) = self.get(key) {
            debug!(event_name = "catalog.cache.hit", key = %key, "cache hit");
            return Ok(value);
        }

        let flight = self.join_flight(key);
        let _turn = flight.slot.lock().await;

        // Another caller may have filled the entry while this one waited.
        if let Some(value) = self.get(key) {
            debug!(event_name = "catalog.cache.coalesced", key = %key, "served by in-flight load");
            return Ok(value);
        }

        debug!(event_name = "catalog.cache.miss", key = %key, "cache miss");
        let loaded = loader().await;
        if let Ok(value) = &loaded {
            let expires_at = self.clock.now() + self.ttl;
            lock(&self.entries)
                .insert(key.clone(), CacheEntry { value: value.clone(), expires_at });
        }

        loaded
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Entries that have not yet expired.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        lock(&self.entries).values().filter(|entry| now < entry.expires_at).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join_flight<'a>(&'a self, key: &'a CacheKey) -> Flight<'a> {
        let slot = lock(&self.in_flight).entry(key.clone()).or_default().clone();
        Flight { in_flight: &self.in_flight, key, slot }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

type FlightMap = Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>;

/// A caller's hold on a key's in-flight slot. The last holder to leave removes the
/// slot, including callers whose future was dropped mid-load.
struct Flight<'a> {
    in_flight: &'a FlightMap,
    key: &'a CacheKey,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock(self.in_flight);
        // Clones are only taken under this lock: map + this holder means no one waits.
        let idle = in_flight.get(self.key).is_some_and(|current| {
            Arc::ptr_eq(current, &self.slot) && Arc::strong_count(&self.slot) == 2
        });
        if idle {
            in_flight.remove(self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use metabot_core::ManualClock;

    use super::{CacheKey, TtlCache};

    fn cache(clock: &ManualClock) -> Arc<TtlCache<String>> {
        Arc::new(TtlCache::new(Duration::minutes(5), true, Arc::new(clock.clone())))
    }

    async fn load(counter: &AtomicU32, value: &str) -> Result<String, String> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(value.to_string())
    }

    #[test]
    fn key_ignores_argument_order_and_spacing_but_keeps_case() {
        let a = CacheKey::new("get_table_metadata", &[
            ("schema_name", " PUBLIC "),
            ("table_name", "ORDERS"),
        ]);
        let b = CacheKey::new("get_table_metadata", &[
            ("table_name", "ORDERS"),
            ("schema_name", "PUBLIC"),
        ]);
        let lower = CacheKey::new("get_table_metadata", &[
            ("table_name", "orders"),
            ("schema_name", "public"),
        ]);
        assert_eq!(a, b);
        assert_ne!(a, lower);
        assert_ne!(a, CacheKey::new("get_lineage", &[("table_name", "ORDERS")]));
    }

    #[test]
    fn case_folded_key_ignores_case() {
        assert_eq!(
            CacheKey::case_folded("search_table", &[("table_name", "  Orders ")]),
            CacheKey::case_folded("search_table", &[("table_name", "ORDERS")]),
        );
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = CacheKey::new("list_data_sources", &[]);
        let loads = AtomicU32::new(0);

        cache.fetch(&key, || load(&loads, "first")).await.expect("load");
        clock.advance(Duration::seconds(299));
        let value = cache.fetch(&key, || load(&loads, "second")).await.expect("hit");

        assert_eq!(value, "first");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_reloaded() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = CacheKey::new("list_data_sources", &[]);
        let loads = AtomicU32::new(0);

        cache.fetch(&key, || load(&loads, "first")).await.expect("load");
        clock.advance(Duration::minutes(5));
        assert!(cache.get(&key).is_none(), "entry must not be served at its expiry");

        let value = cache.fetch(&key, || load(&loads, "second")).await.expect("reload");
        assert_eq!(value, "second");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = CacheKey::new("search_table", &[("table_name", "orders")]);

        let failed: Result<String, String> =
            cache.fetch(&key, || async { Err("catalog down".to_string()) }).await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let loads = AtomicU32::new(0);
        cache.fetch(&key, || load(&loads, "found")).await.expect("retry loads");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_on_one_key_load_once() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let loads = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                let key = CacheKey::new("list_schemas", &[("data_source_id", "1")]);
                cache
                    .fetch(&key, || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(30)).await;
                        Ok::<_, String>("schemas".to_string())
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("join").expect("value"), "schemas");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_reload() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = CacheKey::new("list_tables", &[("data_source_id", "1")]);
        let loads = AtomicU32::new(0);

        cache.fetch(&key, || load(&loads, "v1")).await.expect("load");
        assert!(cache.invalidate(&key));
        cache.fetch(&key, || load(&loads, "v2")).await.expect("reload");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_loads() {
        let clock = ManualClock::default();
        let cache: TtlCache<String> =
            TtlCache::new(Duration::minutes(5), false, Arc::new(clock.clone()));
        let key = CacheKey::new("list_data_sources", &[]);
        let loads = AtomicU32::new(0);

        cache.fetch(&key, || load(&loads, "a")).await.expect("load");
        cache.fetch(&key, || load(&loads, "b")).await.expect("load");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_loads_release_their_in_flight_slot() {
        let clock = ManualClock::default();
        let cache = cache(&clock);

        for n in 0..20 {
            let id = n.to_string();
            let key = CacheKey::new("list_tables", &[("data_source_id", id.as_str())]);
            let pending = cache.fetch(&key, || async {
                tokio::time::sleep(StdDuration::from_secs(5)).await;
                Ok::<_, String>("late".to_string())
            });
            assert!(tokio::time::timeout(StdDuration::from_millis(1), pending).await.is_err());
        }

        assert_eq!(cache.in_flight_len(), 0);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_keeps_the_running_load_shared() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = CacheKey::new("list_schemas", &[("data_source_id", "1")]);
        let loads = Arc::new(AtomicU32::new(0));

        let slow_load = {
            let (cache, key, loads) = (cache.clone(), key.clone(), loads.clone());
            tokio::spawn(async move {
                cache
                    .fetch(&key, || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(50)).await;
                        Ok::<_, String>("schemas".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(StdDuration::from_millis(5)).await;

        let impatient = cache.fetch(&key, || load(&loads, "duplicate"));
        assert!(tokio::time::timeout(StdDuration::from_millis(5), impatient).await.is_err());
        assert_eq!(cache.in_flight_len(), 1, "the running load still owns the slot");

        let value = cache.fetch(&key, || load(&loads, "duplicate")).await.expect("value");
        assert_eq!(value, "schemas");
        assert_eq!(slow_load.await.expect("join").expect("value"), "schemas");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_len(), 0);
    }
}
