use chrono::{DateTime, Duration, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use trailhead_shared::Clock;

/// Canonical fingerprint of an endpoint and its parameters.
///
/// Parameters are sorted by name so `?a=1&b=2` and `?b=2&a=1` share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str, params: &[(&str, &str)]) -> Self {
        if params.is_empty() {
            return Self(endpoint.to_string());
        }
        let mut sorted = params.to_vec();
        sorted.sort();
        let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        Self(format!("{}?{}", endpoint, query.join("&")))
    }

    pub fn endpoint(endpoint: &str) -> Self {
        Self::new(endpoint, &[])
    }

    fn belongs_to(&self, endpoint: &str) -> bool {
        match self.0.strip_prefix(endpoint) {
            Some(rest) => rest.is_empty() || rest.starts_with('?') || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

struct Inner<V, E> {
    entries: HashMap<CacheKey, Entry<V>>,
    in_flight: HashMap<CacheKey, (u64, SharedFetch<V, E>)>,
    /// Bumped by every invalidation. A fetch started under an older
    /// generation does not populate the cache.
    generation: u64,
}

/// TTL cache for read endpoints with in-flight request coalescing.
pub struct RequestCache<V, E> {
    inner: Mutex<Inner<V, E>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V, E> RequestCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                generation: 0,
            }),
            ttl,
            clock,
        }
    }

    /// Returns the cached value for `key`, or runs `fetch` once no matter
    /// how many callers miss at the same time. Errors are handed to every
    /// waiting caller and never stored.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (generation, pending) = {
            let mut inner = self.lock();
            let now = self.clock.now();

            match inner.entries.get(&key) {
                Some(entry) if entry.expires_at > now => return Ok(entry.value.clone()),
                Some(_) => {
                    inner.entries.remove(&key);
                }
                None => {}
            }

            match inner.in_flight.get(&key) {
                Some((generation, pending)) => (*generation, pending.clone()),
                None => {
                    tracing::debug!(key = %key, "Cache miss");
                    let pending = fetch().boxed().shared();
                    let generation = inner.generation;
                    inner.in_flight.insert(key.clone(), (generation, pending.clone()));
                    (generation, pending)
                }
            }
        };

        let result = pending.clone().await;

        let mut inner = self.lock();
        if matches!(inner.in_flight.get(&key), Some((_, current)) if current.ptr_eq(&pending)) {
            inner.in_flight.remove(&key);
        }
        if let Ok(value) = &result {
            if inner.generation == generation {
                let expires_at = self.clock.now() + self.ttl;
                inner.entries.insert(
                    key,
                    Entry {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }
        }
        result
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.remove(key);
        inner.in_flight.remove(key);
    }

    /// Drops every entry recorded under `endpoint`, whatever its parameters.
    pub fn invalidate_prefix(&self, endpoint: &str) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.retain(|k, _| !k.belongs_to(endpoint));
        inner.in_flight.retain(|k, _| !k.belongs_to(endpoint));
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.in_flight.clear();
    }

    /// Removes expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.expires_at > now);
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
