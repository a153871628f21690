use crate::dedup::InFlightDeduplicator;
use crate::errors::ResolveError;
use lru::LruCache;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Capacity and age bounds of a [`ReadThroughCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time view of a cache's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub expirations: u64,
    pub evictions: u64,
    pub size: usize,
}

struct CacheInner<K: Hash + Eq, V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    in_flight: InFlightDeduplicator<V>,
    metrics: CacheMetrics,
}

/// Capacity- and TTL-bounded read-through cache.
///
/// On a miss the supplied loader runs and its value is stored; failures are
/// never cached. Entries older than the TTL are treated as absent when read
/// (lazy expiry) and the least recently used entry is evicted once the
/// capacity is exceeded.
///
/// ## Loads
///
/// Misses go through an [`InFlightDeduplicator`] keyed by the display form of
/// the key, so concurrent misses share one load. The load stores its value
/// before its registry entry is removed, and a newly started load re-reads
/// the store first. A reader therefore always finds either the stored value
/// or the running load.
///
/// The load runs on its own tokio task. A caller that stops waiting (for
/// instance because an outer deadline fired) does not abort it, and the value
/// still lands in the cache for later readers.
///
/// The handle is cheap to clone; clones share the same store.
pub struct ReadThroughCache<K: Hash + Eq, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K: Hash + Eq, V> Clone for ReadThroughCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(CacheInner {
                name,
                ttl: config.ttl,
                entries: Mutex::new(LruCache::new(capacity)),
                in_flight: InFlightDeduplicator::new(),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Returns the live value for `key`, loading and storing it on a miss.
    pub async fn get<F, Fut>(&self, key: K, loader: F) -> Result<V, ResolveError>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, ResolveError>> + Send + 'static,
    {
        if let Some(value) = self.peek(&key) {
            return Ok(value);
        }

        let cache = self.clone();
        self.inner
            .in_flight
            .run(key.to_string(), move || async move {
                // a load that settled between our peek and registering this one
                if let Some(value) = cache.lookup(&key, false) {
                    return Ok(value);
                }
                debug!(cache = cache.inner.name, key = %key, "Reading through to loader");
                let value = loader(key.clone()).await?;
                cache.insert(key, value.clone());
                Ok::<V, ResolveError>(value)
            })
            .await
    }

    /// Live value for `key` without loading. Expired entries are dropped.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.lookup(key, true)
    }

    fn lookup(&self, key: &K, record: bool) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.inner.ttl => {
                if record {
                    self.inner.metrics.hits.fetch_add(1, Ordering::Relaxed);
                }
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.inner.metrics.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(cache = self.inner.name, key = %key, "Entry expired");
        }
        if record {
            self.inner.metrics.misses.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Stores `value`, replacing any previous entry for `key` wholesale.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.lock();
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                self.inner.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    cache = self.inner.name,
                    key = %evicted,
                    size = entries.len(),
                    "Evicted least recently used entry"
                );
            }
        }
    }

    /// Loads currently running for this cache.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.in_flight_count()
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let metrics = &self.inner.metrics;
        let hits = metrics.hits.load(Ordering::Relaxed);
        let misses = metrics.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStatsSnapshot {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            expirations: metrics.expirations.load(Ordering::Relaxed),
            evictions: metrics.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, CacheEntry<V>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
