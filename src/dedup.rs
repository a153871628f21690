//! In-flight request deduplication.
//!
//! Concurrent callers asking for the same not-yet-available result share one
//! underlying computation. The first caller to find no registry entry becomes
//! the leader and starts the computation; everyone arriving before it settles
//! is a follower awaiting the same shared handle.
//!
//! ## Registry lifecycle
//!
//! ```text
//!  run(key) ──► entry(key) ──┬─ Occupied ──► await shared handle   (follower)
//!                            │
//!                            └─ Vacant ────► spawn computation
//!                                            insert shared handle   (leader)
//!                                            await shared handle
//!
//!  computation settles ──► RegistryGuard::drop ──► remove(key) if generation matches
//! ```
//!
//! The check and the insert happen under the same `DashMap` shard lock, so at
//! most one computation per key is ever registered. The computation runs on
//! its own task: callers that give up waiting do not cancel it, and the entry
//! is always removed when it settles, whether it succeeded, failed or panicked.

use crate::errors::ResolveError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedComputation<V> = Shared<BoxFuture<'static, Result<V, ResolveError>>>;

struct InFlight<V> {
    generation: u64,
    computation: SharedComputation<V>,
}

/// Removes the registry entry of a computation once it settles.
struct RegistryGuard<V> {
    registry: Arc<DashMap<String, InFlight<V>>>,
    key: String,
    generation: u64,
}

impl<V> Drop for RegistryGuard<V> {
    fn drop(&mut self) {
        let generation = self.generation;
        if self
            .registry
            .remove_if(&self.key, |_, entry| entry.generation == generation)
            .is_some()
        {
            debug!(key = %self.key, "Removed request from in-flight registry");
        }
    }
}

/// Process-wide registry of outstanding computations, keyed by string.
pub struct InFlightDeduplicator<V> {
    registry: Arc<DashMap<String, InFlight<V>>>,
    next_generation: Arc<AtomicU64>,
}

impl<V> Clone for InFlightDeduplicator<V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            next_generation: Arc::clone(&self.next_generation),
        }
    }
}

impl<V> Default for InFlightDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InFlightDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs `loader` unless a computation for `key` is already in flight, in
    /// which case its result is awaited instead.
    ///
    /// Every waiter of a failed computation receives the same error.
    pub async fn run<F, Fut>(&self, key: String, loader: F) -> Result<V, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ResolveError>> + Send + 'static,
    {
        let computation = match self.registry.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(key = %key, "Deduplicating in-flight request");
                entry.get().computation.clone()
            }
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let guard = RegistryGuard {
                    registry: Arc::clone(&self.registry),
                    key: key.clone(),
                    generation,
                };
                let work = loader();
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    let result = work.await;
                    if let Err(ref e) = result {
                        debug!(key = %task_key, error = %e, "In-flight computation failed");
                    }
                    result
                });

                let computation = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(ResolveError::Unknown(format!(
                            "in-flight computation aborted: {}",
                            e
                        ))),
                    }
                }
                .boxed()
                .shared();

                debug!(key = %key, "Starting computation");
                entry.insert(InFlight {
                    generation,
                    computation: computation.clone(),
                });
                computation
            }
        };

        computation.await
    }

    pub fn in_flight_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }
}
