//! Per-key request coalescing.
//!
//! Concurrent misses for the same cache key share one production. The
//! first caller (the leader) installs a shared future in the in-flight map;
//! later callers clone it and await the same output. The entry is removed
//! when the leader finishes or is dropped, so a later miss starts fresh.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type InFlight<T> = HashMap<String, Shared<BoxFuture<'static, T>>>;

pub struct SingleFlight<T: Clone> {
    inflight: Arc<Mutex<InFlight<T>>>,
}

impl<T: Clone> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            inflight: self.inflight.clone(),
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.inflight).len())
            .finish()
    }
}

fn lock<T: Clone>(map: &Mutex<InFlight<T>>) -> MutexGuard<'_, InFlight<T>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the leader's entry on completion or cancellation
struct LeaderGuard<'a, T: Clone> {
    inflight: &'a Mutex<InFlight<T>>,
    key: &'a str,
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        lock(self.inflight).remove(self.key);
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently being produced
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    /// Run `produce` for `key` unless a production is already in flight,
    /// in which case its output is awaited instead.
    pub async fn run<F, Fut>(&self, key: &str, produce: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (future, leader) = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let shared = produce().boxed().shared();
                    inflight.insert(key.to_string(), shared.clone());
                    (shared, true)
                }
            }
        };

        if leader {
            let _guard = LeaderGuard {
                inflight: &self.inflight,
                key,
            };
            future.await
        } else {
            future.await
        }
    }
}
