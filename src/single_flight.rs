//! Single-flight memoization of async builds.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

type Outcome<V, E> = Result<Arc<V>, Arc<E>>;

/// Deduplicates concurrent builds of the same key.
///
/// The first caller for a key runs the builder; callers arriving while it is
/// in flight wait for the same cell. Successes and failures are both kept, so
/// every caller for a key observes one result.
pub struct SingleFlight<K, V, E> {
    slots: Mutex<HashMap<K, Arc<OnceCell<Outcome<V, E>>>>>,
    builds: AtomicUsize,
}

impl<K, V, E> Default for SingleFlight<K, V, E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }
}

impl<K, V, E> std::fmt::Debug for SingleFlight<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("builds", &self.builds.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K: Eq + Hash + Clone, V, E> SingleFlight<K, V, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build<F, Fut>(&self, key: K, build: F) -> Outcome<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };
        cell.get_or_init(|| async {
            self.builds.fetch_add(1, Ordering::Relaxed);
            build().await.map(Arc::new).map_err(Arc::new)
        })
        .await
        .clone()
    }

    /// Completed result for `key`, without building.
    pub fn get(&self, key: &K) -> Option<Outcome<V, E>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of builder invocations so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}
