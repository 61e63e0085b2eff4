//! Single-flight memoizing cache.
//!
//! [`SingleFlightCache`] guarantees at most one in-flight computation per key.
//! Concurrent callers for the same key share the pending computation and all
//! receive the identical value or error. Failed computations are not cached.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::hash::Hash;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::ApiError;

type Pending<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

enum Slot<V> {
    Ready(V),
    Pending(Pending<V>),
}

/// A process-local keyed cache that computes each value once.
///
/// # Cancellation
///
/// Dropping a waiter never cancels the shared computation for the others.
/// If every waiter goes away, the computation is parked in its slot and the
/// next caller for that key resumes it; the factory is not invoked again.
///
/// # Example
///
/// ```
/// use httpapi_core::SingleFlightCache;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = SingleFlightCache::new();
/// let value = cache
///     .get_or_add("answer", |_| async { Ok::<_, httpapi_core::ApiError>(42) })
///     .await
///     .unwrap();
/// assert_eq!(value, 42);
/// assert_eq!(cache.get(&"answer"), Some(42));
/// # }
/// ```
pub struct SingleFlightCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, computing it with `factory` if absent.
    ///
    /// `factory` is called at most once per key while a result is
    /// outstanding. It is called with the cache lock held and must only
    /// build the future; the work belongs inside the returned future.
    pub async fn get_or_add<F, Fut>(&self, key: K, factory: F) -> Result<V, ApiError>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let pending = {
            let mut slots = self.slots.lock();
            match slots.entry(key.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(value) => return Ok(value.clone()),
                    Slot::Pending(pending) => pending.clone(),
                },
                Entry::Vacant(entry) => {
                    let pending = factory(entry.key()).boxed().shared();
                    entry.insert(Slot::Pending(pending.clone()));
                    pending
                }
            }
        };

        let result = pending.clone().await;
        self.settle(&key, &pending, &result);
        result
    }

    /// Replace our pending slot with the outcome. A slot that was removed or
    /// replaced in the meantime is left alone.
    fn settle(&self, key: &K, pending: &Pending<V>, result: &Result<V, ApiError>) {
        let mut slots = self.slots.lock();
        let ours = matches!(slots.get(key), Some(Slot::Pending(current)) if current.ptr_eq(pending));
        if !ours {
            return;
        }
        match result {
            Ok(value) => {
                slots.insert(key.clone(), Slot::Ready(value.clone()));
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }

    /// The completed value for `key`, if any. Pending entries are not returned.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether a computation for `key` is in flight.
    pub fn is_pending(&self, key: &K) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Pending(_)))
    }

    /// Remove the entry for `key`, returning its value if it had completed.
    ///
    /// Callers already awaiting a removed pending entry still get its result,
    /// but the result is not stored.
    pub fn remove(&self, key: &K) -> Option<V> {
        match self.slots.lock().remove(key) {
            Some(Slot::Ready(value)) => Some(value),
            _ => None,
        }
    }

    /// Number of entries, pending ones included.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl<K, V> Default for SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for SingleFlightCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock();
        let pending = slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count();
        f.debug_struct("SingleFlightCache")
            .field("entries", &slots.len())
            .field("pending", &pending)
            .finish()
    }
}
