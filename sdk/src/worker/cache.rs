//! Sticky execution cache
//!
//! Keeps the replay state of recently processed runs so that the next
//! decision task of a run only has to apply the new events. Entries are
//! handed out as `Arc<tokio::sync::Mutex<_>>`: the cache lock covers lookup
//! and insertion only, while the per-run lock serializes processing of one
//! run.

use crate::config::sticky_workflow_cache_size;
use crate::worker::execution::ExecutionState;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

/// Shared handle to one cached run
pub type CachedExecution<S = ExecutionState> = Arc<tokio::sync::Mutex<S>>;

struct CacheEntry<S> {
    state: CachedExecution<S>,
    last_used: u64,
}

struct CacheInner<S> {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, CacheEntry<S>>,
    // last_used tick -> run id, oldest first
    lru: BTreeMap<u64, String>,
}

impl<S> CacheInner<S> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, run_id: &str) -> Option<CachedExecution<S>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(run_id)?;
        self.lru.remove(&entry.last_used);
        entry.last_used = tick;
        self.lru.insert(tick, run_id.to_string());
        Some(Arc::clone(&entry.state))
    }

    fn insert(&mut self, run_id: &str, state: CachedExecution<S>) {
        self.remove(run_id);
        let tick = self.next_tick();
        self.entries.insert(
            run_id.to_string(),
            CacheEntry {
                state,
                last_used: tick,
            },
        );
        self.lru.insert(tick, run_id.to_string());
        self.evict_over_capacity();
    }

    fn remove(&mut self, run_id: &str) -> bool {
        match self.entries.remove(run_id) {
            Some(entry) => {
                self.lru.remove(&entry.last_used);
                true
            }
            None => false,
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((_, run_id)) = self.lru.pop_first() else {
                break;
            };
            self.entries.remove(&run_id);
            tracing::debug!(run_id = %run_id, "Evicted least recently used workflow execution");
        }
    }
}

/// Bounded LRU map from run id to cached execution state
pub struct ExecutionCache<S = ExecutionState> {
    inner: Mutex<CacheInner<S>>,
}

impl<S> ExecutionCache<S> {
    /// Create a cache holding at most `capacity` runs (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity: capacity.max(1),
                tick: 0,
                entries: HashMap::new(),
                lru: BTreeMap::new(),
            }),
        }
    }

    /// Look up a run, marking it most recently used
    pub fn get(&self, run_id: &str) -> Option<CachedExecution<S>> {
        self.inner.lock().touch(run_id)
    }

    /// Insert or replace the state of a run
    pub fn put(&self, run_id: &str, state: S) -> CachedExecution<S> {
        let state = Arc::new(tokio::sync::Mutex::new(state));
        self.inner.lock().insert(run_id, Arc::clone(&state));
        state
    }

    /// Return the cached run, or build and insert a new state.
    ///
    /// The flag is true when the state was created by this call.
    pub fn get_or_insert_with<F>(&self, run_id: &str, init: F) -> (CachedExecution<S>, bool)
    where
        F: FnOnce() -> S,
    {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.touch(run_id) {
            return (state, false);
        }
        let state = Arc::new(tokio::sync::Mutex::new(init()));
        inner.insert(run_id, Arc::clone(&state));
        (state, true)
    }

    /// Remove a run; returns whether it was cached
    pub fn delete(&self, run_id: &str) -> bool {
        self.inner.lock().remove(run_id)
    }

    /// Number of cached runs
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Change the capacity, evicting least recently used runs if needed
    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = capacity.max(1);
        inner.evict_over_capacity();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru.clear();
    }
}

impl<S> std::fmt::Debug for ExecutionCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExecutionCache")
            .field("capacity", &inner.capacity)
            .field("size", &inner.entries.len())
            .finish()
    }
}

static SHARED_CACHE: OnceLock<Arc<ExecutionCache>> = OnceLock::new();

/// Process-wide sticky cache shared by every decision worker.
///
/// Its capacity is read from `sticky_workflow_cache_size()` on first use and
/// cannot be changed through the config afterwards.
pub fn shared_execution_cache() -> Arc<ExecutionCache> {
    Arc::clone(SHARED_CACHE.get_or_init(|| {
        let capacity = sticky_workflow_cache_size();
        tracing::debug!(capacity, "Initializing shared workflow execution cache");
        Arc::new(ExecutionCache::new(capacity))
    }))
}

pub(crate) fn is_shared_cache_initialized() -> bool {
    SHARED_CACHE.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(4);
        assert_eq!(cache.size(), 0);

        cache.put("run-1", 1);
        cache.put("run-2", 2);
        assert_eq!(cache.size(), 2);

        let state = cache.get("run-1").unwrap();
        assert_eq!(*state.try_lock().unwrap(), 1);

        assert!(cache.delete("run-1"));
        assert!(!cache.delete("run-1"));
        assert!(cache.get("run-1").is_none());
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_put_replaces_existing() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(4);
        cache.put("run-1", 1);
        cache.put("run-1", 2);
        assert_eq!(cache.size(), 1);
        assert_eq!(*cache.get("run-1").unwrap().try_lock().unwrap(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(2);
        cache.put("run-1", 1);
        cache.put("run-2", 2);

        // run-1 becomes most recently used
        assert!(cache.get("run-1").is_some());
        cache.put("run-3", 3);

        assert_eq!(cache.size(), 2);
        assert!(cache.get("run-2").is_none());
        assert!(cache.get("run-1").is_some());
        assert!(cache.get("run-3").is_some());
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(8);
        for i in 0..5 {
            cache.put(&format!("run-{}", i), i);
        }
        cache.set_capacity(2);
        assert_eq!(cache.capacity(), 2);
        assert_eq!(cache.size(), 2);
        assert!(cache.get("run-4").is_some());
        assert!(cache.get("run-3").is_some());
        assert!(cache.get("run-0").is_none());
    }

    #[test]
    fn test_get_or_insert_with() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(2);
        let (first, created) = cache.get_or_insert_with("run-1", || 7);
        assert!(created);
        let (second, created) = cache.get_or_insert_with("run-1", || 9);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second.try_lock().unwrap(), 7);
    }

    #[test]
    fn test_evicted_entry_stays_usable_by_holder() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(1);
        let held = cache.put("run-1", 1);
        cache.put("run-2", 2);
        assert!(cache.get("run-1").is_none());
        assert_eq!(*held.try_lock().unwrap(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("run-1", 1);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_clear() {
        let cache: ExecutionCache<u32> = ExecutionCache::new(4);
        cache.put("run-1", 1);
        cache.put("run-2", 2);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
