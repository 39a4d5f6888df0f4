//! Bounded in-process store

use crate::clock::{Clock, SystemClock};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::identity::Identifiable;
use crate::store::{lock, ExpiringStore};
use crate::time_spec::TimeSpec;
use chrono::{DateTime, Utc};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Capacity used by `VolatileStore::with_default_capacity`
pub const DEFAULT_MAX_OBJECTS: u64 = 50;

/// A cached envelope tagged with the write that produced it
struct Slot<T: Identifiable> {
    generation: u64,
    envelope: Envelope<T>,
}

/// Keys believed live, each mapped to the generation of its latest write
type KeyIndex<K> = Arc<Mutex<HashMap<K, u64>>>;

/// An in-memory store holding at most `max_objects` objects.
///
/// When the bound is exceeded the cache evicts the least recently used
/// entries on its own schedule; an eviction listener keeps the key index in step so enumeration never
/// reports a key the cache has dropped. Nothing survives the process.
pub struct VolatileStore<T: Identifiable> {
    cache: Cache<T::Id, Arc<Slot<T>>>,
    keys: KeyIndex<T::Id>,
    /// Serialises index/cache update pairs
    write_lock: Mutex<()>,
    next_generation: AtomicU64,
    max_objects: u64,
    expiry: TimeSpec,
    clock: Arc<dyn Clock>,
}

impl<T> VolatileStore<T>
where
    T: Identifiable + Clone + Send + Sync + 'static,
{
    /// Create a store whose objects expire `expiry` after they are written
    pub fn new(expiry: TimeSpec, max_objects: u64) -> Self {
        let keys: KeyIndex<T::Id> = Arc::new(Mutex::new(HashMap::new()));

        let index = Arc::clone(&keys);
        let cache = Cache::builder()
            .max_capacity(max_objects)
            // Newest writes must always be admitted; evict the least recently used
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<T::Id>, slot: Arc<Slot<T>>, cause| {
                // A notice for an older write of the same key must not drop the newer one
                let mut keys = lock(&index);
                if keys.get(key.as_ref()) == Some(&slot.generation) {
                    keys.remove(key.as_ref());
                    debug!(key = %key, ?cause, "Evicted object from memory");
                }
            })
            .build();

        Self {
            cache,
            keys,
            write_lock: Mutex::new(()),
            next_generation: AtomicU64::new(0),
            max_objects,
            expiry,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_default_capacity(expiry: TimeSpec) -> Self {
        Self::new(expiry, DEFAULT_MAX_OBJECTS)
    }

    /// Use `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn max_objects(&self) -> u64 {
        self.max_objects
    }

    fn live_slot(&self, key: &T::Id, now: DateTime<Utc>) -> Option<Arc<Slot<T>>> {
        self.cache
            .get(key)
            .filter(|slot| !slot.envelope.is_expired_at(now))
    }

    fn indexed_keys(&self) -> Vec<T::Id> {
        lock(&self.keys).keys().cloned().collect()
    }

    /// Caller must hold `write_lock`
    fn remove_locked(&self, key: &T::Id) {
        lock(&self.keys).remove(key);
        self.cache.invalidate(key);
    }
}

impl<T> ExpiringStore<T> for VolatileStore<T>
where
    T: Identifiable + Clone + Send + Sync + 'static,
{
    fn put(&self, object: T) -> Result<()> {
        let now = self.clock.now();
        let envelope = Envelope::new(object, now, self.expiry.future_from(now));
        let key = envelope.key().clone();

        let _guard = lock(&self.write_lock);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // Index before inserting: the insert itself may evict this entry
        lock(&self.keys).insert(key.clone(), generation);
        self.cache
            .insert(key.clone(), Arc::new(Slot { generation, envelope }));

        debug!(key = %key, generation, "Stored object in memory");
        Ok(())
    }

    fn get(&self, key: &T::Id) -> Result<Option<T>> {
        Ok(self
            .live_slot(key, self.clock.now())
            .map(|slot| slot.envelope.object().clone()))
    }

    fn entries(&self) -> Result<Vec<Envelope<T>>> {
        self.cache.run_pending_tasks();
        let now = self.clock.now();

        Ok(self
            .indexed_keys()
            .iter()
            .filter_map(|key| self.live_slot(key, now))
            .map(|slot| slot.envelope.clone())
            .collect())
    }

    fn count(&self) -> usize {
        if let Err(err) = self.delete_expired() {
            warn!(error = %err, "Failed to sweep expired objects before counting");
        }
        self.cache.run_pending_tasks();
        lock(&self.keys).len()
    }

    fn delete(&self, key: &T::Id) -> Result<()> {
        let _guard = lock(&self.write_lock);
        self.remove_locked(key);
        debug!(key = %key, "Deleted object from memory");
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let removed = {
            let mut keys = lock(&self.keys);
            let removed = keys.len();
            keys.clear();
            removed
        };
        self.cache.invalidate_all();
        info!(removed, "Cleared in-memory store");
        Ok(())
    }

    fn delete_expired(&self) -> Result<usize> {
        let _guard = lock(&self.write_lock);
        self.cache.run_pending_tasks();
        let now = self.clock.now();

        let mut purged = 0;
        for key in self.indexed_keys() {
            match self.cache.get(&key) {
                Some(slot) if slot.envelope.is_expired_at(now) => {
                    self.remove_locked(&key);
                    purged += 1;
                    debug!(key = %key, "Purged expired object from memory");
                }
                Some(_) => {}
                None => {
                    warn!(key = %key, "Dropping index entry with no cached object");
                    lock(&self.keys).remove(&key);
                }
            }
        }

        if purged > 0 {
            info!(purged, "Swept expired objects from memory");
        }
        Ok(purged)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
