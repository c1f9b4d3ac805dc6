//! Bounded memoization for slow-changing lookups (contract lists, contract frames).
//!
//! Entries expire after `ttl`. When full, expired entries are dropped first,
//! then the oldest insertion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct LookupCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `capacity` of zero disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// 128 entries, one hour.
    pub fn default_lookup() -> Self {
        Self::new(128, Duration::from_secs(60 * 60))
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let live = slots
            .get(key)
            .map(|slot| slot.inserted_at.elapsed() < self.ttl);
        match live {
            Some(true) => slots.get(key).map(|slot| slot.value.clone()),
            Some(false) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.contains_key(&key) && slots.len() >= self.capacity {
            let ttl = self.ttl;
            slots.retain(|_, slot| slot.inserted_at.elapsed() < ttl);
            if slots.len() >= self.capacity {
                let oldest = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    slots.remove(&oldest);
                }
            }
        }
        slots.insert(
            key,
            Slot {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Cached value for `key`, or compute, store and return it. Errors are not cached.
    pub fn get_or_try_insert<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
