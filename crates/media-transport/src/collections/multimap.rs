//! Thread-safe key to value-list map
//!
//! Locking happens at two levels. The sharded [`DashMap`] guards which list a
//! key points at; every list carries its own mutex for element-level changes.
//! A map shard lock is never held while a list lock is taken, so there is no
//! lock-order cycle between the two.
//!
//! Removing a key detaches its list: the list is taken out of the map and then
//! flagged under its own lock. A writer that fetched the list just before the
//! removal either finishes first (its value is part of what `remove` returns)
//! or sees the flag and retries against a fresh list. Observers therefore see
//! a key's list either whole or absent.

use std::fmt;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

struct Bucket<V> {
    values: Vec<V>,
    detached: bool,
}

impl<V> Bucket<V> {
    fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            values: Vec::new(),
            detached: false,
        }))
    }
}

/// Map from a key to a growing list of values, safe for concurrent use
pub struct ConcurrentMultiMap<K, V> {
    map: DashMap<K, Arc<Mutex<Bucket<V>>>>,
}

impl<K, V> ConcurrentMultiMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty map
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Append a value to the key's list, creating the list if absent
    pub fn add(&self, key: K, value: V) {
        self.lock_or_insert(key).push(value);
    }

    /// Lock the key's list for in-place changes, creating it if absent.
    ///
    /// The returned guard always refers to the list currently attached to the
    /// key; the lock is released when the guard is dropped.
    pub fn lock_or_insert(&self, key: K) -> ValueListGuard<V> {
        loop {
            let bucket = Arc::clone(self.map.entry(key.clone()).or_insert_with(Bucket::shared).value());
            let guard = bucket.lock_arc();
            if !guard.detached {
                return ValueListGuard { guard };
            }
            // Lost a race with `remove`; the next lookup sees the new list
        }
    }

    /// Detach and return the whole list for a key
    pub fn remove(&self, key: &K) -> Option<Vec<V>> {
        let (_, bucket) = self.map.remove(key)?;
        let mut guard = bucket.lock();
        guard.detached = true;
        Some(std::mem::take(&mut guard.values))
    }

    /// Handle to the key's list, if the key is present
    pub fn try_get_value_list(&self, key: &K) -> Option<ValueList<V>> {
        self.map.get(key).map(|entry| ValueList {
            bucket: Arc::clone(entry.value()),
        })
    }

    /// Whether the key currently has a list
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Snapshot of the keys present
    pub fn keys(&self) -> Vec<K> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of keys present
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no key is present
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Detach every list and return them with their keys
    pub fn drain(&self) -> Vec<(K, Vec<V>)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.remove(&key).map(|values| (key, values)))
            .collect()
    }

    fn buckets(&self) -> Vec<Arc<Mutex<Bucket<V>>>> {
        self.map.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

impl<K, V> ConcurrentMultiMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Snapshot of one key's list
    pub fn get_values(&self, key: &K) -> Option<Vec<V>> {
        self.try_get_value_list(key)?.lock().map(|list| list.to_vec())
    }

    /// Snapshot of every value across all keys
    pub fn values(&self) -> Vec<V> {
        let mut values = Vec::new();
        for bucket in self.buckets() {
            let guard = bucket.lock();
            if !guard.detached {
                values.extend(guard.values.iter().cloned());
            }
        }
        values
    }

    /// Total number of values across all keys
    pub fn value_count(&self) -> usize {
        self.buckets()
            .iter()
            .map(|bucket| {
                let guard = bucket.lock();
                if guard.detached { 0 } else { guard.values.len() }
            })
            .sum()
    }
}

impl<K, V> Default for ConcurrentMultiMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ConcurrentMultiMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMultiMap")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Shared handle to one key's list
pub struct ValueList<V> {
    bucket: Arc<Mutex<Bucket<V>>>,
}

impl<V> ValueList<V> {
    /// Lock the list, or `None` if it was detached from its key meanwhile
    pub fn lock(&self) -> Option<ValueListGuard<V>> {
        let guard = self.bucket.lock_arc();
        if guard.detached {
            None
        } else {
            Some(ValueListGuard { guard })
        }
    }

    /// Whether the list has been removed from the map
    pub fn is_detached(&self) -> bool {
        self.bucket.lock().detached
    }
}

impl<V> Clone for ValueList<V> {
    fn clone(&self) -> Self {
        Self {
            bucket: Arc::clone(&self.bucket),
        }
    }
}

/// Exclusive access to one attached list for the duration of a critical section
pub struct ValueListGuard<V> {
    guard: ArcMutexGuard<RawMutex, Bucket<V>>,
}

impl<V> Deref for ValueListGuard<V> {
    type Target = Vec<V>;

    fn deref(&self) -> &Vec<V> {
        &self.guard.values
    }
}

impl<V> DerefMut for ValueListGuard<V> {
    fn deref_mut(&mut self) -> &mut Vec<V> {
        &mut self.guard.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_add_preserves_order_within_key() {
        let map = ConcurrentMultiMap::new();
        map.add(1u8, "a");
        map.add(1u8, "b");
        map.add(2u8, "c");

        assert_eq!(map.get_values(&1), Some(vec!["a", "b"]));
        assert_eq!(map.get_values(&2), Some(vec!["c"]));
        assert_eq!(map.len(), 2);
        assert_eq!(map.value_count(), 3);
    }

    #[test]
    fn test_remove_detaches_list() {
        let map = ConcurrentMultiMap::new();
        map.add(7u8, 1u32);
        map.add(7u8, 2u32);

        let handle = map.try_get_value_list(&7).unwrap();
        assert_eq!(map.remove(&7), Some(vec![1, 2]));
        assert!(handle.is_detached());
        assert!(handle.lock().is_none());
        assert!(!map.contains_key(&7));
        assert_eq!(map.remove(&7), None);

        // A fresh list is created on the next add
        map.add(7u8, 3u32);
        assert_eq!(map.get_values(&7), Some(vec![3]));
    }

    #[test]
    fn test_in_place_removal_through_handle() {
        let map = ConcurrentMultiMap::new();
        for value in 0..5u32 {
            map.add("stream", value);
        }

        let handle = map.try_get_value_list(&"stream").unwrap();
        {
            let mut list = handle.lock().unwrap();
            list.retain(|value| value % 2 == 0);
        }
        assert_eq!(map.get_values(&"stream"), Some(vec![0, 2, 4]));
    }

    #[test]
    fn test_drain_empties_map() {
        let map = ConcurrentMultiMap::new();
        map.add(1u8, 'x');
        map.add(2u8, 'y');

        let mut drained = map.drain();
        drained.sort_by_key(|(key, _)| *key);
        assert_eq!(drained, vec![(1, vec!['x']), (2, vec!['y'])]);
        assert!(map.is_empty());
        assert!(map.values().is_empty());
    }

    #[test]
    fn test_concurrent_add_and_remove_loses_nothing() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 500;

        let map = ConcurrentMultiMap::new();
        let barrier = Barrier::new(WRITERS + 1);
        let mut collected = Vec::new();

        thread::scope(|s| {
            for writer in 0..WRITERS {
                let map = &map;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..PER_WRITER {
                        map.add(0u8, writer * PER_WRITER + i);
                    }
                });
            }

            barrier.wait();
            for _ in 0..200 {
                if let Some(values) = map.remove(&0) {
                    collected.extend(values);
                }
                thread::yield_now();
            }
        });

        if let Some(values) = map.remove(&0) {
            collected.extend(values);
        }
        collected.sort_unstable();
        assert_eq!(collected, (0..WRITERS * PER_WRITER).collect::<Vec<_>>());
    }
}
