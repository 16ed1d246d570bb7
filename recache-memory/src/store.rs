// Copyright 2026 recache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::Debug,
    hash::Hash,
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use equivalent::Equivalent;
use parking_lot::RwLock;
use recache_common::{
    clock::SharedClock,
    code::{HashBuilder, Key, Value},
};

use crate::way::Way;

/// A cached value with the monotonic time of its last update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    /// Cached value.
    pub value: V,
    /// Monotonic time of the last write.
    pub update_time: Instant,
}

struct WayShard<K, V> {
    way: RwLock<Way<K, V>>,
    /// Mirror of the way length readable without taking the lock.
    len: AtomicUsize,
}

/// Config for [`ShardedStore`].
pub struct ShardedStoreConfig<S> {
    /// Number of ways. Fixed for the lifetime of the store.
    pub ways: usize,
    /// Capacity of every way.
    pub way_size: usize,
    /// Hash builder used to route keys to ways.
    pub hash_builder: S,
    /// Time source for update times.
    pub clock: SharedClock,
}

/// A fixed number of independent LRU partitions.
///
/// A key is routed to the way `hash(key) % ways`. Operations on different ways never contend.
pub struct ShardedStore<K, V, S> {
    ways: Box<[WayShard<K, V>]>,
    way_size: AtomicUsize,
    hash_builder: S,
    clock: SharedClock,
}

impl<K, V, S> Debug for ShardedStore<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("ways", &self.ways.len())
            .field("way_size", &self.way_size.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V, S> ShardedStore<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Create a store.
    ///
    /// # Panics
    ///
    /// Panics if `ways` is zero.
    pub fn new(config: ShardedStoreConfig<S>) -> Self {
        assert!(config.ways > 0, "ways must be greater than zero.");
        let way_size = clamp_way_size(config.way_size);
        let ways = (0..config.ways)
            .map(|_| WayShard {
                way: RwLock::new(Way::new(way_size)),
                len: AtomicUsize::new(0),
            })
            .collect();
        Self {
            ways,
            way_size: AtomicUsize::new(way_size),
            hash_builder: config.hash_builder,
            clock: config.clock,
        }
    }

    fn route<Q>(&self, key: &Q) -> (u64, &WayShard<K, V>)
    where
        Q: Hash + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        (hash, &self.ways[hash as usize % self.ways.len()])
    }

    /// Look up a key without changing its recency.
    pub fn get<Q>(&self, key: &Q) -> Option<Entry<V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let (hash, shard) = self.route(key);
        shard.way.read().get(hash, key).map(|(_, value, update_time)| Entry {
            value: value.clone(),
            update_time,
        })
    }

    /// Mark a key as the most recently used in its way.
    pub fn touch<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let (hash, shard) = self.route(key);
        shard.way.write().touch(hash, key)
    }

    /// Insert or overwrite a key with the current time as its update time.
    pub fn put(&self, key: K, value: V) {
        let now = self.clock.steady_now();
        self.put_with_time(key, value, now);
    }

    /// Insert or overwrite a key with an explicit update time.
    pub fn put_with_time(&self, key: K, value: V, update_time: Instant) {
        let (hash, shard) = self.route(&key);
        let evicted = {
            let mut way = shard.way.write();
            let evicted = way.put(hash, key, value, update_time);
            shard.len.store(way.len(), Ordering::Relaxed);
            evicted
        };
        // Drop the evicted entry outside of the lock section.
        drop(evicted);
    }

    /// Remove a key.
    pub fn invalidate_by_key<Q>(&self, key: &Q)
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let (hash, shard) = self.route(key);
        let removed = {
            let mut way = shard.way.write();
            let removed = way.remove(hash, key);
            shard.len.store(way.len(), Ordering::Relaxed);
            removed
        };
        drop(removed);
    }

    /// Remove every key.
    pub fn invalidate_all(&self) {
        for shard in self.ways.iter() {
            let mut way = shard.way.write();
            way.clear();
            shard.len.store(0, Ordering::Relaxed);
        }
    }

    /// Sum of the way sizes, read without locking.
    pub fn approximate_size(&self) -> usize {
        self.ways.iter().map(|shard| shard.len.load(Ordering::Relaxed)).sum()
    }

    /// Change the capacity of every way, evicting least recently used entries where a way is over it.
    pub fn set_way_size(&self, way_size: usize) {
        if way_size == 0 {
            tracing::warn!("[sharded store]: way size 0 is not allowed, use 1 instead");
        }
        let way_size = clamp_way_size(way_size);
        self.way_size.store(way_size, Ordering::Relaxed);
        for shard in self.ways.iter() {
            let evicted = {
                let mut way = shard.way.write();
                let evicted = way.set_capacity(way_size);
                shard.len.store(way.len(), Ordering::Relaxed);
                evicted
            };
            drop(evicted);
        }
    }

    /// Number of ways.
    pub fn ways(&self) -> usize {
        self.ways.len()
    }

    /// Capacity of every way.
    pub fn way_size(&self) -> usize {
        self.way_size.load(Ordering::Relaxed)
    }

    /// Copy every entry, way by way.
    ///
    /// Each entry is copied atomically. Writes racing with the snapshot may or may not be included.
    pub fn snapshot(&self) -> Vec<(K, Entry<V>)> {
        let mut entries = Vec::with_capacity(self.approximate_size());
        for shard in self.ways.iter() {
            let way = shard.way.read();
            entries.extend(way.iter().map(|(key, value, update_time)| {
                (
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        update_time,
                    },
                )
            }));
        }
        entries
    }

    /// The clock the store stamps writes with.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

fn clamp_way_size(way_size: usize) -> usize {
    way_size.max(1)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use ahash::RandomState;
    use recache_common::clock::{Clock, MockClock};

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<ShardedStore<u64, String, RandomState>>();
    }

    fn store(ways: usize, way_size: usize, clock: Arc<MockClock>) -> ShardedStore<u64, u64, RandomState> {
        ShardedStore::new(ShardedStoreConfig {
            ways,
            way_size,
            hash_builder: RandomState::new(),
            clock,
        })
    }

    #[test]
    fn test_single_slot_evicts() {
        let store = store(1, 1, Arc::new(MockClock::new()));
        store.put(1, 10);
        store.put(2, 20);
        assert!(store.get(&1u64).is_none());
        assert_eq!(store.get(&2u64).map(|e| e.value), Some(20));
        assert_eq!(store.approximate_size(), 1);
    }

    #[test]
    fn test_put_stamps_clock() {
        let clock = Arc::new(MockClock::new());
        let store = store(4, 8, clock.clone());

        store.put(1, 10);
        let first = store.get(&1u64).unwrap().update_time;
        assert_eq!(first, clock.steady_now());

        clock.advance(Duration::from_secs(5));
        store.put(1, 11);
        let entry = store.get(&1u64).unwrap();
        assert_eq!(entry.value, 11);
        assert_eq!(entry.update_time - first, Duration::from_secs(5));
    }

    #[test]
    fn test_invalidate() {
        let store = store(4, 8, Arc::new(MockClock::new()));
        for k in 0..16 {
            store.put(k, k);
        }
        assert_eq!(store.approximate_size(), 16);

        store.invalidate_by_key(&3u64);
        assert!(store.get(&3u64).is_none());
        assert_eq!(store.approximate_size(), 15);

        store.invalidate_all();
        assert_eq!(store.approximate_size(), 0);
        store.invalidate_all();
        assert_eq!(store.approximate_size(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_set_way_size() {
        let store = store(1, 4, Arc::new(MockClock::new()));
        for k in 0..4 {
            store.put(k, k);
        }
        assert!(store.touch(&0u64));

        store.set_way_size(2);
        assert_eq!(store.way_size(), 2);
        assert_eq!(store.approximate_size(), 2);
        // 0 was promoted, so 1 and 2 are the least recently used.
        assert!(store.get(&0u64).is_some());
        assert!(store.get(&3u64).is_some());

        store.set_way_size(0);
        assert_eq!(store.way_size(), 1);
        assert_eq!(store.approximate_size(), 1);
    }

    #[test]
    fn test_snapshot() {
        let store = store(3, 16, Arc::new(MockClock::new()));
        for k in 0..10 {
            store.put(k, k * 2);
        }
        let mut snapshot = store.snapshot();
        snapshot.sort_by_key(|(k, _)| *k);
        assert_eq!(snapshot.len(), 10);
        assert!(snapshot.iter().all(|(k, e)| e.value == k * 2));
        assert_eq!(store.ways(), 3);
    }
}
