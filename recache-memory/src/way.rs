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

use std::{hash::Hash, time::Instant};

use equivalent::Equivalent;
use hashbrown::HashTable;

struct Node<K, V> {
    hash: u64,
    key: K,
    value: V,
    update_time: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// One LRU partition of the sharded store.
///
/// Nodes live in a dense vector and are linked by index from the least recently used (`head`) to the most
/// recently used (`tail`). The hash table maps a key hash to the node index.
pub struct Way<K, V> {
    table: HashTable<usize>,
    nodes: Vec<Node<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K, V> Way<K, V>
where
    K: Hash + Eq,
{
    /// Create an empty way that holds at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            table: HashTable::new(),
            nodes: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the way holds no entry.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn find<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let nodes = &self.nodes;
        self.table.find(hash, |&i| key.equivalent(&nodes[i].key)).copied()
    }

    /// Look up an entry without changing its recency.
    pub fn get<Q>(&self, hash: u64, key: &Q) -> Option<(&K, &V, Instant)>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.find(hash, key).map(|i| {
            let node = &self.nodes[i];
            (&node.key, &node.value, node.update_time)
        })
    }

    /// Mark an entry as the most recently used. Returns `false` if the key is absent.
    pub fn touch<Q>(&mut self, hash: u64, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self.find(hash, key) {
            Some(i) => {
                self.unlink(i);
                self.push_back(i);
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite an entry and mark it as the most recently used.
    ///
    /// Returns the least recently used entry if it had to be evicted to make room.
    pub fn put(&mut self, hash: u64, key: K, value: V, update_time: Instant) -> Option<(K, V)> {
        if let Some(i) = self.find(hash, &key) {
            let node = &mut self.nodes[i];
            node.value = value;
            node.update_time = update_time;
            self.unlink(i);
            self.push_back(i);
            return None;
        }

        let evicted = if self.nodes.len() >= self.capacity {
            self.pop_front()
        } else {
            None
        };

        let i = self.nodes.len();
        self.nodes.push(Node {
            hash,
            key,
            value,
            update_time,
            prev: None,
            next: None,
        });
        let nodes = &self.nodes;
        self.table.insert_unique(hash, i, |&x| nodes[x].hash);
        self.push_back(i);

        evicted
    }

    /// Remove an entry.
    pub fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<(K, V)>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let i = self.find(hash, key)?;
        let node = self.remove_at(i);
        Some((node.key, node.value))
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.table.clear();
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Change the capacity, evicting least recently used entries down to it.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<(K, V)> {
        debug_assert!(capacity > 0);
        self.capacity = capacity;
        let mut evicted = Vec::with_capacity(self.nodes.len().saturating_sub(capacity));
        while self.nodes.len() > self.capacity {
            match self.pop_front() {
                Some(kv) => evicted.push(kv),
                None => break,
            }
        }
        evicted
    }

    /// Iterate from the least recently used entry to the most recently used one.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V, Instant)> + '_ {
        std::iter::successors(self.head, |&i| self.nodes[i].next).map(|i| {
            let node = &self.nodes[i];
            (&node.key, &node.value, node.update_time)
        })
    }

    fn pop_front(&mut self) -> Option<(K, V)> {
        let i = self.head?;
        let node = self.remove_at(i);
        Some((node.key, node.value))
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[i].prev = None;
        self.nodes[i].next = None;
    }

    fn push_back(&mut self, i: usize) {
        self.nodes[i].prev = self.tail;
        self.nodes[i].next = None;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(i),
            None => self.head = Some(i),
        }
        self.tail = Some(i);
    }

    fn remove_at(&mut self, i: usize) -> Node<K, V> {
        self.unlink(i);
        if let Ok(entry) = self.table.find_entry(self.nodes[i].hash, |&x| x == i) {
            entry.remove();
        }

        // `swap_remove` moves the last node into slot `i`, re-point everything that referenced it.
        let last = self.nodes.len() - 1;
        if i != last {
            let (prev, next, hash) = (self.nodes[last].prev, self.nodes[last].next, self.nodes[last].hash);
            match prev {
                Some(p) => self.nodes[p].next = Some(i),
                None => self.head = Some(i),
            }
            match next {
                Some(n) => self.nodes[n].prev = Some(i),
                None => self.tail = Some(i),
            }
            if let Some(slot) = self.table.find_mut(hash, |&x| x == last) {
                *slot = i;
            }
        }
        self.nodes.swap_remove(i)
    }
}

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use ahash::RandomState;
    use itertools::Itertools;

    use super::*;

    fn keys(way: &Way<u64, u64>) -> Vec<u64> {
        way.iter().map(|(k, _, _)| *k).collect_vec()
    }

    #[test]
    fn test_lru_order_and_eviction() {
        let hb = RandomState::new();
        let now = Instant::now();
        let mut way = Way::new(3);

        for k in 1..=3u64 {
            assert!(way.put(hb.hash_one(k), k, k * 10, now).is_none());
        }
        assert_eq!(keys(&way), vec![1, 2, 3]);

        // `get` does not promote, `touch` does.
        assert_eq!(way.get(hb.hash_one(1u64), &1u64).map(|(_, v, _)| *v), Some(10));
        assert_eq!(keys(&way), vec![1, 2, 3]);
        assert!(way.touch(hb.hash_one(1u64), &1u64));
        assert_eq!(keys(&way), vec![2, 3, 1]);

        assert_eq!(way.put(hb.hash_one(4u64), 4, 40, now), Some((2, 20)));
        assert_eq!(keys(&way), vec![3, 1, 4]);

        // Overwrite promotes and never evicts.
        assert!(way.put(hb.hash_one(3u64), 3, 33, now).is_none());
        assert_eq!(keys(&way), vec![1, 4, 3]);
        assert_eq!(way.get(hb.hash_one(3u64), &3u64).map(|(_, v, _)| *v), Some(33));
    }

    #[test]
    fn test_remove_relinks() {
        let hb = RandomState::new();
        let now = Instant::now();
        let mut way = Way::new(8);
        for k in 0..6u64 {
            way.put(hb.hash_one(k), k, k, now);
        }

        assert_eq!(way.remove(hb.hash_one(0u64), &0u64), Some((0, 0)));
        assert_eq!(way.remove(hb.hash_one(3u64), &3u64), Some((3, 3)));
        assert_eq!(way.remove(hb.hash_one(3u64), &3u64), None);
        assert_eq!(keys(&way), vec![1, 2, 4, 5]);

        for k in [1u64, 2, 4, 5] {
            assert_eq!(way.get(hb.hash_one(k), &k).map(|(_, v, _)| *v), Some(k));
        }
        assert!(way.touch(hb.hash_one(1u64), &1u64));
        assert_eq!(keys(&way), vec![2, 4, 5, 1]);
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let hb = RandomState::new();
        let now = Instant::now();
        let mut way = Way::new(5);
        for k in 0..5u64 {
            way.put(hb.hash_one(k), k, k, now);
        }

        let evicted = way.set_capacity(2);
        assert_eq!(evicted.into_iter().map(|(k, _)| k).collect_vec(), vec![0, 1, 2]);
        assert_eq!(keys(&way), vec![3, 4]);
        assert_eq!(way.capacity(), 2);

        way.clear();
        assert!(way.is_empty());
        assert!(way.iter().next().is_none());
    }
}
