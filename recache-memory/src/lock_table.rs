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

use std::{fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use recache_common::{
    code::HashBuilder,
    error::{Error, Result},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard of a key lock. The lock is released on drop.
pub type KeyLockGuard = OwnedMutexGuard<()>;

/// A fixed set of async locks, selected by key hash.
///
/// Callers locking the same key always get the same lock. Unrelated keys may collide on a bucket, which
/// only costs parallelism.
pub struct LockTable<S> {
    buckets: Box<[Arc<Mutex<()>>]>,
    hash_builder: S,
}

impl<S> Debug for LockTable<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable").field("buckets", &self.buckets.len()).finish()
    }
}

impl<S> LockTable<S>
where
    S: HashBuilder,
{
    /// Create a table with `buckets` locks.
    ///
    /// # Panics
    ///
    /// Panics if `buckets` is zero.
    pub fn new(buckets: usize, hash_builder: S) -> Self {
        assert!(buckets > 0, "buckets must be greater than zero.");
        let buckets = (0..buckets).map(|_| Arc::new(Mutex::new(()))).collect();
        Self { buckets, hash_builder }
    }

    /// Number of buckets.
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket<Q>(&self, key: &Q) -> &Arc<Mutex<()>>
    where
        Q: Hash + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        &self.buckets[hash as usize % self.buckets.len()]
    }

    /// Wait until the lock of `key` is granted.
    pub async fn acquire<Q>(&self, key: &Q) -> KeyLockGuard
    where
        Q: Hash + ?Sized,
    {
        self.bucket(key).clone().lock_owned().await
    }

    /// Take the lock of `key` if it is free.
    pub fn try_acquire<Q>(&self, key: &Q) -> Option<KeyLockGuard>
    where
        Q: Hash + ?Sized,
    {
        self.bucket(key).clone().try_lock_owned().ok()
    }

    /// Wait for the lock of `key` at most `limit`.
    pub async fn acquire_timeout<Q>(&self, key: &Q, limit: Duration) -> Result<KeyLockGuard>
    where
        Q: Hash + ?Sized,
    {
        tokio::time::timeout(limit, self.acquire(key))
            .await
            .map_err(|_| Error::timeout("key lock", limit))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ahash::RandomState;
    use recache_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_try_acquire_same_key() {
        let table = LockTable::new(16, RandomState::new());
        let guard = table.try_acquire("alpha").unwrap();
        assert!(table.try_acquire("alpha").is_none());
        drop(guard);
        assert!(table.try_acquire("alpha").is_some());
    }

    #[test]
    fn test_single_bucket_collides() {
        let table = LockTable::new(1, RandomState::new());
        let _guard = table.try_acquire(&1u64).unwrap();
        assert!(table.try_acquire(&2u64).is_none());
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let table = LockTable::new(4, RandomState::new());
        let _guard = table.acquire(&7u64).await;
        let err = table.acquire_timeout(&7u64, Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_acquire_serializes() {
        let table = Arc::new(LockTable::new(8, RandomState::new()));
        let inside = Arc::new(AtomicUsize::new(0));

        let handles = (0..16)
            .map(|_| {
                let table = table.clone();
                let inside = inside.clone();
                tokio::spawn(async move {
                    let _guard = table.acquire("shared").await;
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
