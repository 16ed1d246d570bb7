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
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use ahash::RandomState;
use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt};
use recache_common::{
    clock::{Clock, SharedClock, SystemClock},
    code::{DumpCodec, HashBuilder, Key, Value},
    dump::{DirtyListener, DumpReader, DumpWriter},
    error::{Error, Result},
    rcu::Variable,
    spawn::Spawner,
    wait_token::WaitTokenStorage,
};
use serde::{Deserialize, Serialize};

use crate::{
    lock_table::LockTable,
    statistics::{CacheStatistics, StatisticsRecorder},
    store::{ShardedStore, ShardedStoreConfig},
};

/// Fetches the up-to-date value of a key.
pub type UpdateValueFn<K, V> = Arc<dyn Fn(K) -> BoxFuture<'static, anyhow::Result<V>> + Send + Sync + 'static>;

/// Wrap an async closure into an [`UpdateValueFn`].
pub fn update_fn<K, V, F, FU>(f: F) -> UpdateValueFn<K, V>
where
    F: Fn(K) -> FU + Send + Sync + 'static,
    FU: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    Arc::new(move |key| f(key).boxed())
}

/// Whether the synchronous [`ExpirableCache::get`] stores the fetched value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Store the fetched value.
    #[default]
    UseCache,
    /// Return the fetched value without storing it.
    SkipCache,
}

/// Whether values close to expiration are refreshed in background.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundUpdateMode {
    /// Never refresh ahead.
    #[default]
    Disabled,
    /// Refresh values older than half of their lifetime.
    Enabled,
}

/// Hot reloadable tuning of an [`ExpirableCache`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheTuning {
    /// Lifetime of a value, zero means values never expire.
    pub max_lifetime: Duration,
    /// Refresh-ahead mode.
    pub background_update: BackgroundUpdateMode,
}

impl CacheTuning {
    fn is_expired(&self, update_time: Instant, now: Instant) -> bool {
        // A lifetime past the range of `Instant` never runs out.
        !self.max_lifetime.is_zero() && update_time.checked_add(self.max_lifetime).is_some_and(|t| t < now)
    }

    fn should_update(&self, update_time: Instant, now: Instant) -> bool {
        self.background_update == BackgroundUpdateMode::Enabled
            && !self.max_lifetime.is_zero()
            && update_time
                .checked_add(self.max_lifetime / 2)
                .is_some_and(|t| t < now)
    }
}

/// Maximum number of key locks allocated by default.
pub const DEFAULT_MAX_LOCK_BUCKETS: usize = 4096;

/// Builder for [`ExpirableCache`].
pub struct ExpirableCacheBuilder<S = RandomState> {
    ways: usize,
    way_size: usize,
    hash_builder: S,
    clock: SharedClock,
    spawner: Option<Spawner>,
    lock_buckets: Option<usize>,
    lock_timeout: Option<Duration>,
    tuning: CacheTuning,
}

impl ExpirableCacheBuilder<RandomState> {
    /// Start building a cache with `ways` partitions of `way_size` entries each.
    pub fn new(ways: usize, way_size: usize) -> Self {
        Self {
            ways,
            way_size,
            hash_builder: RandomState::default(),
            clock: Arc::new(SystemClock),
            spawner: None,
            lock_buckets: None,
            lock_timeout: None,
            tuning: CacheTuning::default(),
        }
    }
}

impl<S> ExpirableCacheBuilder<S>
where
    S: HashBuilder + Clone,
{
    /// Set the hash builder used to route keys to ways and key locks.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> ExpirableCacheBuilder<OS>
    where
        OS: HashBuilder + Clone,
    {
        ExpirableCacheBuilder {
            ways: self.ways,
            way_size: self.way_size,
            hash_builder,
            clock: self.clock,
            spawner: self.spawner,
            lock_buckets: self.lock_buckets,
            lock_timeout: self.lock_timeout,
            tuning: self.tuning,
        }
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set where background refreshes run.
    ///
    /// Defaults to the runtime of the caller that schedules the refresh.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Set the number of key locks.
    ///
    /// Defaults to `ways * way_size`, at most [`DEFAULT_MAX_LOCK_BUCKETS`].
    pub fn with_lock_buckets(mut self, buckets: usize) -> Self {
        self.lock_buckets = Some(buckets);
        self
    }

    /// Give up waiting for a key lock in [`ExpirableCache::get`] after `timeout`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Set the initial max lifetime.
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.tuning.max_lifetime = max_lifetime;
        self
    }

    /// Set the initial background update mode.
    pub fn with_background_update(mut self, mode: BackgroundUpdateMode) -> Self {
        self.tuning.background_update = mode;
        self
    }

    /// Build the cache.
    ///
    /// # Panics
    ///
    /// Panics if `ways` is zero.
    pub fn build<K, V>(self) -> ExpirableCache<K, V, S>
    where
        K: Key,
        V: Value,
    {
        let buckets = self
            .lock_buckets
            .unwrap_or_else(|| self.ways.saturating_mul(self.way_size).clamp(1, DEFAULT_MAX_LOCK_BUCKETS))
            .max(1);
        let store = ShardedStore::new(ShardedStoreConfig {
            ways: self.ways,
            way_size: self.way_size,
            hash_builder: self.hash_builder.clone(),
            clock: self.clock.clone(),
        });
        let inner = Inner {
            store,
            locks: LockTable::new(buckets, self.hash_builder),
            tuning: Variable::new(self.tuning),
            statistics: StatisticsRecorder::default(),
            clock: self.clock,
            spawner: self.spawner,
            wait_tokens: WaitTokenStorage::new(),
            dirty_listener: ArcSwapOption::empty(),
            lock_timeout: self.lock_timeout,
            closed: AtomicBool::new(false),
        };
        ExpirableCache { inner: Arc::new(inner) }
    }
}

struct Inner<K, V, S> {
    store: ShardedStore<K, V, S>,
    locks: LockTable<S>,
    tuning: Variable<CacheTuning>,
    statistics: StatisticsRecorder,
    clock: SharedClock,
    spawner: Option<Spawner>,
    wait_tokens: WaitTokenStorage,
    dirty_listener: ArcSwapOption<Box<dyn DirtyListener>>,
    lock_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl<K, V, S> Inner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn notify_dirty(&self) {
        if let Some(listener) = self.dirty_listener.load().as_ref() {
            listener.on_modified();
        }
    }

    fn put_with_time(&self, key: K, value: V, update_time: Instant) {
        self.store.put_with_time(key, value, update_time);
        self.notify_dirty();
    }
}

/// A sharded LRU cache with time-to-live, refresh-ahead, single-flight fetches and dumps.
pub struct ExpirableCache<K, V, S = RandomState> {
    inner: Arc<Inner<K, V, S>>,
}

impl<K, V, S> Clone for ExpirableCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, S> Debug for ExpirableCache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirableCache")
            .field("store", &self.inner.store)
            .field("locks", &self.inner.locks)
            .field("tuning", &self.inner.tuning)
            .finish()
    }
}

impl<K, V, S> ExpirableCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Return a valid cached value, or fetch, store and return a fresh one.
    ///
    /// Concurrent callers asking for the same missing key share one fetch: the first caller fetches while
    /// holding the key lock, the others find its result on the second lookup.
    pub async fn get(&self, key: &K, fetch: &UpdateValueFn<K, V>, read_mode: ReadMode) -> Result<V> {
        let now = self.inner.clock.steady_now();
        if let Some(value) = self.get_optional(key, fetch) {
            return Ok(value);
        }

        let _guard = match self.inner.lock_timeout {
            Some(limit) => self.inner.locks.acquire_timeout(key, limit).await?,
            None => self.inner.locks.acquire(key).await,
        };

        if let Some(entry) = self.inner.store.get(key) {
            if !self.inner.tuning.read().is_expired(entry.update_time, now) {
                self.inner.store.touch(key);
                return Ok(entry.value);
            }
        }

        let value = fetch(key.clone())
            .await
            .map_err(|e| Error::external("fetch failed", e).with_context("key", format!("{key:?}")))?;
        if read_mode == ReadMode::UseCache {
            self.inner.put_with_time(key.clone(), value.clone(), now);
        }
        Ok(value)
    }

    /// Non-blocking lookup.
    ///
    /// Schedules a background refresh of a valid value that is older than half of its lifetime. Expired
    /// values are not returned.
    pub fn get_optional(&self, key: &K, fetch: &UpdateValueFn<K, V>) -> Option<V> {
        let now = self.inner.clock.steady_now();
        let tuning = self.inner.tuning.read();
        match self.inner.store.get(key) {
            Some(entry) if !tuning.is_expired(entry.update_time, now) => {
                self.inner.statistics.hit();
                self.inner.store.touch(key);
                if tuning.should_update(entry.update_time, now) {
                    self.update_in_background(key, fetch);
                }
                Some(entry.value)
            }
            Some(_) => {
                self.inner.statistics.stale();
                None
            }
            None => {
                self.inner.statistics.miss();
                None
            }
        }
    }

    /// Lookup that ignores expiration and never refreshes.
    pub fn get_optional_unexpirable(&self, key: &K) -> Option<V> {
        match self.inner.store.get(key) {
            Some(entry) => {
                self.inner.statistics.hit();
                self.inner.store.touch(key);
                Some(entry.value)
            }
            None => {
                self.inner.statistics.miss();
                None
            }
        }
    }

    /// Lookup that ignores expiration but still refreshes values close to it.
    pub fn get_optional_unexpirable_with_update(&self, key: &K, fetch: &UpdateValueFn<K, V>) -> Option<V> {
        let now = self.inner.clock.steady_now();
        match self.inner.store.get(key) {
            Some(entry) => {
                self.inner.statistics.hit();
                self.inner.store.touch(key);
                if self.inner.tuning.read().should_update(entry.update_time, now) {
                    self.update_in_background(key, fetch);
                }
                Some(entry.value)
            }
            None => {
                self.inner.statistics.miss();
                None
            }
        }
    }

    /// Lookup that honors expiration but never refreshes.
    pub fn get_optional_no_update(&self, key: &K) -> Option<V> {
        let now = self.inner.clock.steady_now();
        match self.inner.store.get(key) {
            Some(entry) if !self.inner.tuning.read().is_expired(entry.update_time, now) => {
                self.inner.statistics.hit();
                self.inner.store.touch(key);
                Some(entry.value)
            }
            Some(_) => {
                self.inner.statistics.stale();
                None
            }
            None => {
                self.inner.statistics.miss();
                None
            }
        }
    }

    /// Refresh a key in background.
    ///
    /// Nothing is scheduled if a refresh or a synchronous fetch of the same key is already running, or if the
    /// cache is closed.
    pub fn update_in_background(&self, key: &K, fetch: &UpdateValueFn<K, V>) {
        // Take the token before checking `closed` so `close` either sees it or this call sees the flag.
        let token = self.inner.wait_tokens.get_token();
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let Some(guard) = self.inner.locks.try_acquire(key) else {
            tracing::trace!(?key, "[expirable cache]: key is being updated, skip background update");
            return;
        };
        let Some(spawner) = self.inner.spawner.clone().or_else(Spawner::try_current) else {
            tracing::warn!(?key, "[expirable cache]: no runtime to run background update on, skip");
            return;
        };

        self.inner.statistics.background_update();
        let inner = self.inner.clone();
        let key = key.clone();
        let fetch = fetch.clone();
        spawner.spawn(async move {
            let _token = token;
            let _guard = guard;
            let now = inner.clock.steady_now();
            match fetch(key.clone()).await {
                Ok(value) => inner.put_with_time(key, value, now),
                Err(e) => tracing::warn!(?key, "[expirable cache]: background update failed: {e:#}"),
            }
        });
    }

    /// Insert or overwrite a value.
    pub fn put(&self, key: K, value: V) {
        let now = self.inner.clock.steady_now();
        self.inner.put_with_time(key, value, now);
    }

    /// Remove a key.
    pub fn invalidate_by_key(&self, key: &K) {
        self.inner.store.invalidate_by_key(key);
        self.inner.notify_dirty();
    }

    /// Remove every key.
    pub fn invalidate(&self) {
        self.inner.store.invalidate_all();
        self.inner.notify_dirty();
    }

    /// Change the capacity of every way.
    pub fn set_way_size(&self, way_size: usize) {
        self.inner.store.set_way_size(way_size);
    }

    /// Change the max lifetime. Zero disables expiration.
    pub fn set_max_lifetime(&self, max_lifetime: Duration) {
        self.inner.tuning.update(|tuning| CacheTuning {
            max_lifetime,
            ..*tuning
        });
    }

    /// Change the background update mode.
    pub fn set_background_update(&self, background_update: BackgroundUpdateMode) {
        self.inner.tuning.update(|tuning| CacheTuning {
            background_update,
            ..*tuning
        });
    }

    /// Change lifetime and background update mode at once.
    pub fn set_tuning(&self, tuning: CacheTuning) {
        self.inner.tuning.assign(tuning);
    }

    /// Current max lifetime.
    pub fn max_lifetime(&self) -> Duration {
        self.inner.tuning.read().max_lifetime
    }

    /// Current tuning.
    pub fn tuning(&self) -> CacheTuning {
        *self.inner.tuning.read()
    }

    /// Release tuning snapshots no reader holds any more.
    pub fn cleanup(&self) {
        self.inner.tuning.cleanup();
    }

    /// Number of entries, read without locking.
    pub fn approximate_size(&self) -> usize {
        self.inner.store.approximate_size()
    }

    /// Number of ways.
    pub fn ways(&self) -> usize {
        self.inner.store.ways()
    }

    /// Capacity of every way.
    pub fn way_size(&self) -> usize {
        self.inner.store.way_size()
    }

    /// The time source of the cache.
    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    /// Hit, miss, stale and background update counters.
    pub fn statistics(&self) -> CacheStatistics {
        self.inner.statistics.snapshot()
    }

    /// Close the current statistics window.
    pub fn roll_statistics(&self) {
        self.inner.statistics.roll();
    }

    /// Register the listener notified on every modification.
    pub fn set_dirty_listener(&self, listener: impl DirtyListener) {
        let listener: Box<dyn DirtyListener> = Box::new(listener);
        self.inner.dirty_listener.store(Some(Arc::new(listener)));
    }

    /// Stop scheduling background updates and wait for the running ones.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.wait_tokens.wait_for_all_tokens().await;
    }

    /// Write every entry into a dump.
    ///
    /// Monotonic update times are stored as wall-clock times using the anchor of `writer`.
    pub fn write_dump(
        &self,
        writer: &mut DumpWriter,
        key_codec: &dyn DumpCodec<K>,
        value_codec: &dyn DumpCodec<V>,
    ) -> Result<()> {
        let anchor = writer.anchor();
        let mut kbuf = vec![];
        let mut vbuf = vec![];
        for (key, entry) in self.inner.store.snapshot() {
            kbuf.clear();
            vbuf.clear();
            key_codec.encode(&key, &mut kbuf)?;
            value_codec.encode(&entry.value, &mut vbuf)?;
            writer.write_entry(&kbuf, &vbuf, anchor.to_wall(entry.update_time))?;
        }
        Ok(())
    }

    /// Restore entries from a dump, returning how many were restored.
    ///
    /// The whole dump is decoded before anything is stored, so a corrupted dump leaves the cache untouched.
    /// Wall-clock update times are re-based onto the monotonic clock of this process.
    pub fn read_dump(
        &self,
        reader: &mut DumpReader<'_>,
        key_codec: &dyn DumpCodec<K>,
        value_codec: &dyn DumpCodec<V>,
    ) -> Result<usize> {
        let anchor = self.inner.clock.anchor();
        let mut entries = Vec::with_capacity(reader.header().entries.min(1 << 20) as usize);
        while let Some(record) = reader.next_entry()? {
            let key = key_codec.decode(&record.key)?;
            let value = value_codec.decode(&record.value)?;
            match anchor.to_steady(record.update_time) {
                Some(update_time) => entries.push((key, value, update_time)),
                None => tracing::debug!(?key, "[expirable cache]: dumped update time is out of range, skip"),
            }
        }

        let restored = entries.len();
        for (key, value, update_time) in entries {
            self.inner.store.put_with_time(key, value, update_time);
        }
        Ok(restored)
    }
}
