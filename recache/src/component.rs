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

use std::{fmt::Debug, sync::Arc};

use parking_lot::Mutex;
use recache_common::{
    clock::{SharedClock, SystemClock},
    code::{Key, Value},
    error::{Error, Result},
    spawn::Spawner,
    statistics::{StatisticsHolder, StatisticsStorage},
};
use recache_memory::{
    CacheStatistics, CacheTuning, CacheWrapper, DumpableCache, ExpirableCache, ExpirableCacheBuilder, UpdateValueFn,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::{
    config::{LruCacheConfig, LruCachePatch},
    dump::{Dumper, DumperBuilder},
    source::{find_patch, ConfigSource, Subscription, LRU_CACHES_SECTION},
};

fn apply_config<K, V>(cache: &ExpirableCache<K, V>, config: &LruCacheConfig)
where
    K: Key,
    V: Value,
{
    if cache.way_size() != config.way_size {
        cache.set_way_size(config.way_size);
    }
    let tuning = CacheTuning {
        max_lifetime: config.lifetime,
        background_update: config.background_update,
    };
    if cache.tuning() != tuning {
        cache.set_tuning(tuning);
    }
}

/// A named LRU cache bound to a fetch function, with statistics, optional dumps and config hot reload.
pub struct LruCacheComponent<K, V> {
    name: String,
    config: LruCacheConfig,
    wrapper: CacheWrapper<K, V>,
    dumper: Option<Dumper>,
    subscription: Mutex<Option<Subscription>>,
    statistics_holder: Mutex<Option<StatisticsHolder>>,
}

impl<K, V> Debug for LruCacheComponent<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCacheComponent")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("cache", &self.wrapper)
            .field("dumper", &self.dumper)
            .finish()
    }
}

impl<K, V> LruCacheComponent<K, V>
where
    K: Key,
    V: Value,
{
    /// Name of the cache.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static config.
    pub fn config(&self) -> &LruCacheConfig {
        &self.config
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ExpirableCache<K, V> {
        self.wrapper.cache()
    }

    /// The cache bound to its fetch function.
    pub fn wrapper(&self) -> &CacheWrapper<K, V> {
        &self.wrapper
    }

    /// Return a valid cached value, or fetch, store and return a fresh one.
    pub async fn get(&self, key: &K) -> Result<V> {
        self.wrapper.get(key).await
    }

    /// Return a valid cached value without fetching.
    pub fn get_optional(&self, key: &K) -> Option<V> {
        self.wrapper.get_optional(key)
    }

    /// Insert or overwrite a value.
    pub fn put(&self, key: K, value: V) {
        self.cache().put(key, value);
    }

    /// Remove a key.
    pub fn invalidate_by_key(&self, key: &K) {
        self.wrapper.invalidate_by_key(key);
    }

    /// Remove every key.
    pub fn invalidate(&self) {
        self.cache().invalidate();
    }

    /// Hit, miss, stale and background update counters.
    pub fn statistics(&self) -> CacheStatistics {
        self.cache().statistics()
    }

    /// The dumper, if dumps are configured.
    pub fn dumper(&self) -> Option<&Dumper> {
        self.dumper.as_ref()
    }

    /// Write a dump now. Does nothing without dumps.
    pub async fn write_dump(&self) -> Result<()> {
        match &self.dumper {
            Some(dumper) => dumper.write_dump_sync().await,
            None => Ok(()),
        }
    }

    /// Stop listening to the config, wait for background updates and stop the dump write task.
    pub async fn close(&self) {
        drop(self.subscription.lock().take());
        drop(self.statistics_holder.lock().take());
        self.cache().close().await;
        if let Some(dumper) = &self.dumper {
            dumper.cancel_write_task_and_wait().await;
        }
        tracing::debug!(cache = %self.name, "[lru cache]: closed");
    }
}

/// Builder for [`LruCacheComponent`].
pub struct LruCacheComponentBuilder<K, V> {
    name: String,
    config: LruCacheConfig,
    fetch: UpdateValueFn<K, V>,
    clock: SharedClock,
    spawner: Option<Spawner>,
    config_source: Option<ConfigSource>,
    statistics_storage: Option<StatisticsStorage>,
}

impl<K, V> LruCacheComponentBuilder<K, V>
where
    K: Key + Serialize + DeserializeOwned,
    V: Value + Serialize + DeserializeOwned,
{
    /// Cache `name` filled by `fetch`.
    pub fn new(name: impl Into<String>, config: LruCacheConfig, fetch: UpdateValueFn<K, V>) -> Self {
        Self {
            name: name.into(),
            config,
            fetch,
            clock: Arc::new(SystemClock),
            spawner: None,
            config_source: None,
            statistics_storage: None,
        }
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set where background updates and dump writes run. Defaults to the current runtime.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Hot reload the config from the `lru-caches` and `dumps` sections of `source`.
    pub fn with_config_source(mut self, source: ConfigSource) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Register statistics in `storage`.
    pub fn with_statistics_storage(mut self, storage: StatisticsStorage) -> Self {
        self.statistics_storage = Some(storage);
        self
    }

    /// Build the cache and load its dump, if dumps are configured.
    pub async fn build(self) -> Result<LruCacheComponent<K, V>> {
        let config = self.config;
        if config.ways == 0 {
            return Err(Error::config("ways must be positive").with_context("cache", &self.name));
        }

        let mut builder = ExpirableCacheBuilder::new(config.ways, config.way_size)
            .with_clock(self.clock.clone())
            .with_max_lifetime(config.lifetime)
            .with_background_update(config.background_update);
        if let Some(spawner) = &self.spawner {
            builder = builder.with_spawner(spawner.clone());
        }
        let cache: ExpirableCache<K, V> = builder.build();
        let source = self.config_source.filter(|_| config.config_settings);

        let dumper = match &config.dump {
            Some(dump) => {
                let mut builder = DumperBuilder::new(
                    self.name.clone(),
                    dump.clone(),
                    Arc::new(DumpableCache::with_bincode(cache.clone())),
                )
                .with_clock(self.clock.clone());
                if let Some(spawner) = &self.spawner {
                    builder = builder.with_spawner(spawner.clone());
                }
                if let Some(source) = &source {
                    builder = builder.with_config_source(source.clone());
                }
                if let Some(storage) = &self.statistics_storage {
                    builder = builder.with_statistics_storage(storage.clone());
                }
                let dumper = builder.build()?;
                dumper.read_dump().await;
                cache.set_dirty_listener(dumper.dirty_listener());
                Some(dumper)
            }
            None => None,
        };

        let subscription = source.map(|source| {
            let name = self.name.clone();
            let static_config = config.clone();
            let cache = cache.clone();
            source.update_and_listen(LRU_CACHES_SECTION, move |section| {
                match find_patch::<LruCachePatch>(section, &name) {
                    Ok(patch) => {
                        let config = static_config.merge_with(&patch.unwrap_or_default());
                        apply_config(&cache, &config);
                        tracing::debug!(cache = %name, ?config, "[lru cache]: config updated");
                    }
                    Err(e) => tracing::warn!(cache = %name, %e, "[lru cache]: ignore invalid config patch"),
                }
            })
        });

        let statistics_holder = self.statistics_storage.map(|storage| {
            let cache = cache.clone();
            storage.register_writer("cache.lru", [("cache_name", self.name.clone())], move || {
                let statistics = cache.statistics();
                json!({
                    "current-documents-count": cache.approximate_size(),
                    "hits": statistics.total.hits,
                    "misses": statistics.total.misses,
                    "stale": statistics.total.stale,
                    "background-updates": statistics.total.background_updates,
                    "recent": statistics.recent,
                })
            })
        });

        tracing::info!(
            cache = %self.name,
            ways = config.ways,
            way_size = config.way_size,
            restored = cache.approximate_size(),
            "[lru cache]: built"
        );

        Ok(LruCacheComponent {
            name: self.name,
            config,
            wrapper: CacheWrapper::new(cache, self.fetch),
            dumper,
            subscription: Mutex::new(subscription),
            statistics_holder: Mutex::new(statistics_holder),
        })
    }
}
