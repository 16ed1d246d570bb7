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

use std::fmt::Debug;

use ahash::RandomState;
use recache_common::{
    code::{HashBuilder, Key, Value},
    error::Result,
};

use crate::expirable::{ExpirableCache, ReadMode, UpdateValueFn};

/// An [`ExpirableCache`] bound to a single fetch function.
pub struct CacheWrapper<K, V, S = RandomState> {
    cache: ExpirableCache<K, V, S>,
    fetch: UpdateValueFn<K, V>,
}

impl<K, V, S> Clone for CacheWrapper<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            fetch: self.fetch.clone(),
        }
    }
}

impl<K, V, S> Debug for CacheWrapper<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWrapper").field("cache", &self.cache).finish()
    }
}

impl<K, V, S> CacheWrapper<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Bind `cache` to `fetch`.
    pub fn new(cache: ExpirableCache<K, V, S>, fetch: UpdateValueFn<K, V>) -> Self {
        Self { cache, fetch }
    }

    /// See [`ExpirableCache::get`].
    pub async fn get(&self, key: &K) -> Result<V> {
        self.cache.get(key, &self.fetch, ReadMode::UseCache).await
    }

    /// See [`ExpirableCache::get`].
    pub async fn get_with_mode(&self, key: &K, read_mode: ReadMode) -> Result<V> {
        self.cache.get(key, &self.fetch, read_mode).await
    }

    /// See [`ExpirableCache::get_optional`].
    pub fn get_optional(&self, key: &K) -> Option<V> {
        self.cache.get_optional(key, &self.fetch)
    }

    /// See [`ExpirableCache::invalidate_by_key`].
    pub fn invalidate_by_key(&self, key: &K) {
        self.cache.invalidate_by_key(key)
    }

    /// See [`ExpirableCache::update_in_background`].
    pub fn update_in_background(&self, key: &K) {
        self.cache.update_in_background(key, &self.fetch)
    }

    /// The wrapped cache.
    pub fn cache(&self) -> &ExpirableCache<K, V, S> {
        &self.cache
    }
}
