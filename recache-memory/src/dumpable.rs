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

use ahash::RandomState;
use recache_common::{
    code::{BincodeCodec, DumpCodec, HashBuilder, Key, Value},
    dump::{DumpReader, DumpWriter, Dumpable},
    error::Result,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::expirable::ExpirableCache;

/// Exposes an [`ExpirableCache`] as a [`Dumpable`] with a key codec and a value codec.
pub struct DumpableCache<K, V, S = RandomState> {
    cache: ExpirableCache<K, V, S>,
    key_codec: Arc<dyn DumpCodec<K>>,
    value_codec: Arc<dyn DumpCodec<V>>,
}

impl<K, V, S> Clone for DumpableCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key_codec: self.key_codec.clone(),
            value_codec: self.value_codec.clone(),
        }
    }
}

impl<K, V, S> Debug for DumpableCache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpableCache")
            .field("cache", &self.cache)
            .field("key_codec", &self.key_codec)
            .field("value_codec", &self.value_codec)
            .finish()
    }
}

impl<K, V, S> DumpableCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Wrap `cache` with explicit codecs.
    pub fn new(cache: ExpirableCache<K, V, S>, key_codec: Arc<dyn DumpCodec<K>>, value_codec: Arc<dyn DumpCodec<V>>) -> Self {
        Self {
            cache,
            key_codec,
            value_codec,
        }
    }

    /// Wrap `cache` using [`BincodeCodec`] for keys and values.
    pub fn with_bincode(cache: ExpirableCache<K, V, S>) -> Self
    where
        K: Serialize + DeserializeOwned,
        V: Serialize + DeserializeOwned,
    {
        Self::new(
            cache,
            Arc::new(BincodeCodec::<K>::default()),
            Arc::new(BincodeCodec::<V>::default()),
        )
    }

    /// The wrapped cache.
    pub fn cache(&self) -> &ExpirableCache<K, V, S> {
        &self.cache
    }
}

impl<K, V, S> Dumpable for DumpableCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn get_and_write(&self, writer: &mut DumpWriter) -> Result<()> {
        self.cache
            .write_dump(writer, self.key_codec.as_ref(), self.value_codec.as_ref())
    }

    fn read_and_set(&self, reader: &mut DumpReader<'_>) -> Result<()> {
        let restored = self
            .cache
            .read_dump(reader, self.key_codec.as_ref(), self.value_codec.as_ref())?;
        tracing::debug!(restored, "[dumpable cache]: entries restored from dump");
        Ok(())
    }
}
