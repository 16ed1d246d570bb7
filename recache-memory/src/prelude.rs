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

pub use crate::{
    dumpable::DumpableCache,
    expirable::{
        update_fn, BackgroundUpdateMode, CacheTuning, ExpirableCache, ExpirableCacheBuilder, ReadMode, UpdateValueFn,
        DEFAULT_MAX_LOCK_BUCKETS,
    },
    lock_table::{KeyLockGuard, LockTable},
    statistics::{CacheCounters, CacheStatistics},
    store::{Entry, ShardedStore, ShardedStoreConfig},
    way::Way,
    wrapper::CacheWrapper,
};
