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
    common::{
        clock::{Clock, MockClock, SharedClock, SystemClock, TimeAnchor},
        code::{BincodeCodec, DumpCodec, Key, Value},
        dump::{DirtyListener, Dumpable},
        error::{Error, ErrorKind, Result},
        spawn::Spawner,
        statistics::{StatisticsHolder, StatisticsStorage},
    },
    component::{LruCacheComponent, LruCacheComponentBuilder},
    config::{
        AllowedUpdateTypes, ConfigPatch, DumpConfig, DumpConfigPatch, DumpSection, DumpSettings, FirstUpdateMode,
        FirstUpdateType, LruCacheConfig, LruCachePatch, UpdaterConfig, UpdaterConfigBuilder, DEFAULT_CLEANUP_INTERVAL,
        DEFAULT_MAX_DUMP_COUNT,
    },
    dump::{
        dump_file_name, is_tmp_file_name, list_dumps, parse_dump_file_name, round_to_micros, DumpFile, DumpManager,
        DumpStatistics, Dumper, DumperBuilder, DumperDirtyListener, TMP_SUFFIX,
    },
    memory::{
        update_fn, BackgroundUpdateMode, CacheCounters, CacheStatistics, CacheTuning, CacheWrapper, DumpableCache,
        ExpirableCache, ExpirableCacheBuilder, ReadMode, UpdateValueFn,
    },
    periodic::{PeriodicBody, PeriodicFlags, PeriodicSettings, PeriodicTask},
    source::{find_patch, ConfigSource, Subscription, CACHES_SECTION, DUMPS_SECTION, LRU_CACHES_SECTION},
    update::{CacheUpdateStatistics, UpdateCounters, UpdateState, UpdateStatistics, UpdateStatisticsScope, UpdateType},
    updater::{CacheUpdater, ModifiedListener, Updatable, UpdaterBuilder, UpdaterStartFlags, UpdaterState},
};
