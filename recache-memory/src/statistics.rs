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

use parking_lot::Mutex;
use recache_common::statistics::Counter;
use serde::Serialize;

/// Point-in-time copy of cache counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    /// Lookups answered with a valid cached value.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Lookups that found an expired value.
    pub stale: u64,
    /// Background refreshes scheduled.
    pub background_updates: u64,
}

impl std::ops::Add for CacheCounters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            hits: self.hits + rhs.hits,
            misses: self.misses + rhs.misses,
            stale: self.stale + rhs.stale,
            background_updates: self.background_updates + rhs.background_updates,
        }
    }
}

/// Cache statistics: all time totals and the most recently rolled window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    /// Counters since the cache was created.
    pub total: CacheCounters,
    /// Counters of the last window closed by [`crate::ExpirableCache::roll_statistics`].
    pub recent: CacheCounters,
}

#[derive(Debug, Default)]
pub(crate) struct StatisticsRecorder {
    hits: Counter,
    misses: Counter,
    stale: Counter,
    background_updates: Counter,

    /// Counters rolled out of the current window so far.
    rolled: Mutex<(CacheCounters, CacheCounters)>,
}

impl StatisticsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.inc();
    }

    pub(crate) fn miss(&self) {
        self.misses.inc();
    }

    pub(crate) fn stale(&self) {
        self.stale.inc();
    }

    pub(crate) fn background_update(&self) {
        self.background_updates.inc();
    }

    fn current(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.get(),
            misses: self.misses.get(),
            stale: self.stale.get(),
            background_updates: self.background_updates.get(),
        }
    }

    fn take(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.take(),
            misses: self.misses.take(),
            stale: self.stale.take(),
            background_updates: self.background_updates.take(),
        }
    }

    pub(crate) fn snapshot(&self) -> CacheStatistics {
        let rolled = self.rolled.lock();
        CacheStatistics {
            total: rolled.0 + self.current(),
            recent: rolled.1,
        }
    }

    /// Close the current window.
    pub(crate) fn roll(&self) {
        let mut rolled = self.rolled.lock();
        let window = self.take();
        rolled.0 = rolled.0 + window;
        rolled.1 = window;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll() {
        let recorder = StatisticsRecorder::default();
        recorder.hit();
        recorder.hit();
        recorder.miss();

        let stats = recorder.snapshot();
        assert_eq!(stats.total.hits, 2);
        assert_eq!(stats.recent, CacheCounters::default());

        recorder.roll();
        recorder.stale();
        let stats = recorder.snapshot();
        assert_eq!(
            stats.total,
            CacheCounters {
                hits: 2,
                misses: 1,
                stale: 1,
                background_updates: 0
            }
        );
        assert_eq!(stats.recent.hits, 2);
        assert_eq!(stats.recent.stale, 0);

        recorder.roll();
        assert_eq!(recorder.snapshot().recent.stale, 1);
        assert_eq!(recorder.snapshot().recent.hits, 0);
    }
}
