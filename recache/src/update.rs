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
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime},
};

use parking_lot::Mutex;
use recache_common::{
    clock::{to_micros, SharedClock},
    statistics::Counter,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kind of a whole cache update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Recompute the whole cache.
    Full,
    /// Apply the delta since the last update.
    Incremental,
}

impl UpdateType {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Full => "full",
            UpdateType::Incremental => "incremental",
        }
    }
}

impl Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the update routine finished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// Nothing was reported yet.
    #[default]
    NotFinished,
    /// [`UpdateStatisticsScope::finish`] or [`UpdateStatisticsScope::finish_no_changes`] was called.
    Success,
    /// [`UpdateStatisticsScope::finish_with_error`] was called.
    Failure,
}

#[derive(Debug, Default, Clone, Copy)]
struct UpdateTimes {
    last_update_start_time: Option<SystemTime>,
    last_successful_update_start_time: Option<SystemTime>,
    last_update_duration: Duration,
}

/// Counters of one update type.
#[derive(Debug, Default)]
pub struct UpdateStatistics {
    update_attempt_count: Counter,
    update_no_changes_count: Counter,
    update_failures_count: Counter,
    documents_read_count: Counter,
    documents_parse_failures: Counter,
    times: Mutex<UpdateTimes>,
}

/// Point-in-time copy of [`UpdateStatistics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateCounters {
    /// Updates started.
    pub update_attempt_count: u64,
    /// Updates that found nothing new.
    pub update_no_changes_count: u64,
    /// Updates that failed.
    pub update_failures_count: u64,
    /// Documents read by updates.
    pub documents_read_count: u64,
    /// Documents that could not be parsed.
    pub documents_parse_failures: u64,
    /// Duration of the last update.
    pub last_update_duration_ms: u64,
}

impl std::ops::Add for UpdateCounters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            update_attempt_count: self.update_attempt_count + rhs.update_attempt_count,
            update_no_changes_count: self.update_no_changes_count + rhs.update_no_changes_count,
            update_failures_count: self.update_failures_count + rhs.update_failures_count,
            documents_read_count: self.documents_read_count + rhs.documents_read_count,
            documents_parse_failures: self.documents_parse_failures + rhs.documents_parse_failures,
            last_update_duration_ms: self.last_update_duration_ms.max(rhs.last_update_duration_ms),
        }
    }
}

impl UpdateStatistics {
    /// Snapshot the counters.
    pub fn counters(&self) -> UpdateCounters {
        UpdateCounters {
            update_attempt_count: self.update_attempt_count.get(),
            update_no_changes_count: self.update_no_changes_count.get(),
            update_failures_count: self.update_failures_count.get(),
            documents_read_count: self.documents_read_count.get(),
            documents_parse_failures: self.documents_parse_failures.get(),
            last_update_duration_ms: self.times.lock().last_update_duration.as_millis() as u64,
        }
    }

    /// Start time of the last successful update.
    pub fn last_successful_update_start_time(&self) -> Option<SystemTime> {
        self.times.lock().last_successful_update_start_time
    }

    fn to_json(&self) -> Value {
        let times = *self.times.lock();
        let mut value = json!(self.counters());
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "last-update-start-time-us".to_string(),
                json!(times.last_update_start_time.map(to_micros)),
            );
            object.insert(
                "last-successful-update-start-time-us".to_string(),
                json!(times.last_successful_update_start_time.map(to_micros)),
            );
        }
        value
    }
}

/// Update statistics of a cache, by update type.
#[derive(Debug, Default)]
pub struct CacheUpdateStatistics {
    full: UpdateStatistics,
    incremental: UpdateStatistics,
    documents_current_count: AtomicU64,
}

impl CacheUpdateStatistics {
    /// Statistics of `update_type` updates.
    pub fn by_type(&self, update_type: UpdateType) -> &UpdateStatistics {
        match update_type {
            UpdateType::Full => &self.full,
            UpdateType::Incremental => &self.incremental,
        }
    }

    /// Counters of all update types together.
    pub fn total(&self) -> UpdateCounters {
        self.full.counters() + self.incremental.counters()
    }

    /// Number of documents reported by the last finished update.
    pub fn documents_current_count(&self) -> u64 {
        self.documents_current_count.load(Ordering::Relaxed)
    }

    /// Serialize for the statistics registry.
    pub fn to_json(&self) -> Value {
        json!({
            "full": self.full.to_json(),
            "incremental": self.incremental.to_json(),
            "any": self.total(),
            "current-documents-count": self.documents_current_count(),
        })
    }
}

/// Handed to the update routine to report how the update went.
///
/// Exactly one of [`Self::finish`], [`Self::finish_no_changes`] or [`Self::finish_with_error`] is expected to be
/// called before the routine returns.
#[derive(Debug)]
pub struct UpdateStatisticsScope {
    statistics: Arc<CacheUpdateStatistics>,
    update_type: UpdateType,
    state: UpdateState,
    clock: SharedClock,
    start: Instant,
}

impl UpdateStatisticsScope {
    pub(crate) fn new(statistics: Arc<CacheUpdateStatistics>, update_type: UpdateType, clock: SharedClock) -> Self {
        let start = clock.steady_now();
        let stats = statistics.by_type(update_type);
        stats.update_attempt_count.inc();
        stats.times.lock().last_update_start_time = Some(clock.now());
        Self {
            statistics,
            update_type,
            state: UpdateState::NotFinished,
            clock,
            start,
        }
    }

    fn stats(&self) -> &UpdateStatistics {
        self.statistics.by_type(self.update_type)
    }

    /// Type of the running update.
    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    /// Reported state so far.
    pub fn state(&self) -> UpdateState {
        self.state
    }

    fn succeed(&mut self) {
        self.state = UpdateState::Success;
        let start_wall = self.stats().times.lock().last_update_start_time;
        self.stats().times.lock().last_successful_update_start_time = start_wall;
    }

    /// The update succeeded, the cache now holds `total_documents` documents.
    pub fn finish(&mut self, total_documents: u64) {
        self.statistics
            .documents_current_count
            .store(total_documents, Ordering::Relaxed);
        self.succeed();
    }

    /// The update succeeded without finding anything new.
    pub fn finish_no_changes(&mut self) {
        self.stats().update_no_changes_count.inc();
        self.succeed();
    }

    /// The update failed.
    pub fn finish_with_error(&mut self) {
        self.state = UpdateState::Failure;
    }

    /// `n` more documents have been read.
    pub fn increase_documents_read_count(&mut self, n: u64) {
        self.stats().documents_read_count.add(n);
    }

    /// `n` more documents could not be parsed.
    pub fn increase_documents_parse_failures(&mut self, n: u64) {
        self.stats().documents_parse_failures.add(n);
    }

    /// Count an unreported update as a success.
    pub(crate) fn finish_unreported(&mut self) {
        self.succeed();
    }
}

impl Drop for UpdateStatisticsScope {
    fn drop(&mut self) {
        let elapsed = self.clock.steady_now().saturating_duration_since(self.start);
        let stats = self.stats();
        if self.state != UpdateState::Success {
            stats.update_failures_count.inc();
        }
        stats.times.lock().last_update_duration = elapsed;
    }
}

#[cfg(test)]
mod tests {
    use recache_common::clock::MockClock;

    use super::*;

    #[test]
    fn test_scope_accounting() {
        let clock = Arc::new(MockClock::new());
        let statistics = Arc::new(CacheUpdateStatistics::default());

        {
            let mut scope = UpdateStatisticsScope::new(statistics.clone(), UpdateType::Full, clock.clone());
            scope.increase_documents_read_count(10);
            scope.increase_documents_parse_failures(1);
            clock.advance(Duration::from_millis(40));
            scope.finish(9);
        }
        {
            let mut scope = UpdateStatisticsScope::new(statistics.clone(), UpdateType::Incremental, clock.clone());
            scope.finish_no_changes();
        }
        {
            let mut scope = UpdateStatisticsScope::new(statistics.clone(), UpdateType::Incremental, clock.clone());
            scope.finish_with_error();
        }
        {
            // Dropped without a report, e.g. the routine returned an error.
            let _scope = UpdateStatisticsScope::new(statistics.clone(), UpdateType::Incremental, clock.clone());
        }

        let full = statistics.by_type(UpdateType::Full).counters();
        assert_eq!(full.update_attempt_count, 1);
        assert_eq!(full.documents_read_count, 10);
        assert_eq!(full.documents_parse_failures, 1);
        assert_eq!(full.last_update_duration_ms, 40);
        assert_eq!(full.update_failures_count, 0);

        let incremental = statistics.by_type(UpdateType::Incremental).counters();
        assert_eq!(incremental.update_attempt_count, 3);
        assert_eq!(incremental.update_no_changes_count, 1);
        assert_eq!(incremental.update_failures_count, 2);

        assert_eq!(statistics.total().update_attempt_count, 4);
        assert_eq!(statistics.documents_current_count(), 9);

        let json = statistics.to_json();
        assert_eq!(json["any"]["update_failures_count"], 2);
        assert_eq!(json["current-documents-count"], 9);
        assert!(json["full"]["last-successful-update-start-time-us"].is_i64());
        assert!(json["incremental"]["last-successful-update-start-time-us"].is_i64());
    }
}
