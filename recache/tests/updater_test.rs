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

//! Update scheduling, failure accounting, dumps and hot reload of [`CacheUpdater`].

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use recache::{
    list_dumps, AllowedUpdateTypes, CacheUpdater, ConfigSource, DumpConfig, DumpableCache, ErrorKind, ExpirableCache,
    ExpirableCacheBuilder, FirstUpdateMode, FirstUpdateType, StatisticsStorage, Updatable, UpdateStatisticsScope,
    UpdateType, UpdaterBuilder, UpdaterConfig, UpdaterConfigBuilder, UpdaterStartFlags, UpdaterState,
};
use serde_json::json;

const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeed,
    Fail,
    ReportFailure,
    Unreported,
}

struct Tickets {
    cache: ExpirableCache<u64, String>,
    outcome: Mutex<Outcome>,
    calls: Mutex<Vec<UpdateType>>,
    expired_marks: AtomicUsize,
}

impl Tickets {
    fn new(outcome: Outcome) -> Self {
        Self {
            cache: ExpirableCacheBuilder::new(4, 64).build(),
            outcome: Mutex::new(outcome),
            calls: Mutex::new(vec![]),
            expired_marks: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> Vec<UpdateType> {
        self.calls.lock().clone()
    }

    fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock() = outcome;
    }
}

impl Updatable for Tickets {
    async fn update(
        &self,
        update_type: UpdateType,
        _: Option<SystemTime>,
        _: SystemTime,
        statistics: &mut UpdateStatisticsScope,
    ) -> anyhow::Result<()> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(update_type);
            calls.len() as u64
        };
        let outcome = *self.outcome.lock();
        match outcome {
            Outcome::Succeed => {
                self.cache.put(n, format!("ticket-{n}"));
                statistics.increase_documents_read_count(1);
                statistics.finish(self.cache.approximate_size() as u64);
                Ok(())
            }
            Outcome::Fail => anyhow::bail!("ticket source is unavailable"),
            Outcome::ReportFailure => {
                statistics.finish_with_error();
                Ok(())
            }
            Outcome::Unreported => Ok(()),
        }
    }

    fn mark_as_expired(&self) {
        self.expired_marks.fetch_add(1, Ordering::SeqCst);
    }
}

fn hourly() -> UpdaterConfigBuilder {
    UpdaterConfigBuilder::new().with_update_interval(HOUR)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[test_log::test(tokio::test)]
async fn test_only_incremental_invalidate_full() {
    let config = hourly()
        .with_update_types(AllowedUpdateTypes::OnlyIncremental)
        .build()
        .unwrap();
    let updater = UpdaterBuilder::new("tickets", config, Tickets::new(Outcome::Succeed))
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    assert_eq!(updater.state(), UpdaterState::Running);
    assert_eq!(updater.updatable().calls(), vec![UpdateType::Full]);

    updater.invalidate_async(UpdateType::Incremental).await.unwrap();
    wait_until(|| updater.updatable().calls().len() == 2).await;
    assert_eq!(updater.updatable().calls()[1], UpdateType::Incremental);

    updater.invalidate_async(UpdateType::Full).await.unwrap();
    wait_until(|| updater.updatable().calls().len() == 3).await;
    assert_eq!(updater.updatable().calls()[2], UpdateType::Full);

    updater.stop().await;
    assert_eq!(updater.state(), UpdaterState::Stopped);
    // Idempotent.
    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_full_only_downgrades_incremental_invalidation() {
    let config = hourly().build().unwrap();
    let updater = UpdaterBuilder::new("tickets", config, Tickets::new(Outcome::Succeed))
        .with_periodic_updates(false)
        .build()
        .unwrap();
    // Without periodic updates the first update cannot be skipped.
    updater.start(UpdaterStartFlags::NO_FIRST_UPDATE).await.unwrap();
    assert_eq!(updater.updatable().calls(), vec![UpdateType::Full]);

    updater.invalidate_async(UpdateType::Incremental).await.unwrap();
    assert_eq!(updater.updatable().calls(), vec![UpdateType::Full, UpdateType::Full]);
    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_expired_after_consecutive_failures() {
    let config = hourly()
        .with_first_update_fail_ok(true)
        .with_failed_updates_before_expiration(3)
        .build()
        .unwrap();
    let updater = UpdaterBuilder::new("tickets", config, Tickets::new(Outcome::Fail))
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    assert_eq!(updater.consecutive_failures(), 1);
    assert!(!updater.is_expired());
    assert_eq!(updater.last_update(), None);

    updater.invalidate_async(UpdateType::Full).await.unwrap();
    wait_until(|| updater.consecutive_failures() == 2).await;
    assert!(!updater.is_expired());

    updater.invalidate_async(UpdateType::Full).await.unwrap();
    wait_until(|| updater.is_expired()).await;
    assert_eq!(updater.consecutive_failures(), 3);
    assert_eq!(updater.updatable().expired_marks.load(Ordering::SeqCst), 1);

    // Expiration is a signal only, the contents stay.
    updater.updatable().set_outcome(Outcome::Succeed);
    updater.invalidate_async(UpdateType::Full).await.unwrap();
    wait_until(|| updater.consecutive_failures() == 0 && !updater.is_expired()).await;
    assert!(updater.last_update().is_some());
    assert_eq!(updater.statistics().total().update_failures_count, 3);

    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_expiration_threshold_survives_config_reload() {
    let source = ConfigSource::new(json!({
        "caches": { "tickets": { "update-interval-ms": 3_600_000 } },
    }));
    let config = hourly()
        .with_first_update_fail_ok(true)
        .with_failed_updates_before_expiration(2)
        .build()
        .unwrap();
    let updater = UpdaterBuilder::new("tickets", config, Tickets::new(Outcome::Fail))
        .with_config_source(source.clone())
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    assert_eq!(updater.consecutive_failures(), 1);
    assert!(!updater.is_expired());

    // Only the periodic settings are reloadable, the threshold stays as configured at start.
    source.publish(json!({
        "caches": { "tickets": { "update-interval-ms": 7_200_000, "failed-updates-before-expiration": 10 } },
    }));
    assert_eq!(updater.config().update_interval, 2 * HOUR);

    updater.invalidate_async(UpdateType::Full).await.unwrap();
    wait_until(|| updater.is_expired()).await;
    assert_eq!(updater.consecutive_failures(), 2);
    assert_eq!(updater.updatable().expired_marks.load(Ordering::SeqCst), 1);

    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_first_update_failure_stops_updater() {
    let updater = UpdaterBuilder::new("tickets", hourly().build().unwrap(), Tickets::new(Outcome::Fail))
        .build()
        .unwrap();
    let err = updater.start(UpdaterStartFlags::empty()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(updater.state(), UpdaterState::Stopped);

    let err = updater.start(UpdaterStartFlags::empty()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
}

#[test_log::test(tokio::test)]
async fn test_update_reports() {
    let updater = UpdaterBuilder::new("tickets", hourly().build().unwrap(), Tickets::new(Outcome::Succeed))
        .with_periodic_updates(false)
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::empty()).await.unwrap();

    updater.updatable().set_outcome(Outcome::ReportFailure);
    let err = updater.update_sync(UpdateType::Full).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpdateFailed);

    // A routine that reports nothing is counted as a success.
    updater.updatable().set_outcome(Outcome::Unreported);
    updater.update_sync(UpdateType::Full).await.unwrap();

    let full = updater.statistics().by_type(UpdateType::Full).counters();
    assert_eq!(full.update_attempt_count, 3);
    assert_eq!(full.update_failures_count, 1);
    assert_eq!(full.documents_read_count, 1);
    assert_eq!(updater.statistics().documents_current_count(), 1);
    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_no_first_update_flag() {
    let updater = UpdaterBuilder::new("tickets", hourly().build().unwrap(), Tickets::new(Outcome::Succeed))
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::NO_FIRST_UPDATE).await.unwrap();
    assert!(updater.updatable().calls().is_empty());
    assert_eq!(updater.last_update(), None);

    updater.invalidate_async(UpdateType::Incremental).await.unwrap();
    wait_until(|| updater.updatable().calls().len() == 1).await;
    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_config_hot_reload() {
    let source = ConfigSource::new(json!({
        "caches": { "tickets": { "update-interval-ms": 3_600_000 } },
    }));
    let config = UpdaterConfigBuilder::new()
        .with_update_interval(Duration::from_secs(600))
        .build()
        .unwrap();
    let updater = UpdaterBuilder::new("tickets", config, Tickets::new(Outcome::Succeed))
        .with_config_source(source.clone())
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    assert_eq!(updater.config().update_interval, HOUR);
    assert_eq!(updater.periodic_settings().unwrap().period, HOUR);

    source.publish(json!({ "caches": { "tickets": { "update-interval-ms": 5 } } }));
    assert_eq!(updater.periodic_settings().unwrap().period, Duration::from_millis(5));
    wait_until(|| updater.updatable().calls().len() >= 3).await;

    // An invalid patch keeps the current config.
    source.publish(json!({ "caches": { "tickets": { "update-interval-ms": "soon" } } }));
    assert_eq!(updater.config().update_interval, Duration::from_millis(5));

    source.publish(json!({ "caches": {} }));
    assert_eq!(updater.config().update_interval, Duration::from_secs(600));
    assert_eq!(updater.periodic_settings().unwrap().jitter, Duration::from_secs(60));

    updater.stop().await;
    assert_eq!(source.subscribers(), 0);
}

#[test_log::test(tokio::test)]
async fn test_statistics_registration() {
    let storage = StatisticsStorage::new();
    let updater = UpdaterBuilder::new("tickets", hourly().build().unwrap(), Tickets::new(Outcome::Succeed))
        .with_statistics_storage(storage.clone())
        .build()
        .unwrap();
    updater.start(UpdaterStartFlags::empty()).await.unwrap();

    let collected = storage.collect();
    let entry = &collected["cache"][0];
    assert_eq!(entry["labels"]["cache_name"], "tickets");
    assert_eq!(entry["value"]["update"]["any"]["update_attempt_count"], 1);
    assert_eq!(entry["value"]["is-expired"], false);

    updater.stop().await;
    assert!(storage.is_empty());
}

fn dumped_updater(
    dir: &std::path::Path,
    mode: FirstUpdateMode,
    first_update_type: Option<FirstUpdateType>,
    outcome: Outcome,
) -> CacheUpdater<Tickets> {
    let config: UpdaterConfig = hourly()
        .with_update_types(AllowedUpdateTypes::OnlyIncremental)
        .with_dump(DumpConfig::new(dir).with_max_dump_age(HOUR), mode, first_update_type)
        .build()
        .unwrap();
    let tickets = Tickets::new(outcome);
    let dumpable = Arc::new(DumpableCache::with_bincode(tickets.cache.clone()));
    let updater = UpdaterBuilder::new("tickets", config, tickets)
        .with_dump(dumpable)
        .build()
        .unwrap();
    updater.updatable().cache.set_dirty_listener(updater.dirty_listener());
    updater
}

#[test_log::test(tokio::test)]
async fn test_warm_start_from_dump() {
    let dir = tempfile::tempdir().unwrap();

    let updater = dumped_updater(
        dir.path(),
        FirstUpdateMode::BestEffort,
        Some(FirstUpdateType::Incremental),
        Outcome::Succeed,
    );
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    updater.dumper().unwrap().write_dump_sync().await.unwrap();
    let dumped_at = updater.last_update().unwrap();
    updater.stop().await;
    let dumps = list_dumps(dir.path()).unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].update_time, dumped_at);

    // Best effort: a failed first update keeps the dump contents.
    let updater = dumped_updater(
        dir.path(),
        FirstUpdateMode::BestEffort,
        Some(FirstUpdateType::Incremental),
        Outcome::Fail,
    );
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    assert_eq!(updater.updatable().calls(), vec![UpdateType::Incremental]);
    assert_eq!(updater.updatable().cache.get_optional_no_update(&1), Some("ticket-1".to_string()));
    assert_eq!(updater.last_update(), Some(dumped_at));
    assert!(updater.dumper().unwrap().statistics().is_loaded);
    updater.stop().await;

    // Required: the first update must succeed even with a dump.
    let updater = dumped_updater(
        dir.path(),
        FirstUpdateMode::Required,
        Some(FirstUpdateType::Incremental),
        Outcome::Fail,
    );
    assert!(updater.start(UpdaterStartFlags::empty()).await.is_err());
    assert_eq!(updater.state(), UpdaterState::Stopped);

    // Skip: no first update at all.
    let updater = dumped_updater(dir.path(), FirstUpdateMode::Skip, None, Outcome::Fail);
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    assert!(updater.updatable().calls().is_empty());
    assert_eq!(updater.updatable().cache.approximate_size(), 1);
    updater.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_incremental_then_async_full() {
    let dir = tempfile::tempdir().unwrap();

    let updater = dumped_updater(
        dir.path(),
        FirstUpdateMode::Required,
        Some(FirstUpdateType::Incremental),
        Outcome::Succeed,
    );
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    updater.dumper().unwrap().write_dump_sync().await.unwrap();
    updater.stop().await;

    let updater = dumped_updater(
        dir.path(),
        FirstUpdateMode::BestEffort,
        Some(FirstUpdateType::IncrementalThenAsyncFull),
        Outcome::Succeed,
    );
    updater.start(UpdaterStartFlags::empty()).await.unwrap();
    wait_until(|| updater.updatable().calls().len() == 2).await;
    assert_eq!(
        updater.updatable().calls(),
        vec![UpdateType::Incremental, UpdateType::Full]
    );
    updater.stop().await;
}
