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
    fs,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use recache_common::{
    clock::{to_micros, SharedClock, SystemClock},
    dump::{DirtyListener, DumpReader, DumpWriter, Dumpable},
    error::{Error, Result},
    rcu::Variable,
    spawn::{SpawnHandle, Spawner},
    statistics::{StatisticsHolder, StatisticsStorage},
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{
    sync::{oneshot, Notify},
    time::Instant,
};

use super::manager::{round_to_micros, DumpManager};
use crate::{
    config::{DumpConfig, DumpConfigPatch, DumpSettings},
    source::{find_patch, ConfigSource, Subscription, DUMPS_SECTION},
};

/// Update times of cache contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpdateTime {
    /// The last successful update.
    last_update: SystemTime,
    /// The last update that changed the contents.
    last_modifying_update: SystemTime,
}

impl UpdateTime {
    fn new(time: SystemTime) -> Self {
        Self {
            last_update: time,
            last_modifying_update: time,
        }
    }
}

#[derive(Debug, Default)]
struct DumpState {
    current: Option<UpdateTime>,
    dumped: Option<UpdateTime>,
}

/// Point-in-time copy of the dumper statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DumpStatistics {
    /// A dump has been loaded at start.
    pub is_loaded: bool,
    /// The cache holds exactly what the loaded dump held.
    pub is_current_from_dump: bool,
    /// Time taken to load the dump.
    pub load_duration_ms: u64,
    /// Size of the last written dump.
    pub last_written_size: u64,
    /// Time taken by the last write that serialized the cache.
    pub last_nontrivial_write_duration_ms: u64,
    /// Start of the last write that serialized the cache, in microseconds since the epoch.
    pub last_nontrivial_write_start_time_us: Option<i64>,
}

#[derive(Debug, Default)]
struct DumperStatistics {
    is_loaded: AtomicBool,
    is_current_from_dump: AtomicBool,
    load_duration_ms: AtomicU64,
    last_written_size: AtomicU64,
    last_nontrivial_write_duration_ms: AtomicU64,
    last_nontrivial_write_start_time: Mutex<Option<SystemTime>>,
}

impl DumperStatistics {
    fn snapshot(&self) -> DumpStatistics {
        DumpStatistics {
            is_loaded: self.is_loaded.load(Ordering::Relaxed),
            is_current_from_dump: self.is_current_from_dump.load(Ordering::Relaxed),
            load_duration_ms: self.load_duration_ms.load(Ordering::Relaxed),
            last_written_size: self.last_written_size.load(Ordering::Relaxed),
            last_nontrivial_write_duration_ms: self.last_nontrivial_write_duration_ms.load(Ordering::Relaxed),
            last_nontrivial_write_start_time_us: self.last_nontrivial_write_start_time.lock().map(to_micros),
        }
    }
}

struct Inner {
    name: String,
    config: DumpConfig,
    settings: Variable<DumpSettings>,
    manager: Arc<DumpManager>,
    dumpable: Arc<dyn Dumpable>,
    clock: SharedClock,
    spawner: Spawner,

    state: Mutex<DumpState>,
    /// Set by direct modifications of the cache, consumed by the next write.
    dirty: AtomicBool,
    /// Serializes dump reads and writes.
    io: tokio::sync::Mutex<()>,
    data_updated: Notify,
    config_updated: Notify,

    statistics: DumperStatistics,
}

impl Inner {
    fn set_config(&self, patch: &DumpConfigPatch) {
        let settings = self.config.merge_with(patch);
        let old = self.settings.read();
        if *old == settings {
            return;
        }
        if old.dumps_enabled != settings.dumps_enabled {
            tracing::info!(cache = %self.name, enabled = settings.dumps_enabled, "[dumper]: dumps switched");
        }
        self.settings.assign(settings);
        self.config_updated.notify_one();
    }

    fn on_config_update(&self, section: Option<&Value>) {
        match find_patch::<DumpConfigPatch>(section, &self.name) {
            Ok(patch) => self.set_config(&patch.unwrap_or_default()),
            Err(e) => tracing::warn!(cache = %self.name, %e, "[dumper]: ignore invalid dump config patch"),
        }
    }

    fn on_modified(&self) {
        if !self.dirty.swap(true, Ordering::AcqRel) {
            self.data_updated.notify_one();
        }
    }

    async fn write_dump(&self) -> Result<()> {
        let _io = self.io.lock().await;

        if !self.settings.read().dumps_enabled {
            tracing::debug!(cache = %self.name, "[dumper]: dumps are disabled, skip writing");
            return Ok(());
        }

        let (current, dumped) = {
            let mut state = self.state.lock();
            if self.dirty.swap(false, Ordering::AcqRel) {
                state.current = Some(UpdateTime::new(round_to_micros(self.clock.now())));
                self.statistics.is_current_from_dump.store(false, Ordering::Relaxed);
            }
            (state.current, state.dumped)
        };
        let Some(current) = current else {
            tracing::debug!(cache = %self.name, "[dumper]: nothing to dump yet");
            return Ok(());
        };
        if dumped == Some(current) {
            return Ok(());
        }

        match dumped {
            Some(dumped) if dumped.last_modifying_update == current.last_modifying_update => {
                let manager = self.manager.clone();
                let bumped = self
                    .spawner
                    .spawn_blocking(move || manager.bump_dump_time(dumped.last_update, current.last_update))
                    .await?;
                if bumped {
                    self.state.lock().dumped = Some(current);
                    return Ok(());
                }
                self.write_new_dump(current, false).await
            }
            _ => self.write_new_dump(current, true).await,
        }
    }

    async fn write_new_dump(&self, current: UpdateTime, cleanup: bool) -> Result<()> {
        let start = self.clock.steady_now();
        let start_time = self.clock.now();
        let anchor = self.clock.anchor();
        let manager = self.manager.clone();
        let dumpable = self.dumpable.clone();

        let (file, size) = self
            .spawner
            .spawn_blocking(move || -> Result<_> {
                if cleanup {
                    manager.cleanup();
                }
                let mut writer = DumpWriter::new(anchor);
                dumpable.get_and_write(&mut writer)?;
                let data = writer.finish();
                let file = manager.write_new_dump(current.last_update, &data)?;
                Ok((file, data.len()))
            })
            .await??;

        let elapsed = self.clock.steady_now().saturating_duration_since(start);
        self.statistics.last_written_size.store(size as u64, Ordering::Relaxed);
        self.statistics
            .last_nontrivial_write_duration_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
        *self.statistics.last_nontrivial_write_start_time.lock() = Some(start_time);
        self.state.lock().dumped = Some(current);

        tracing::info!(
            cache = %self.name,
            path = %file.path.display(),
            size,
            ?elapsed,
            "[dumper]: dump written"
        );
        Ok(())
    }
}

struct WriteTask {
    stop_tx: oneshot::Sender<()>,
    handle: SpawnHandle<()>,
}

/// Loads the dump of a cache at start and writes new dumps after updates.
///
/// Writes run on a background task. A write either renames the previous dump when the contents did not change
/// since it was taken, or serializes the whole cache into a new dump.
pub struct Dumper {
    inner: Arc<Inner>,
    task: Mutex<Option<WriteTask>>,
    _subscription: Option<Subscription>,
    _statistics: Option<StatisticsHolder>,
}

impl Debug for Dumper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dumper")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("settings", &self.inner.settings.read())
            .finish()
    }
}

impl Dumper {
    /// Name of the dumped cache.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Locator of the dump files.
    pub fn manager(&self) -> &DumpManager {
        &self.inner.manager
    }

    /// Current settings.
    pub fn settings(&self) -> DumpSettings {
        *self.inner.settings.read()
    }

    /// Load the newest acceptable dump into the cache and return its update time.
    ///
    /// A dump that cannot be read is logged and ignored, the cache then starts cold.
    pub async fn read_dump(&self) -> Option<SystemTime> {
        let inner = &self.inner;
        if !inner.settings.read().dumps_enabled {
            tracing::info!(cache = %inner.name, "[dumper]: dumps are disabled, skip reading");
            return None;
        }
        let _io = inner.io.lock().await;

        let start = inner.clock.steady_now();
        let manager = inner.manager.clone();
        let dumpable = inner.dumpable.clone();
        let result = inner
            .spawner
            .spawn_blocking(move || -> Result<_> {
                let Some(file) = manager.latest_dump() else {
                    return Ok(None);
                };
                let data = fs::read(&file.path).map_err(|e| {
                    Error::io_error(e).with_context("path", file.path.display())
                })?;
                let mut reader = DumpReader::new(&data)?;
                dumpable.read_and_set(&mut reader)?;
                Ok(Some(file))
            })
            .await
            .and_then(|r| r);

        match result {
            Ok(Some(file)) => {
                let elapsed = inner.clock.steady_now().saturating_duration_since(start);
                {
                    let mut state = inner.state.lock();
                    state.current = Some(UpdateTime::new(file.update_time));
                    state.dumped = Some(UpdateTime::new(file.update_time));
                }
                inner.statistics.is_loaded.store(true, Ordering::Relaxed);
                inner.statistics.is_current_from_dump.store(true, Ordering::Relaxed);
                inner
                    .statistics
                    .load_duration_ms
                    .store(elapsed.as_millis() as u64, Ordering::Relaxed);
                tracing::info!(cache = %inner.name, path = %file.path.display(), ?elapsed, "[dumper]: dump loaded");
                Some(file.update_time)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(cache = %inner.name, %e, "[dumper]: read dump failed, the dump is discarded");
                None
            }
        }
    }

    /// An update finished at `update_time`. `modified` tells whether it changed the cache contents.
    pub fn on_update_completed(&self, update_time: SystemTime, modified: bool) {
        let inner = &self.inner;
        let update_time = round_to_micros(update_time);
        {
            let mut state = inner.state.lock();
            if modified {
                state.current = Some(UpdateTime::new(update_time));
                inner.statistics.is_current_from_dump.store(false, Ordering::Relaxed);
            } else if let Some(current) = state.current.as_mut() {
                current.last_update = update_time;
            } else {
                tracing::warn!(cache = %inner.name, "[dumper]: no successful updates to dump yet");
                return;
            }
        }
        inner.data_updated.notify_one();
    }

    /// Write a dump now, waiting for a background write in progress.
    pub async fn write_dump_sync(&self) -> Result<()> {
        self.inner.write_dump().await
    }

    /// Apply a hot reloadable patch.
    pub fn set_config(&self, patch: DumpConfigPatch) {
        self.inner.set_config(&patch);
    }

    /// Release settings snapshots no reader holds any more.
    pub fn cleanup(&self) {
        self.inner.settings.cleanup();
    }

    /// Remove leftover temp files, expired dumps and dumps over the max count.
    pub async fn cleanup_dumps(&self) -> Result<()> {
        let _io = self.inner.io.lock().await;
        let manager = self.inner.manager.clone();
        self.inner.spawner.spawn_blocking(move || manager.cleanup()).await
    }

    /// Notified on direct modifications of the cache, schedules a write.
    pub fn dirty_listener(&self) -> DumperDirtyListener {
        DumperDirtyListener {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Statistics.
    pub fn statistics(&self) -> DumpStatistics {
        self.inner.statistics.snapshot()
    }

    /// Stop the background write task. A write in progress is finished first.
    pub async fn cancel_write_task_and_wait(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        let _ = task.stop_tx.send(());
        if let Err(e) = task.handle.await {
            tracing::warn!(cache = %self.inner.name, %e, "[dumper]: write task exited abnormally");
        }
    }
}

impl Drop for Dumper {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.handle.abort();
        }
    }
}

/// [`DirtyListener`] of a [`Dumper`].
#[derive(Debug, Clone)]
pub struct DumperDirtyListener {
    inner: Weak<Inner>,
}

impl DirtyListener for DumperDirtyListener {
    fn on_modified(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_modified();
        }
    }
}

/// Minimum delay before retrying a failed write.
const WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);

struct WriteRunner {
    inner: Arc<Inner>,
    stop_rx: oneshot::Receiver<()>,
}

impl WriteRunner {
    async fn run(mut self) {
        let mut pending = false;
        let mut failed = false;
        let mut prev_attempt: Option<Instant> = None;

        loop {
            if !pending {
                tokio::select! {
                    biased;
                    _ = &mut self.stop_rx => break,
                    _ = self.inner.config_updated.notified() => continue,
                    _ = self.inner.data_updated.notified() => pending = true,
                }
            }

            let settings = *self.inner.settings.read();
            let interval = if failed {
                settings.min_dump_interval.max(WRITE_RETRY_DELAY)
            } else {
                settings.min_dump_interval
            };
            if let Some(prev) = prev_attempt.filter(|_| settings.dumps_enabled) {
                tokio::select! {
                    biased;
                    _ = &mut self.stop_rx => break,
                    _ = self.inner.config_updated.notified() => continue,
                    _ = tokio::time::sleep(interval.saturating_sub(prev.elapsed())) => {}
                }
            }

            prev_attempt = Some(Instant::now());
            failed = match self.inner.write_dump().await {
                Ok(()) => false,
                Err(e) => {
                    tracing::error!(cache = %self.inner.name, %e, "[dumper]: write dump failed, will retry");
                    true
                }
            };
            pending = failed;
        }
        tracing::debug!(cache = %self.inner.name, "[dumper]: write task exits");
    }
}

/// Builder for [`Dumper`].
pub struct DumperBuilder {
    name: String,
    config: DumpConfig,
    dumpable: Arc<dyn Dumpable>,
    clock: SharedClock,
    spawner: Option<Spawner>,
    config_source: Option<ConfigSource>,
    statistics_storage: Option<StatisticsStorage>,
}

impl DumperBuilder {
    /// Dump `dumpable` as cache `name`.
    pub fn new(name: impl Into<String>, config: DumpConfig, dumpable: Arc<dyn Dumpable>) -> Self {
        Self {
            name: name.into(),
            config,
            dumpable,
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

    /// Set where the write task and file operations run. Defaults to the current runtime.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Listen to the `dumps` section of `source`.
    pub fn with_config_source(mut self, source: ConfigSource) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Register statistics in `storage`.
    pub fn with_statistics_storage(mut self, storage: StatisticsStorage) -> Self {
        self.statistics_storage = Some(storage);
        self
    }

    /// Build the dumper and start its write task.
    pub fn build(self) -> Result<Dumper> {
        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => Spawner::try_current().ok_or_else(|| {
                Error::config("no runtime to run the dump write task on").with_context("cache", &self.name)
            })?,
        };

        let manager = Arc::new(DumpManager::new(self.name.clone(), &self.config, self.clock.clone()));
        let inner = Arc::new(Inner {
            name: self.name,
            settings: Variable::new(self.config.settings()),
            config: self.config,
            manager,
            dumpable: self.dumpable,
            clock: self.clock,
            spawner: spawner.clone(),
            state: Mutex::new(DumpState::default()),
            dirty: AtomicBool::new(false),
            io: tokio::sync::Mutex::new(()),
            data_updated: Notify::new(),
            config_updated: Notify::new(),
            statistics: DumperStatistics::default(),
        });

        let subscription = self.config_source.map(|source| {
            let weak = Arc::downgrade(&inner);
            source.update_and_listen(DUMPS_SECTION, move |section| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_config_update(section);
                }
            })
        });

        let statistics = self.statistics_storage.map(|storage| {
            let weak = Arc::downgrade(&inner);
            storage.register_writer("cache.dump", [("cache_name", inner.name.clone())], move || {
                weak.upgrade()
                    .map(|inner| json!(inner.statistics.snapshot()))
                    .unwrap_or(Value::Null)
            })
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        let runner = WriteRunner {
            inner: inner.clone(),
            stop_rx,
        };
        let handle = spawner.spawn(runner.run());
        tracing::debug!(cache = %inner.name, directory = %inner.config.dump_directory.display(), "[dumper]: write task started");

        Ok(Dumper {
            inner,
            task: Mutex::new(Some(WriteTask { stop_tx, handle })),
            _subscription: subscription,
            _statistics: statistics,
        })
    }
}
