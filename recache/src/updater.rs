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

//! Periodic full and incremental updates of a whole cache.

use std::{
    fmt::Debug,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::{Instant, SystemTime},
};

use bitflags::bitflags;
use futures_util::FutureExt;
use parking_lot::Mutex;
use recache_common::{
    clock::{to_micros, SharedClock, SystemClock},
    dump::{DirtyListener, Dumpable},
    error::{Error, ErrorKind, Result},
    rcu::Variable,
    spawn::Spawner,
    statistics::{StatisticsHolder, StatisticsStorage},
};
use serde_json::{json, Value};

use crate::{
    config::{AllowedUpdateTypes, ConfigPatch, FirstUpdateMode, FirstUpdateType, UpdaterConfig},
    dump::{round_to_micros, Dumper, DumperBuilder},
    periodic::{PeriodicBody, PeriodicFlags, PeriodicSettings, PeriodicTask},
    source::{find_patch, ConfigSource, Subscription, CACHES_SECTION},
    update::{CacheUpdateStatistics, UpdateState, UpdateStatisticsScope, UpdateType},
};

/// The update logic of a cache driven by a [`CacheUpdater`].
pub trait Updatable: Send + Sync + 'static {
    /// Bring the cache up to date.
    ///
    /// `last_update` is the time of the last successful update, if any, and `now` is the time this update is
    /// recorded at on success. The outcome must be reported through `statistics`. An update that returns `Ok`
    /// without reporting anything is logged and counted as a success.
    fn update(
        &self,
        update_type: UpdateType,
        last_update: Option<SystemTime>,
        now: SystemTime,
        statistics: &mut UpdateStatisticsScope,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Called by the cleanup task.
    fn cleanup(&self) {}

    /// Called once the configured number of consecutive updates has failed.
    fn mark_as_expired(&self) {}
}

bitflags! {
    /// Flags of [`CacheUpdater::start`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdaterStartFlags: u8 {
        /// Leave the first update to the periodic task. Ignored when periodic updates are disabled.
        const NO_FIRST_UPDATE = 0b1;
    }
}

/// Lifecycle of a [`CacheUpdater`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterState {
    /// Built, not started yet.
    #[default]
    NotStarted,
    /// Started.
    Running,
    /// Stopped. A stopped updater cannot be started again.
    Stopped,
}

// States of invalidations requested around the first update.
const INVALIDATION_NO: u8 = 0;
const INVALIDATION_YES: u8 = 1;
const INVALIDATION_FINISHED: u8 = 2;

#[derive(Debug, Default)]
struct UpdateTimes {
    last_update: Option<SystemTime>,
    last_full_update: Option<Instant>,
    dump_first_update_type: Option<UpdateType>,
}

struct Inner<U> {
    name: String,
    static_config: UpdaterConfig,
    config: Variable<UpdaterConfig>,
    updatable: U,
    clock: SharedClock,
    periodic_updates_enabled: bool,

    periodic: PeriodicTask,
    cleanup_task: PeriodicTask,
    periodic_flags: Mutex<PeriodicFlags>,

    state: Mutex<UpdaterState>,
    update_lock: tokio::sync::Mutex<()>,
    times: Mutex<UpdateTimes>,
    force_full: AtomicBool,
    first_update_attempted: AtomicBool,
    first_update_invalidation: AtomicU8,
    failures: AtomicU64,
    expired: AtomicBool,
    modified: Arc<AtomicBool>,

    statistics: Arc<CacheUpdateStatistics>,
    dumper: Option<Dumper>,
}

fn periodic_settings(config: &UpdaterConfig, flags: PeriodicFlags) -> PeriodicSettings {
    PeriodicSettings::new(config.update_interval)
        .with_jitter(config.update_jitter)
        .with_exception_period(config.exception_interval)
        .with_flags(flags)
}

impl<U> Inner<U>
where
    U: Updatable,
{
    fn check_update_type(&self, update_type: UpdateType) -> UpdateType {
        if update_type == UpdateType::Incremental
            && self.config.read().allowed_update_types == AllowedUpdateTypes::OnlyFull
        {
            tracing::warn!(cache = %self.name, "[updater]: incremental update requested for a full-only cache, a full update is used");
            return UpdateType::Full;
        }
        update_type
    }

    fn next_update_type(&self, config: &UpdaterConfig) -> UpdateType {
        let times = self.times.lock();
        if let Some(update_type) = times.dump_first_update_type {
            return update_type;
        }
        if times.last_update.is_none() || self.force_full.load(Ordering::Acquire) {
            return UpdateType::Full;
        }
        match config.allowed_update_types {
            AllowedUpdateTypes::OnlyFull => UpdateType::Full,
            AllowedUpdateTypes::OnlyIncremental => UpdateType::Incremental,
            AllowedUpdateTypes::FullAndIncremental => match times.last_full_update {
                Some(last_full_update)
                    if self.clock.steady_now().saturating_duration_since(last_full_update)
                        < config.full_update_interval =>
                {
                    UpdateType::Incremental
                }
                _ => UpdateType::Full,
            },
        }
    }

    async fn do_periodic_update(&self) -> Result<()> {
        let _lock = self.update_lock.lock().await;
        let is_first = !self.first_update_attempted.swap(true, Ordering::AcqRel);
        let config = self.config.read();

        if !config.updates_enabled && (!is_first || config.allow_first_update_failure) {
            tracing::info!(cache = %self.name, "[updater]: periodic updates are disabled, skip");
            return Ok(());
        }

        let update_type = self.next_update_type(&config);
        self.do_update(update_type).await.inspect_err(|e| {
            tracing::warn!(cache = %self.name, %update_type, %e, "[updater]: update failed");
            self.on_periodic_update_failure();
        })
    }

    fn on_periodic_update_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if self.static_config.failed_updates_before_expiration == Some(failures) {
            self.expired.store(true, Ordering::Release);
            self.updatable.mark_as_expired();
            tracing::warn!(cache = %self.name, failures, "[updater]: cache is marked as expired after consecutive failed updates");
        }
    }

    async fn do_update(&self, update_type: UpdateType) -> Result<()> {
        let steady_now = self.clock.steady_now();
        let now = round_to_micros(self.clock.now());
        let last_update = self.times.lock().last_update;

        let mut scope = UpdateStatisticsScope::new(self.statistics.clone(), update_type, self.clock.clone());
        tracing::info!(cache = %self.name, %update_type, "[updater]: update started");

        if let Err(e) = self.updatable.update(update_type, last_update, now, &mut scope).await {
            return Err(Error::external("update failed", e)
                .with_context("cache", &self.name)
                .with_context("update_type", update_type));
        }
        match scope.state() {
            UpdateState::Success => {}
            UpdateState::Failure => {
                return Err(Error::new(ErrorKind::UpdateFailed, "update reported a failure")
                    .with_context("cache", &self.name)
                    .with_context("update_type", update_type));
            }
            UpdateState::NotFinished => {
                tracing::error!(cache = %self.name, %update_type, "[updater]: update finished without reporting its state, counted as a success");
                scope.finish_unreported();
            }
        }
        drop(scope);

        {
            let mut times = self.times.lock();
            if update_type == UpdateType::Full {
                self.force_full.store(false, Ordering::Release);
                times.last_full_update = Some(steady_now);
            }
            times.dump_first_update_type = None;
            times.last_update = Some(now);
        }
        self.failures.store(0, Ordering::Release);
        self.expired.store(false, Ordering::Release);

        if let Some(dumper) = &self.dumper {
            dumper.on_update_completed(now, self.modified.swap(false, Ordering::AcqRel));
        }
        tracing::info!(cache = %self.name, %update_type, "[updater]: update finished");
        Ok(())
    }

    fn on_config_update(&self, section: Option<&Value>) {
        let config = match find_patch::<ConfigPatch>(section, &self.name) {
            Ok(Some(patch)) => self.static_config.merge_with(&patch),
            Ok(None) => self.static_config.clone(),
            Err(e) => {
                tracing::warn!(cache = %self.name, %e, "[updater]: ignore invalid config patch");
                return;
            }
        };
        let settings = periodic_settings(&config, *self.periodic_flags.lock());
        let cleanup = PeriodicSettings::new(config.cleanup_interval);
        self.config.assign(config);
        self.periodic.set_settings(settings);
        self.cleanup_task.set_settings(cleanup);
        tracing::debug!(cache = %self.name, ?settings, "[updater]: config updated");
    }

    fn cleanup(&self) {
        self.config.cleanup();
        if let Some(dumper) = &self.dumper {
            dumper.cleanup();
        }
        self.updatable.cleanup();
    }

    fn statistics_json(&self) -> Value {
        json!({
            "update": self.statistics.to_json(),
            "is-expired": self.expired.load(Ordering::Acquire),
            "consecutive-failures": self.failures.load(Ordering::Acquire),
            "last-update-time-us": self.times.lock().last_update.map(to_micros),
        })
    }
}

/// Drives the updates of a cache: the first update at start, periodic updates, invalidations, failure
/// accounting, dumps and config hot reload.
///
/// ```rust
/// # use std::time::{Duration, SystemTime};
/// # use recache::{Updatable, UpdateStatisticsScope, UpdateType, UpdaterBuilder, UpdaterConfigBuilder, UpdaterStartFlags};
/// struct Tickets;
///
/// impl Updatable for Tickets {
///     async fn update(
///         &self,
///         _: UpdateType,
///         _: Option<SystemTime>,
///         _: SystemTime,
///         statistics: &mut UpdateStatisticsScope,
///     ) -> anyhow::Result<()> {
///         statistics.finish(0);
///         Ok(())
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let config = UpdaterConfigBuilder::new()
///     .with_update_interval(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// let updater = UpdaterBuilder::new("tickets", config, Tickets).build().unwrap();
/// updater.start(UpdaterStartFlags::empty()).await.unwrap();
/// assert!(updater.last_update().is_some());
/// updater.stop().await;
/// # });
/// ```
pub struct CacheUpdater<U> {
    inner: Arc<Inner<U>>,
    config_source: Option<ConfigSource>,
    statistics_storage: Option<StatisticsStorage>,
    subscription: Mutex<Option<Subscription>>,
    statistics_holder: Mutex<Option<StatisticsHolder>>,
}

impl<U> Debug for CacheUpdater<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheUpdater")
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.lock())
            .field("config", &self.inner.config.read())
            .field("dumper", &self.inner.dumper)
            .finish()
    }
}

impl<U> CacheUpdater<U>
where
    U: Updatable,
{
    /// Load the dump, run the first update and start the periodic and cleanup tasks.
    ///
    /// Starting a running updater does nothing. A failed start stops the updater.
    pub async fn start(&self, flags: UpdaterStartFlags) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                UpdaterState::Running => return Ok(()),
                UpdaterState::Stopped => {
                    return Err(Error::new(ErrorKind::Closed, "updater has been stopped")
                        .with_context("cache", &self.inner.name))
                }
                UpdaterState::NotStarted => *state = UpdaterState::Running,
            }
        }

        if let Err(e) = self.try_start(flags).await {
            self.stop().await;
            return Err(e);
        }
        Ok(())
    }

    async fn try_start(&self, flags: UpdaterStartFlags) -> Result<()> {
        let inner = &self.inner;

        if let Some(source) = self.config_source.as_ref().filter(|_| inner.static_config.config_updates_enabled) {
            let weak = Arc::downgrade(inner);
            *self.subscription.lock() = Some(source.update_and_listen(CACHES_SECTION, move |section| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_config_update(section);
                }
            }));
        }
        if let Some(storage) = &self.statistics_storage {
            let weak = Arc::downgrade(inner);
            *self.statistics_holder.lock() =
                Some(storage.register_writer("cache", [("cache_name", inner.name.clone())], move || {
                    weak.upgrade()
                        .map(|inner| inner.statistics_json())
                        .unwrap_or(Value::Null)
                }));
        }

        let config = inner.config.read();

        let mut dump_loaded = false;
        if let Some(dumper) = &inner.dumper {
            if let Some(update_time) = dumper.read_dump().await {
                dump_loaded = true;
                let mut times = inner.times.lock();
                times.last_update = Some(update_time);
                times.dump_first_update_type = Some(match config.first_update_type {
                    FirstUpdateType::Full => UpdateType::Full,
                    FirstUpdateType::Incremental | FirstUpdateType::IncrementalThenAsyncFull => {
                        UpdateType::Incremental
                    }
                });
            }
        }

        let first_update_needed = !dump_loaded || config.first_update_mode != FirstUpdateMode::Skip;
        let first_update_allowed_to_skip =
            flags.contains(UpdaterStartFlags::NO_FIRST_UPDATE) && inner.periodic_updates_enabled;
        if first_update_needed && !first_update_allowed_to_skip {
            inner.first_update_invalidation.store(INVALIDATION_NO, Ordering::Release);
            if let Err(e) = inner.do_periodic_update().await {
                if dump_loaded && config.first_update_mode != FirstUpdateMode::Required {
                    tracing::error!(cache = %inner.name, %e, "[updater]: first update failed, continue with the dump contents");
                } else if config.allow_first_update_failure {
                    tracing::error!(cache = %inner.name, %e, "[updater]: first update failed, start empty");
                } else {
                    tracing::error!(cache = %inner.name, %e, "[updater]: first update failed");
                    return Err(e);
                }
            }
        }

        let mut periodic_flags = PeriodicFlags::empty();
        if dump_loaded && config.first_update_type == FirstUpdateType::IncrementalThenAsyncFull {
            inner.times.lock().dump_first_update_type = Some(UpdateType::Full);
            periodic_flags |= PeriodicFlags::NOW;
        }
        if config.is_strong_period {
            periodic_flags |= PeriodicFlags::STRONG;
        }
        *inner.periodic_flags.lock() = periodic_flags;

        if inner.periodic_updates_enabled {
            let weak = Arc::downgrade(inner);
            let body: PeriodicBody = Arc::new(move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => inner.do_periodic_update().await,
                        None => Ok(()),
                    }
                }
                .boxed()
            });
            // Read again, a config patch may have arrived during the first update.
            let settings = periodic_settings(&inner.config.read(), periodic_flags);
            inner
                .periodic
                .start(format!("update-task/{}", inner.name), settings, body)?;

            if inner
                .first_update_invalidation
                .swap(INVALIDATION_FINISHED, Ordering::AcqRel)
                == INVALIDATION_YES
            {
                inner.periodic.force_step_async();
            }
        }

        let weak = Arc::downgrade(inner);
        let body: PeriodicBody = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.cleanup();
            }
            async { Ok(()) }.boxed()
        });
        inner.cleanup_task.start(
            format!("cleanup-task/{}", inner.name),
            PeriodicSettings::new(inner.config.read().cleanup_interval),
            body,
        )?;

        tracing::info!(cache = %inner.name, dump_loaded, "[updater]: started");
        Ok(())
    }

    /// Stop the periodic and cleanup tasks and the dump write task. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == UpdaterState::Stopped {
                return;
            }
            *state = UpdaterState::Stopped;
        }

        drop(self.subscription.lock().take());
        drop(self.statistics_holder.lock().take());
        self.inner.periodic.stop().await;
        self.inner.cleanup_task.stop().await;
        if let Some(dumper) = &self.inner.dumper {
            dumper.cancel_write_task_and_wait().await;
        }
        tracing::info!(cache = %self.inner.name, "[updater]: stopped");
    }

    /// Request an update out of schedule.
    ///
    /// The update runs on the periodic task. Requests made during the first update are coalesced into one
    /// update right after it. When periodic updates are disabled the update runs before returning.
    pub async fn invalidate_async(&self, update_type: UpdateType) -> Result<()> {
        let inner = &self.inner;
        if !inner.periodic_updates_enabled {
            return self.update_sync(update_type).await;
        }

        if inner.check_update_type(update_type) == UpdateType::Full {
            inner.force_full.store(true, Ordering::Release);
        }
        if let Err(INVALIDATION_FINISHED) = inner.first_update_invalidation.compare_exchange(
            INVALIDATION_NO,
            INVALIDATION_YES,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            inner.periodic.force_step_async();
        }
        Ok(())
    }

    /// Run an update now and wait for it.
    pub async fn update_sync(&self, update_type: UpdateType) -> Result<()> {
        let inner = &self.inner;
        let _lock = inner.update_lock.lock().await;
        let update_type = inner.check_update_type(update_type);
        if !inner.config.read().updates_enabled {
            tracing::info!(cache = %inner.name, "[updater]: updates are disabled, skip");
            return Ok(());
        }
        inner.do_update(update_type).await
    }

    /// The cache has been marked expired after too many consecutive failed updates.
    pub fn is_expired(&self) -> bool {
        self.inner.expired.load(Ordering::Acquire)
    }

    /// Number of periodic updates failed in a row.
    pub fn consecutive_failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Acquire)
    }

    /// Time of the last successful update, or of the loaded dump.
    pub fn last_update(&self) -> Option<SystemTime> {
        self.inner.times.lock().last_update
    }

    /// Lifecycle state.
    pub fn state(&self) -> UpdaterState {
        *self.inner.state.lock()
    }

    /// The current config, with the hot reloaded patch applied.
    pub fn config(&self) -> Arc<UpdaterConfig> {
        self.inner.config.read()
    }

    /// Settings of the running periodic update task.
    pub fn periodic_settings(&self) -> Option<PeriodicSettings> {
        self.inner.periodic.settings()
    }

    /// Update statistics.
    pub fn statistics(&self) -> &CacheUpdateStatistics {
        &self.inner.statistics
    }

    /// The dumper, if dumps are configured.
    pub fn dumper(&self) -> Option<&Dumper> {
        self.inner.dumper.as_ref()
    }

    /// The update logic.
    pub fn updatable(&self) -> &U {
        &self.inner.updatable
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A listener that marks the cache contents modified, so the next successful update writes a new dump.
    pub fn dirty_listener(&self) -> ModifiedListener {
        ModifiedListener {
            modified: self.inner.modified.clone(),
        }
    }
}

impl<U> Drop for CacheUpdater<U> {
    fn drop(&mut self) {
        if *self.inner.state.lock() == UpdaterState::Running {
            tracing::error!(cache = %self.inner.name, "[updater]: dropped while running, stop() was not called");
        }
    }
}

/// Marks the contents of a [`CacheUpdater`] driven cache modified.
#[derive(Debug, Clone)]
pub struct ModifiedListener {
    modified: Arc<AtomicBool>,
}

impl DirtyListener for ModifiedListener {
    fn on_modified(&self) {
        self.modified.store(true, Ordering::Release);
    }
}

/// Builder for [`CacheUpdater`].
pub struct UpdaterBuilder<U> {
    name: String,
    config: UpdaterConfig,
    updatable: U,
    clock: SharedClock,
    spawner: Option<Spawner>,
    config_source: Option<ConfigSource>,
    statistics_storage: Option<StatisticsStorage>,
    dumpable: Option<Arc<dyn Dumpable>>,
    periodic_updates: bool,
}

impl<U> UpdaterBuilder<U>
where
    U: Updatable,
{
    /// Update cache `name` with `updatable`.
    pub fn new(name: impl Into<String>, config: UpdaterConfig, updatable: U) -> Self {
        Self {
            name: name.into(),
            config,
            updatable,
            clock: Arc::new(SystemClock),
            spawner: None,
            config_source: None,
            statistics_storage: None,
            dumpable: None,
            periodic_updates: true,
        }
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set where the periodic tasks run. Defaults to the current runtime.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Hot reload the config from the `caches` and `dumps` sections of `source`.
    pub fn with_config_source(mut self, source: ConfigSource) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Register statistics in `storage`.
    pub fn with_statistics_storage(mut self, storage: StatisticsStorage) -> Self {
        self.statistics_storage = Some(storage);
        self
    }

    /// Dump and restore `dumpable` as configured by [`UpdaterConfig::dump`].
    pub fn with_dump(mut self, dumpable: Arc<dyn Dumpable>) -> Self {
        self.dumpable = Some(dumpable);
        self
    }

    /// Whether updates run periodically. Without periodic updates, invalidations update synchronously.
    pub fn with_periodic_updates(mut self, enabled: bool) -> Self {
        self.periodic_updates = enabled;
        self
    }

    /// Build the updater. Nothing runs before [`CacheUpdater::start`].
    pub fn build(self) -> Result<CacheUpdater<U>> {
        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => Spawner::try_current().ok_or_else(|| {
                Error::config("no runtime to run the updates on").with_context("cache", &self.name)
            })?,
        };

        let dumper = match (&self.config.dump, self.dumpable) {
            (Some(dump), Some(dumpable)) => {
                let mut builder = DumperBuilder::new(self.name.clone(), dump.clone(), dumpable)
                    .with_clock(self.clock.clone())
                    .with_spawner(spawner.clone());
                if let Some(source) = self.config_source.clone().filter(|_| self.config.config_updates_enabled) {
                    builder = builder.with_config_source(source);
                }
                if let Some(storage) = self.statistics_storage.clone() {
                    builder = builder.with_statistics_storage(storage);
                }
                Some(builder.build()?)
            }
            (Some(_), None) => {
                return Err(Error::config("dumps are configured for a cache that cannot be dumped")
                    .with_context("cache", &self.name))
            }
            (None, Some(_)) => {
                tracing::warn!(cache = %self.name, "[updater]: the cache is dumpable but dumps are not configured");
                None
            }
            (None, None) => None,
        };

        let inner = Inner {
            config: Variable::new(self.config.clone()),
            static_config: self.config,
            updatable: self.updatable,
            clock: self.clock,
            periodic_updates_enabled: self.periodic_updates,
            periodic: PeriodicTask::with_spawner(spawner.clone()),
            cleanup_task: PeriodicTask::with_spawner(spawner),
            periodic_flags: Mutex::new(PeriodicFlags::empty()),
            state: Mutex::new(UpdaterState::NotStarted),
            update_lock: tokio::sync::Mutex::new(()),
            times: Mutex::new(UpdateTimes::default()),
            force_full: AtomicBool::new(false),
            first_update_attempted: AtomicBool::new(false),
            first_update_invalidation: AtomicU8::new(INVALIDATION_NO),
            failures: AtomicU64::new(0),
            expired: AtomicBool::new(false),
            modified: Arc::new(AtomicBool::new(false)),
            statistics: Arc::new(CacheUpdateStatistics::default()),
            dumper,
            name: self.name,
        };

        Ok(CacheUpdater {
            inner: Arc::new(inner),
            config_source: self.config_source,
            statistics_storage: self.statistics_storage,
            subscription: Mutex::new(None),
            statistics_holder: Mutex::new(None),
        })
    }
}
