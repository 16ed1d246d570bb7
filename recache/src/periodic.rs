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

use std::{fmt::Debug, sync::Arc, time::Duration};

use bitflags::bitflags;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use recache_common::{
    error::{Error, Result},
    spawn::{SpawnHandle, Spawner},
};
use tokio::{
    sync::{oneshot, watch, Notify},
    time::Instant,
};

bitflags! {
    /// Flags of a [`PeriodicTask`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PeriodicFlags: u8 {
        /// Run the first step right after start instead of after a period.
        const NOW = 0b01;
        /// Measure the period from the start of the previous step, so the step duration counts into it.
        const STRONG = 0b10;
    }
}

/// Schedule of a [`PeriodicTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicSettings {
    /// Time between steps.
    pub period: Duration,
    /// Every period is shifted by a uniformly distributed value in `[-jitter, +jitter]`.
    pub jitter: Duration,
    /// Period used after a failed step.
    pub exception_period: Option<Duration>,
    /// Flags.
    pub flags: PeriodicFlags,
}

impl PeriodicSettings {
    /// Steps every `period`, without jitter.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            jitter: Duration::ZERO,
            exception_period: None,
            flags: PeriodicFlags::empty(),
        }
    }

    /// Set the jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the period used after a failed step.
    pub fn with_exception_period(mut self, exception_period: Option<Duration>) -> Self {
        self.exception_period = exception_period;
        self
    }

    /// Set the flags.
    pub fn with_flags(mut self, flags: PeriodicFlags) -> Self {
        self.flags = flags;
        self
    }

    fn next_period(&self, failed: bool) -> Duration {
        let period = match self.exception_period {
            Some(exception_period) if failed => exception_period,
            _ => self.period,
        };
        if self.jitter.is_zero() {
            return period;
        }
        let jitter = self.jitter.as_secs_f64();
        let delta = rand::rng().random_range(-jitter..=jitter);
        Duration::from_secs_f64((period.as_secs_f64() + delta).max(0.0))
    }
}

/// A step of a [`PeriodicTask`].
pub type PeriodicBody = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static>;

struct Running {
    name: String,
    settings_tx: watch::Sender<PeriodicSettings>,
    force: Arc<Notify>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: SpawnHandle<()>,
}

/// Runs a body periodically on a tokio runtime.
///
/// Settings can be changed while the task runs. A failed step is logged and the next one is scheduled after the
/// exception period, if any.
#[derive(Default)]
pub struct PeriodicTask {
    spawner: Option<Spawner>,
    running: Mutex<Option<Running>>,
}

impl Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let running = self.running.lock();
        f.debug_struct("PeriodicTask")
            .field("name", &running.as_ref().map(|r| r.name.clone()))
            .field("settings", &running.as_ref().map(|r| *r.settings_tx.borrow()))
            .finish()
    }
}

impl PeriodicTask {
    /// Create a task spawned on the runtime that calls [`Self::start`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task spawned by `spawner`.
    pub fn with_spawner(spawner: Spawner) -> Self {
        Self {
            spawner: Some(spawner),
            running: Mutex::new(None),
        }
    }

    /// Start stepping `body`. A task that is already running is replaced.
    pub fn start(&self, name: impl Into<String>, settings: PeriodicSettings, body: PeriodicBody) -> Result<()> {
        let name = name.into();
        if settings.period.is_zero() {
            return Err(Error::config("period of a periodic task must be positive").with_context("task", name));
        }
        let spawner = match &self.spawner {
            Some(spawner) => spawner.clone(),
            None => Spawner::try_current()
                .ok_or_else(|| Error::config("no runtime to run the periodic task on").with_context("task", &name))?,
        };

        let (settings_tx, settings_rx) = watch::channel(settings);
        let (stop_tx, stop_rx) = oneshot::channel();
        let force = Arc::new(Notify::new());

        let runner = PeriodicRunner {
            name: name.clone(),
            settings_rx,
            force: force.clone(),
            stop_rx,
            body,
        };
        let handle = spawner.spawn(runner.run());

        let old = self.running.lock().replace(Running {
            name: name.clone(),
            settings_tx,
            force,
            stop_tx: Some(stop_tx),
            handle,
        });
        if let Some(old) = old {
            tracing::warn!(task = %old.name, "[periodic]: task restarted while running");
            old.handle.abort();
        }
        tracing::debug!(task = %name, ?settings, "[periodic]: task started");
        Ok(())
    }

    /// Apply new settings to the running task. The pending wait is recomputed at once.
    pub fn set_settings(&self, settings: PeriodicSettings) {
        if settings.period.is_zero() {
            tracing::warn!(?settings, "[periodic]: ignore settings with a zero period");
            return;
        }
        if let Some(running) = self.running.lock().as_ref() {
            running.settings_tx.send_if_modified(|current| {
                let modified = *current != settings;
                *current = settings;
                modified
            });
        }
    }

    /// The settings of the running task.
    pub fn settings(&self) -> Option<PeriodicSettings> {
        self.running.lock().as_ref().map(|r| *r.settings_tx.borrow())
    }

    /// Run the next step as soon as possible, without waiting for the rest of the period.
    pub fn force_step_async(&self) {
        if let Some(running) = self.running.lock().as_ref() {
            running.force.notify_one();
        }
    }

    /// Whether the task has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop the task and wait for it to exit. A step in progress is cancelled.
    pub async fn stop(&self) {
        let Some(mut running) = self.running.lock().take() else {
            return;
        };
        if let Some(stop_tx) = running.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = running.handle.await {
            tracing::warn!(task = %running.name, %e, "[periodic]: task exited abnormally");
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}

struct PeriodicRunner {
    name: String,
    settings_rx: watch::Receiver<PeriodicSettings>,
    force: Arc<Notify>,
    stop_rx: oneshot::Receiver<()>,
    body: PeriodicBody,
}

impl PeriodicRunner {
    async fn run(mut self) {
        let mut settings = *self.settings_rx.borrow_and_update();
        let mut skip_wait = settings.flags.contains(PeriodicFlags::NOW);
        let mut failed = false;
        let mut base = Instant::now();

        loop {
            if !skip_wait {
                let mut deadline = base + settings.next_period(failed);
                loop {
                    tokio::select! {
                        biased;
                        _ = &mut self.stop_rx => {
                            tracing::debug!(task = %self.name, "[periodic]: task exits");
                            return;
                        }
                        changed = self.settings_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            settings = *self.settings_rx.borrow_and_update();
                            deadline = base + settings.next_period(failed);
                            tracing::debug!(task = %self.name, ?settings, "[periodic]: settings applied");
                        }
                        _ = self.force.notified() => break,
                        _ = tokio::time::sleep_until(deadline) => break,
                    }
                }
            }
            skip_wait = false;

            let start = Instant::now();
            let step = (self.body)();
            let result = tokio::select! {
                biased;
                _ = &mut self.stop_rx => {
                    tracing::debug!(task = %self.name, "[periodic]: task exits, the running step is cancelled");
                    return;
                }
                result = step => result,
            };
            failed = match result {
                Ok(()) => false,
                Err(e) => {
                    tracing::warn!(task = %self.name, %e, "[periodic]: step failed");
                    true
                }
            };
            base = if settings.flags.contains(PeriodicFlags::STRONG) {
                start
            } else {
                Instant::now()
            };
        }
    }
}
