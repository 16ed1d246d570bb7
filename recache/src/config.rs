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

//! Static and hot reloadable configuration of caches and dumps.
//!
//! Static configs use human readable durations (`"10s"`, `"1m 30s"`), hot reloadable patches follow the JSON
//! document layout with millisecond integers (`"update-interval-ms": 1000`).

use std::{path::PathBuf, time::Duration};

use recache_common::error::{Error, Result};
use recache_memory::BackgroundUpdateMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default interval of the cleanup task.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of dumps kept on disk.
pub const DEFAULT_MAX_DUMP_COUNT: usize = 1;

fn default_true() -> bool {
    true
}

fn default_max_dump_count() -> usize {
    DEFAULT_MAX_DUMP_COUNT
}

fn default_jitter(interval: Duration) -> Duration {
    interval / 10
}

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

mod millis {
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => serializer.serialize_u64(d.as_millis() as u64),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

/// Which kinds of updates a cache supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedUpdateTypes {
    /// Every update recomputes the whole cache.
    OnlyFull,
    /// Every update applies a delta.
    OnlyIncremental,
    /// Incremental updates, with a full one once per `full_update_interval`.
    FullAndIncremental,
}

/// How the first update is handled when a dump has been loaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstUpdateMode {
    /// The first update runs and must succeed.
    Required,
    /// The first update runs, a failure leaves the dump contents in place.
    BestEffort,
    /// No first update when a dump has been loaded.
    #[default]
    Skip,
}

/// Type of the first update after a dump has been loaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstUpdateType {
    /// A full update.
    #[default]
    Full,
    /// An incremental update.
    Incremental,
    /// An incremental update followed by an immediate asynchronous full update.
    IncrementalThenAsyncFull,
}

/// Static dump configuration of a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DumpConfig {
    /// Directory holding the dumps of this cache.
    pub dump_directory: PathBuf,
    /// Whether dumps are read and written.
    #[serde(default = "default_true", rename = "enable")]
    pub dumps_enabled: bool,
    /// Schema version of the dumped values. Dumps of other versions are ignored.
    #[serde(default)]
    pub format_version: u64,
    /// Dumps older than this are ignored and removed.
    #[serde(
        default,
        rename = "max-age",
        with = "duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_dump_age: Option<Duration>,
    /// Older dumps over this count are removed.
    #[serde(default = "default_max_dump_count", rename = "max-count")]
    pub max_dump_count: usize,
    /// Writes requested in a faster succession are delayed.
    #[serde(default, rename = "min-interval", with = "duration")]
    pub min_dump_interval: Duration,
}

impl DumpConfig {
    /// Dumps enabled in `dump_directory`, keeping a single dump of any age.
    pub fn new(dump_directory: impl Into<PathBuf>) -> Self {
        Self {
            dump_directory: dump_directory.into(),
            dumps_enabled: true,
            format_version: 0,
            max_dump_age: None,
            max_dump_count: DEFAULT_MAX_DUMP_COUNT,
            min_dump_interval: Duration::ZERO,
        }
    }

    /// Enable or disable dumps.
    pub fn with_dumps_enabled(mut self, enabled: bool) -> Self {
        self.dumps_enabled = enabled;
        self
    }

    /// Set the schema version of dumped values.
    pub fn with_format_version(mut self, format_version: u64) -> Self {
        self.format_version = format_version;
        self
    }

    /// Ignore dumps older than `max_dump_age`.
    pub fn with_max_dump_age(mut self, max_dump_age: Duration) -> Self {
        self.max_dump_age = Some(max_dump_age);
        self
    }

    /// Keep at most `max_dump_count` dumps.
    pub fn with_max_dump_count(mut self, max_dump_count: usize) -> Self {
        self.max_dump_count = max_dump_count;
        self
    }

    /// Delay writes requested in a faster succession than `min_dump_interval`.
    pub fn with_min_dump_interval(mut self, min_dump_interval: Duration) -> Self {
        self.min_dump_interval = min_dump_interval;
        self
    }

    /// Apply a hot reloadable patch.
    pub fn merge_with(&self, patch: &DumpConfigPatch) -> DumpSettings {
        DumpSettings {
            dumps_enabled: patch.dumps_enabled.unwrap_or(self.dumps_enabled),
            min_dump_interval: patch.min_dump_interval.unwrap_or(self.min_dump_interval),
        }
    }

    /// Settings before any patch is applied.
    pub fn settings(&self) -> DumpSettings {
        self.merge_with(&DumpConfigPatch::default())
    }
}

/// Dump settings that may change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSettings {
    /// Whether dumps are read and written.
    pub dumps_enabled: bool,
    /// Writes requested in a faster succession are delayed.
    pub min_dump_interval: Duration,
}

/// Hot reloadable patch of [`DumpConfig`], from the `dumps` section of a config snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DumpConfigPatch {
    /// Overrides [`DumpConfig::dumps_enabled`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dumps_enabled: Option<bool>,
    /// Overrides [`DumpConfig::min_dump_interval`].
    #[serde(
        default,
        rename = "min-dump-interval-ms",
        with = "millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_dump_interval: Option<Duration>,
}

/// The `dump` section of a static cache config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DumpSection {
    /// Where and how dumps are kept.
    #[serde(flatten)]
    pub config: DumpConfig,
    /// How the first update is handled when a dump has been loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_update_mode: Option<FirstUpdateMode>,
    /// Type of the first update after a dump has been loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_update_type: Option<FirstUpdateType>,
}

/// Builds a validated [`UpdaterConfig`]. Also the deserialized form of a static cache config.
///
/// ```rust
/// # use std::time::Duration;
/// # use recache::{AllowedUpdateTypes, UpdaterConfigBuilder};
/// let config = UpdaterConfigBuilder::new()
///     .with_update_interval(Duration::from_secs(1))
///     .with_full_update_interval(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// assert_eq!(config.allowed_update_types, AllowedUpdateTypes::FullAndIncremental);
/// assert_eq!(config.update_jitter, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UpdaterConfigBuilder {
    #[serde(with = "duration::option", skip_serializing_if = "Option::is_none")]
    update_interval: Option<Duration>,
    #[serde(with = "duration::option", skip_serializing_if = "Option::is_none")]
    update_jitter: Option<Duration>,
    #[serde(with = "duration::option", skip_serializing_if = "Option::is_none")]
    full_update_interval: Option<Duration>,
    #[serde(with = "duration::option", skip_serializing_if = "Option::is_none")]
    exception_interval: Option<Duration>,
    #[serde(with = "duration::option", skip_serializing_if = "Option::is_none")]
    additional_cleanup_interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_types: Option<AllowedUpdateTypes>,
    is_strong_period: bool,
    first_update_fail_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_settings: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updates_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_updates_before_expiration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dump: Option<DumpSection>,
}

impl UpdaterConfigBuilder {
    /// Empty builder. At least an update interval must be set before [`Self::build`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the period of updates.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    /// Set the jitter of the update period. Defaults to a tenth of the update interval.
    pub fn with_update_jitter(mut self, jitter: Duration) -> Self {
        self.update_jitter = Some(jitter);
        self
    }

    /// Set the interval between full updates, enabling incremental updates in between.
    pub fn with_full_update_interval(mut self, interval: Duration) -> Self {
        self.full_update_interval = Some(interval);
        self
    }

    /// Set the period used after a failed update.
    pub fn with_exception_interval(mut self, interval: Duration) -> Self {
        self.exception_interval = Some(interval);
        self
    }

    /// Set the period of the cleanup task.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.additional_cleanup_interval = Some(interval);
        self
    }

    /// Set the allowed update types explicitly.
    pub fn with_update_types(mut self, update_types: AllowedUpdateTypes) -> Self {
        self.update_types = Some(update_types);
        self
    }

    /// Count the update duration into the update period.
    pub fn with_strong_period(mut self, strong: bool) -> Self {
        self.is_strong_period = strong;
        self
    }

    /// Start empty instead of failing when the first update fails.
    pub fn with_first_update_fail_ok(mut self, ok: bool) -> Self {
        self.first_update_fail_ok = ok;
        self
    }

    /// Whether the cache listens to hot reloadable config patches.
    pub fn with_config_settings(mut self, enabled: bool) -> Self {
        self.config_settings = Some(enabled);
        self
    }

    /// Enable or disable periodic updates.
    pub fn with_updates_enabled(mut self, enabled: bool) -> Self {
        self.updates_enabled = Some(enabled);
        self
    }

    /// Mark the cache expired after `failures` consecutive failed updates.
    pub fn with_failed_updates_before_expiration(mut self, failures: u64) -> Self {
        self.failed_updates_before_expiration = Some(failures);
        self
    }

    /// Enable dumps.
    pub fn with_dump(
        mut self,
        config: DumpConfig,
        first_update_mode: FirstUpdateMode,
        first_update_type: Option<FirstUpdateType>,
    ) -> Self {
        self.dump = Some(DumpSection {
            config,
            first_update_mode: Some(first_update_mode),
            first_update_type,
        });
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<UpdaterConfig> {
        let allowed_update_types = match self.update_types {
            Some(types) => types,
            None if self.update_interval.is_some() && self.full_update_interval.is_some() => {
                AllowedUpdateTypes::FullAndIncremental
            }
            None => AllowedUpdateTypes::OnlyFull,
        };

        let update_interval = self.update_interval.unwrap_or_default();
        let mut full_update_interval = self.full_update_interval.unwrap_or_default();

        match allowed_update_types {
            AllowedUpdateTypes::FullAndIncremental => {
                if update_interval.is_zero() || full_update_interval.is_zero() {
                    return Err(Error::config(
                        "both update-interval and full-update-interval must be set for full-and-incremental updates",
                    ));
                }
                if update_interval >= full_update_interval {
                    tracing::warn!(
                        ?update_interval,
                        ?full_update_interval,
                        "[config]: incremental updates are less frequent than full ones and will never happen"
                    );
                }
            }
            AllowedUpdateTypes::OnlyFull | AllowedUpdateTypes::OnlyIncremental => {
                if !full_update_interval.is_zero() {
                    return Err(Error::config(
                        "full-update-interval must only be used with full-and-incremental updates, use update-interval",
                    )
                    .with_context("update_types", format!("{allowed_update_types:?}")));
                }
                if update_interval.is_zero() {
                    return Err(Error::config("update-interval is not set"));
                }
                full_update_interval = update_interval;
            }
        }

        let (first_update_mode, first_update_type, dump) = match self.dump {
            None => (FirstUpdateMode::default(), FirstUpdateType::default(), None),
            Some(section) => {
                let Some(first_update_mode) = section.first_update_mode else {
                    return Err(Error::config("first-update-mode must be set when dumps are configured"));
                };
                if first_update_mode != FirstUpdateMode::Required && section.config.max_dump_age.is_none() {
                    return Err(Error::config(
                        "max-age must be set for dumps unless first-update-mode is required",
                    )
                    .with_context("first_update_mode", format!("{first_update_mode:?}")));
                }
                if first_update_mode == FirstUpdateMode::Skip && section.first_update_type.is_some() {
                    tracing::warn!("[config]: first-update-type is meaningless when first-update-mode is skip");
                }
                if allowed_update_types == AllowedUpdateTypes::OnlyFull {
                    if section.first_update_type.is_some_and(|t| t != FirstUpdateType::Full) {
                        return Err(Error::config("a full-only cache can only perform a full first update"));
                    }
                } else if first_update_mode != FirstUpdateMode::Skip && section.first_update_type.is_none() {
                    return Err(Error::config("first-update-type must be set"));
                }
                (
                    first_update_mode,
                    section.first_update_type.unwrap_or_default(),
                    Some(section.config),
                )
            }
        };

        Ok(UpdaterConfig {
            allowed_update_types,
            allow_first_update_failure: self.first_update_fail_ok,
            config_updates_enabled: self.config_settings.unwrap_or(true),
            cleanup_interval: self.additional_cleanup_interval.unwrap_or(DEFAULT_CLEANUP_INTERVAL),
            is_strong_period: self.is_strong_period,
            failed_updates_before_expiration: self.failed_updates_before_expiration,
            first_update_mode,
            first_update_type,
            update_interval,
            update_jitter: self.update_jitter.unwrap_or_else(|| default_jitter(update_interval)),
            full_update_interval,
            exception_interval: self.exception_interval,
            updates_enabled: self.updates_enabled.unwrap_or(true),
            dump,
        })
    }
}

/// Validated configuration of a [`crate::CacheUpdater`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "UpdaterConfigBuilder")]
pub struct UpdaterConfig {
    /// Which kinds of updates the cache supports.
    pub allowed_update_types: AllowedUpdateTypes,
    /// Start empty when the first update fails.
    pub allow_first_update_failure: bool,
    /// Whether the cache listens to hot reloadable config patches.
    pub config_updates_enabled: bool,
    /// Period of the cleanup task.
    pub cleanup_interval: Duration,
    /// Count the update duration into the update period.
    pub is_strong_period: bool,
    /// Mark the cache expired after this many consecutive failed updates.
    pub failed_updates_before_expiration: Option<u64>,
    /// How the first update is handled when a dump has been loaded.
    pub first_update_mode: FirstUpdateMode,
    /// Type of the first update after a dump has been loaded.
    pub first_update_type: FirstUpdateType,
    /// Period of updates.
    pub update_interval: Duration,
    /// Jitter of the update period.
    pub update_jitter: Duration,
    /// Interval between full updates.
    pub full_update_interval: Duration,
    /// Period used after a failed update.
    pub exception_interval: Option<Duration>,
    /// Whether periodic updates run.
    pub updates_enabled: bool,
    /// Dump configuration, if dumps are configured.
    pub dump: Option<DumpConfig>,
}

impl TryFrom<UpdaterConfigBuilder> for UpdaterConfig {
    type Error = Error;

    fn try_from(builder: UpdaterConfigBuilder) -> Result<Self> {
        builder.build()
    }
}

impl UpdaterConfig {
    /// Parse and validate a static config.
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::config("invalid cache config").with_source(e))
    }

    /// Apply a hot reloadable patch over this static config.
    pub fn merge_with(&self, patch: &ConfigPatch) -> Self {
        let mut config = self.clone();
        config.update_interval = patch.update_interval;
        config.update_jitter = patch.update_jitter;
        config.full_update_interval = patch.full_update_interval;
        config.updates_enabled = patch.updates_enabled;
        if patch.exception_interval.is_some() {
            config.exception_interval = patch.exception_interval;
        }
        config
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfigPatch {
    #[serde(default)]
    update_interval_ms: u64,
    #[serde(default)]
    update_jitter_ms: u64,
    #[serde(default)]
    full_update_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exception_interval_ms: Option<u64>,
    #[serde(default = "default_true")]
    updates_enabled: bool,
}

/// Hot reloadable patch of an [`UpdaterConfig`], from the `caches` section of a config snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfigPatch", into = "RawConfigPatch")]
pub struct ConfigPatch {
    /// Period of updates.
    pub update_interval: Duration,
    /// Jitter of the update period.
    pub update_jitter: Duration,
    /// Interval between full updates.
    pub full_update_interval: Duration,
    /// Period used after a failed update, kept from the static config if unset.
    pub exception_interval: Option<Duration>,
    /// Whether periodic updates run.
    pub updates_enabled: bool,
}

impl TryFrom<RawConfigPatch> for ConfigPatch {
    type Error = Error;

    fn try_from(raw: RawConfigPatch) -> Result<Self> {
        let mut update_interval = Duration::from_millis(raw.update_interval_ms);
        let mut full_update_interval = Duration::from_millis(raw.full_update_interval_ms);
        let mut update_jitter = Duration::from_millis(raw.update_jitter_ms);

        if update_interval.is_zero() && full_update_interval.is_zero() {
            return Err(Error::config("update interval is not set for cache"));
        } else if full_update_interval.is_zero() {
            full_update_interval = update_interval;
        } else if update_interval.is_zero() {
            update_interval = full_update_interval;
        }

        if update_jitter > update_interval {
            update_jitter = default_jitter(update_interval);
        }

        Ok(Self {
            update_interval,
            update_jitter,
            full_update_interval,
            exception_interval: raw.exception_interval_ms.map(Duration::from_millis),
            updates_enabled: raw.updates_enabled,
        })
    }
}

impl From<ConfigPatch> for RawConfigPatch {
    fn from(patch: ConfigPatch) -> Self {
        Self {
            update_interval_ms: patch.update_interval.as_millis() as u64,
            update_jitter_ms: patch.update_jitter.as_millis() as u64,
            full_update_interval_ms: patch.full_update_interval.as_millis() as u64,
            exception_interval_ms: patch.exception_interval.map(|d| d.as_millis() as u64),
            updates_enabled: patch.updates_enabled,
        }
    }
}

impl ConfigPatch {
    /// Parse and normalize a patch.
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::config("invalid cache config patch").with_source(e))
    }
}

/// Static configuration of a [`crate::LruCacheComponent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LruCacheConfig {
    /// Number of ways.
    pub ways: usize,
    /// Capacity of each way.
    pub way_size: usize,
    /// Lifetime of a value, zero means values never expire.
    #[serde(default, with = "duration")]
    pub lifetime: Duration,
    /// Refresh-ahead mode.
    #[serde(default)]
    pub background_update: BackgroundUpdateMode,
    /// Whether the cache listens to hot reloadable config patches.
    #[serde(default = "default_true")]
    pub config_settings: bool,
    /// Dump configuration, if dumps are configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump: Option<DumpConfig>,
}

impl LruCacheConfig {
    /// `ways` ways of `way_size` values each, no expiration.
    pub fn new(ways: usize, way_size: usize) -> Self {
        Self {
            ways,
            way_size,
            lifetime: Duration::ZERO,
            background_update: BackgroundUpdateMode::Disabled,
            config_settings: true,
            dump: None,
        }
    }

    /// Set the lifetime of values.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the refresh-ahead mode.
    pub fn with_background_update(mut self, mode: BackgroundUpdateMode) -> Self {
        self.background_update = mode;
        self
    }

    /// Whether the cache listens to hot reloadable config patches.
    pub fn with_config_settings(mut self, enabled: bool) -> Self {
        self.config_settings = enabled;
        self
    }

    /// Enable dumps.
    pub fn with_dump(mut self, dump: DumpConfig) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Parse a static config.
    pub fn from_json(value: &Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value.clone()).map_err(|e| Error::config("invalid lru cache config").with_source(e))?;
        if config.ways == 0 {
            return Err(Error::config("ways must be positive"));
        }
        Ok(config)
    }

    /// Apply a hot reloadable patch.
    pub fn merge_with(&self, patch: &LruCachePatch) -> Self {
        let mut config = self.clone();
        if let Some(way_size) = patch.way_size {
            config.way_size = way_size;
        }
        if let Some(lifetime) = patch.lifetime {
            config.lifetime = lifetime;
        }
        if let Some(background_update) = patch.background_update {
            config.background_update = background_update;
        }
        config
    }
}

/// Hot reloadable patch of an [`LruCacheConfig`], from the `lru-caches` section of a config snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LruCachePatch {
    /// Overrides [`LruCacheConfig::way_size`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub way_size: Option<usize>,
    /// Overrides [`LruCacheConfig::lifetime`].
    #[serde(
        default,
        rename = "lifetime-ms",
        with = "millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub lifetime: Option<Duration>,
    /// Overrides [`LruCacheConfig::background_update`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_update: Option<BackgroundUpdateMode>,
}

#[cfg(test)]
mod tests {
    use recache_common::error::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config = UpdaterConfig::from_json(&json!({ "update-interval": "10s" })).unwrap();
        assert_eq!(config.allowed_update_types, AllowedUpdateTypes::OnlyFull);
        assert_eq!(config.update_jitter, Duration::from_secs(1));
        assert_eq!(config.full_update_interval, Duration::from_secs(10));
        assert_eq!(config.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);
        assert!(config.updates_enabled);
        assert!(config.config_updates_enabled);
        assert_eq!(config.first_update_mode, FirstUpdateMode::Skip);

        let config = UpdaterConfig::from_json(&json!({
            "update-interval": "1s",
            "full-update-interval": "1m",
            "failed-updates-before-expiration": 3,
        }))
        .unwrap();
        assert_eq!(config.allowed_update_types, AllowedUpdateTypes::FullAndIncremental);
        assert_eq!(config.failed_updates_before_expiration, Some(3));
    }

    #[test]
    fn test_update_types_validation() {
        let err = UpdaterConfigBuilder::new()
            .with_update_interval(Duration::from_secs(1))
            .with_update_types(AllowedUpdateTypes::FullAndIncremental)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = UpdaterConfigBuilder::new()
            .with_update_interval(Duration::from_secs(1))
            .with_full_update_interval(Duration::from_secs(10))
            .with_update_types(AllowedUpdateTypes::OnlyIncremental)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = UpdaterConfigBuilder::new()
            .with_update_types(AllowedUpdateTypes::OnlyFull)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        // Accepted with a warning.
        let config = UpdaterConfigBuilder::new()
            .with_update_interval(Duration::from_secs(10))
            .with_full_update_interval(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.allowed_update_types, AllowedUpdateTypes::FullAndIncremental);
    }

    #[test]
    fn test_dump_validation() {
        let base = || {
            UpdaterConfigBuilder::new()
                .with_update_interval(Duration::from_secs(1))
                .with_update_types(AllowedUpdateTypes::OnlyIncremental)
        };
        let dump = DumpConfig::new("/tmp/dumps");

        let err = base()
            .with_dump(dump.clone(), FirstUpdateMode::BestEffort, Some(FirstUpdateType::Full))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = base()
            .with_dump(dump.clone(), FirstUpdateMode::Required, None)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let config = base()
            .with_dump(dump.clone(), FirstUpdateMode::Required, Some(FirstUpdateType::Incremental))
            .build()
            .unwrap();
        assert_eq!(config.first_update_type, FirstUpdateType::Incremental);
        assert_eq!(config.dump, Some(dump.clone()));

        let err = UpdaterConfigBuilder::new()
            .with_update_interval(Duration::from_secs(1))
            .with_dump(dump.clone(), FirstUpdateMode::Required, Some(FirstUpdateType::Incremental))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = UpdaterConfig::from_json(&json!({
            "update-interval": "1s",
            "dump": { "dump-directory": "/tmp/dumps", "max-age": "1h" },
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let config = UpdaterConfig::from_json(&json!({
            "update-interval": "1s",
            "dump": {
                "dump-directory": "/tmp/dumps",
                "max-age": "1h",
                "max-count": 3,
                "first-update-mode": "best-effort",
            },
        }))
        .unwrap();
        let dump = config.dump.unwrap();
        assert_eq!(dump.max_dump_age, Some(Duration::from_secs(3600)));
        assert_eq!(dump.max_dump_count, 3);
        assert!(dump.dumps_enabled);
        assert_eq!(config.first_update_mode, FirstUpdateMode::BestEffort);
    }

    #[test]
    fn test_config_patch() {
        let patch = ConfigPatch::from_json(&json!({ "update-interval-ms": 500, "update-jitter-ms": 800 })).unwrap();
        assert_eq!(patch.update_interval, Duration::from_millis(500));
        assert_eq!(patch.full_update_interval, Duration::from_millis(500));
        assert_eq!(patch.update_jitter, Duration::from_millis(50));
        assert!(patch.updates_enabled);
        assert_eq!(patch.exception_interval, None);

        let patch = ConfigPatch::from_json(&json!({
            "full-update-interval-ms": 2000,
            "exception-interval-ms": 100,
            "updates-enabled": false,
        }))
        .unwrap();
        assert_eq!(patch.update_interval, Duration::from_secs(2));
        assert_eq!(patch.exception_interval, Some(Duration::from_millis(100)));

        assert_eq!(
            ConfigPatch::from_json(&json!({ "updates-enabled": true })).unwrap_err().kind(),
            ErrorKind::Config
        );
    }

    #[test]
    fn test_merge_with() {
        let config = UpdaterConfigBuilder::new()
            .with_update_interval(Duration::from_secs(10))
            .with_exception_interval(Duration::from_secs(1))
            .build()
            .unwrap();
        let patch = ConfigPatch::from_json(&json!({ "update-interval-ms": 2000, "updates-enabled": false })).unwrap();

        let merged = config.merge_with(&patch);
        assert_eq!(merged.update_interval, Duration::from_secs(2));
        assert_eq!(merged.update_jitter, Duration::ZERO);
        assert!(!merged.updates_enabled);
        assert_eq!(merged.exception_interval, Some(Duration::from_secs(1)));
        assert_eq!(merged.allowed_update_types, config.allowed_update_types);
    }

    #[test]
    fn test_lru_cache_config() {
        let config = LruCacheConfig::from_json(&json!({
            "ways": 4,
            "way-size": 128,
            "lifetime": "30s",
            "background-update": "enabled",
        }))
        .unwrap();
        assert_eq!(
            config,
            LruCacheConfig::new(4, 128)
                .with_lifetime(Duration::from_secs(30))
                .with_background_update(BackgroundUpdateMode::Enabled)
        );

        let patch: LruCachePatch = serde_json::from_value(json!({ "lifetime-ms": 1500 })).unwrap();
        let merged = config.merge_with(&patch);
        assert_eq!(merged.lifetime, Duration::from_millis(1500));
        assert_eq!(merged.way_size, 128);

        assert!(LruCacheConfig::from_json(&json!({ "ways": 0, "way-size": 1 })).is_err());
    }
}
