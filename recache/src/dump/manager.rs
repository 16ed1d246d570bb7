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

//! Locates dump files on disk.
//!
//! A dump of a cache updated at `update_time` is stored as `<dir>/<UTC update_time>-v<format version>`, e.g.
//! `2026-10-19T08:30:00.000000-v3`. Dumps are written to a `.tmp` file first and renamed when complete.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use recache_common::{
    clock::{from_micros, to_micros, SharedClock},
    error::{Error, ErrorKind, Result},
};

use crate::config::DumpConfig;

/// Suffix of dumps that are still being written.
pub const TMP_SUFFIX: &str = ".tmp";

const FILENAME_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// A dump file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    /// Update time of the cache contents in the dump.
    pub update_time: SystemTime,
    /// Full path of the file.
    pub path: PathBuf,
    /// Schema version of the dumped values.
    pub format_version: u64,
}

/// Round to the precision of dump file names.
pub fn round_to_micros(time: SystemTime) -> SystemTime {
    from_micros(to_micros(time))
}

/// File name of a dump.
pub fn dump_file_name(update_time: SystemTime, format_version: u64) -> String {
    let time: DateTime<Utc> = update_time.into();
    format!("{}-v{format_version}", time.format(FILENAME_DATE_FORMAT))
}

/// Parse a dump file name into `(update time, format version)`. Temp files are not dumps.
pub fn parse_dump_file_name(file_name: &str) -> Option<(SystemTime, u64)> {
    let (date, version) = file_name.rsplit_once("-v")?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = version.parse().ok()?;
    let date = date.strip_suffix('Z').unwrap_or(date);
    let time = NaiveDateTime::parse_from_str(date, FILENAME_DATE_FORMAT).ok()?.and_utc();
    Some((time.into(), version))
}

/// Whether `file_name` is a leftover of an unfinished dump write.
pub fn is_tmp_file_name(file_name: &str) -> bool {
    file_name
        .strip_suffix(TMP_SUFFIX)
        .is_some_and(|name| parse_dump_file_name(name).is_some())
}

/// List every dump in `directory`, newest first.
pub fn list_dumps(directory: &Path) -> Result<Vec<DumpFile>> {
    let mut dumps = vec![];
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some((update_time, format_version)) = file_name.to_str().and_then(parse_dump_file_name) else {
            continue;
        };
        dumps.push(DumpFile {
            update_time,
            path: entry.path(),
            format_version,
        });
    }
    dumps.sort_by(|a, b| b.update_time.cmp(&a.update_time));
    Ok(dumps)
}

/// Creates, finds, renames and removes the dumps of a single cache.
///
/// All operations are blocking.
#[derive(Debug)]
pub struct DumpManager {
    name: String,
    directory: PathBuf,
    format_version: u64,
    max_dump_age: Option<Duration>,
    max_dump_count: usize,
    clock: SharedClock,
}

impl DumpManager {
    /// Manage the dumps of cache `name` described by `config`.
    pub fn new(name: impl Into<String>, config: &DumpConfig, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            directory: config.dump_directory.clone(),
            format_version: config.format_version,
            max_dump_age: config.max_dump_age,
            max_dump_count: config.max_dump_count,
            clock,
        }
    }

    /// Directory of the dumps.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the dump of contents updated at `update_time`.
    pub fn dump_path(&self, update_time: SystemTime) -> PathBuf {
        self.directory.join(dump_file_name(update_time, self.format_version))
    }

    fn min_acceptable_update_time(&self) -> Option<SystemTime> {
        self.max_dump_age
            .map(|age| round_to_micros(self.clock.now()).checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH))
    }

    /// Write `data` as the dump of contents updated at `update_time`.
    ///
    /// The data lands in a temp file that is synced and then renamed, so a crash never leaves a partial dump.
    pub fn write_new_dump(&self, update_time: SystemTime, data: &[u8]) -> Result<DumpFile> {
        let update_time = round_to_micros(update_time);
        let path = self.dump_path(update_time);
        if path.exists() {
            return Err(Error::new(ErrorKind::Io, "dump file already exists")
                .with_context("cache", &self.name)
                .with_context("path", path.display()));
        }
        fs::create_dir_all(&self.directory).map_err(|e| {
            Error::new(ErrorKind::Io, "create dump directory failed")
                .with_context("cache", &self.name)
                .with_context("directory", self.directory.display())
                .with_source(e)
        })?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(Error::new(ErrorKind::Io, "write dump failed")
                .with_context("cache", &self.name)
                .with_context("path", path.display())
                .with_source(e));
        }

        tracing::debug!(cache = %self.name, path = %path.display(), size = data.len(), "[dump manager]: dump written");
        Ok(DumpFile {
            update_time,
            path,
            format_version: self.format_version,
        })
    }

    /// The newest dump of the current format version that is not too old.
    pub fn latest_dump(&self) -> Option<DumpFile> {
        if !self.directory.exists() {
            tracing::debug!(cache = %self.name, directory = %self.directory.display(), "[dump manager]: dump directory does not exist");
            return None;
        }
        let dumps = match list_dumps(&self.directory) {
            Ok(dumps) => dumps,
            Err(e) => {
                tracing::error!(cache = %self.name, %e, "[dump manager]: list dumps failed");
                return None;
            }
        };
        let min_update_time = self.min_acceptable_update_time();
        let latest = dumps.into_iter().find(|dump| {
            if dump.format_version != self.format_version {
                tracing::debug!(cache = %self.name, path = %dump.path.display(), version = dump.format_version, "[dump manager]: ignore dump of another format version");
                return false;
            }
            if min_update_time.is_some_and(|min| dump.update_time < min) {
                tracing::debug!(cache = %self.name, path = %dump.path.display(), "[dump manager]: ignore dump older than max dump age");
                return false;
            }
            true
        });
        match &latest {
            Some(dump) => tracing::debug!(cache = %self.name, path = %dump.path.display(), "[dump manager]: usable dump found"),
            None => tracing::info!(cache = %self.name, "[dump manager]: no usable dumps found"),
        }
        latest
    }

    /// Rename the dump of `old_update_time` to `new_update_time`. Returns `false` if the old dump is gone.
    pub fn bump_dump_time(&self, old_update_time: SystemTime, new_update_time: SystemTime) -> bool {
        if new_update_time < old_update_time {
            tracing::warn!(cache = %self.name, "[dump manager]: new update time is older than the dumped one");
        }
        let old = self.dump_path(round_to_micros(old_update_time));
        let new = self.dump_path(round_to_micros(new_update_time));
        if !old.is_file() {
            tracing::warn!(cache = %self.name, path = %old.display(), "[dump manager]: the previous dump has disappeared, a new dump will be created");
            return false;
        }
        match fs::rename(&old, &new) {
            Ok(()) => {
                tracing::debug!(cache = %self.name, from = %old.display(), to = %new.display(), "[dump manager]: dump renamed");
                true
            }
            Err(e) => {
                tracing::error!(cache = %self.name, path = %old.display(), %e, "[dump manager]: rename dump failed");
                false
            }
        }
    }

    /// Remove leftover temp files, dumps of older format versions, too old dumps and dumps over the max count.
    pub fn cleanup(&self) {
        if let Err(e) = self.try_cleanup() {
            tracing::error!(cache = %self.name, %e, "[dump manager]: clean up dumps failed");
        }
    }

    fn try_cleanup(&self) -> Result<()> {
        if !self.directory.exists() {
            return Ok(());
        }
        let min_update_time = self.min_acceptable_update_time();
        let mut dumps = vec![];

        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_tmp_file_name(&file_name) {
                tracing::debug!(cache = %self.name, path = %path.display(), "[dump manager]: remove leftover temp file");
                fs::remove_file(&path)?;
                continue;
            }
            let Some((update_time, format_version)) = parse_dump_file_name(&file_name) else {
                tracing::warn!(cache = %self.name, path = %path.display(), "[dump manager]: unrelated file in the dump directory");
                continue;
            };
            if format_version < self.format_version || min_update_time.is_some_and(|min| update_time < min) {
                tracing::debug!(cache = %self.name, path = %path.display(), "[dump manager]: remove expired dump");
                fs::remove_file(&path)?;
                continue;
            }
            if format_version == self.format_version {
                dumps.push(DumpFile {
                    update_time,
                    path,
                    format_version,
                });
            }
        }

        dumps.sort_by(|a, b| b.update_time.cmp(&a.update_time));
        for dump in dumps.iter().skip(self.max_dump_count) {
            tracing::debug!(cache = %self.name, path = %dump.path.display(), "[dump manager]: remove excessive dump");
            fs::remove_file(&dump.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use recache_common::clock::{Clock, MockClock};

    use super::*;

    fn names(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn test_file_name() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_micros(1_760_862_600_123_456);
        let name = dump_file_name(time, 3);
        assert_eq!(name, "2025-10-19T08:30:00.123456-v3");
        assert_eq!(parse_dump_file_name(&name), Some((time, 3)));
        assert_eq!(parse_dump_file_name("2025-10-19T08:30:00.123456Z-v3"), Some((time, 3)));
        assert!(is_tmp_file_name(&format!("{name}{TMP_SUFFIX}")));
        assert!(!is_tmp_file_name(&name));
        assert_eq!(parse_dump_file_name("notes-v1"), None);
        assert_eq!(parse_dump_file_name(&format!("{name}{TMP_SUFFIX}")), None);
    }

    #[test_log::test]
    fn test_write_and_locate() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockClock::new());
        let config = DumpConfig::new(dir.path().join("cache")).with_max_dump_age(Duration::from_secs(60));
        let manager = DumpManager::new("test", &config, clock.clone());
        assert_eq!(manager.latest_dump(), None);

        let t1 = round_to_micros(clock.now());
        manager.write_new_dump(t1, b"first").unwrap();
        clock.advance(Duration::from_secs(10));
        let t2 = round_to_micros(clock.now());
        let second = manager.write_new_dump(t2, b"second").unwrap();

        assert_eq!(manager.write_new_dump(t2, b"again").unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(manager.latest_dump(), Some(second.clone()));
        assert_eq!(fs::read(&second.path).unwrap(), b"second");

        // Both are too old now.
        clock.advance(Duration::from_secs(65));
        assert_eq!(manager.latest_dump(), None);
    }

    #[test_log::test]
    fn test_bump_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockClock::new());
        let config = DumpConfig::new(dir.path())
            .with_format_version(2)
            .with_max_dump_count(2)
            .with_max_dump_age(Duration::from_secs(3600));
        let manager = DumpManager::new("test", &config, clock.clone());

        let t0 = round_to_micros(clock.now());
        let times = (0..4u64).map(|i| t0 + Duration::from_secs(i)).collect::<Vec<_>>();
        for t in &times[..3] {
            manager.write_new_dump(*t, b"data").unwrap();
        }
        assert!(manager.bump_dump_time(times[2], times[3]));
        assert!(!manager.bump_dump_time(times[2], times[3]));

        fs::write(dir.path().join(format!("{}{TMP_SUFFIX}", dump_file_name(t0, 2))), b"partial").unwrap();
        fs::write(dir.path().join(dump_file_name(t0, 1)), b"old version").unwrap();
        fs::write(dir.path().join("README"), b"unrelated").unwrap();

        manager.cleanup();
        let mut expected = vec![
            dump_file_name(times[1], 2),
            dump_file_name(times[3], 2),
            "README".to_string(),
        ];
        expected.sort();
        assert_eq!(names(dir.path()), expected);

        let dumps = list_dumps(dir.path()).unwrap();
        assert_eq!(dumps.len(), 2);
        assert_eq!(dumps[0].update_time, times[3]);
    }
}
