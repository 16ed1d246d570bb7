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

mod error;

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use bytesize::ByteSize;
use clap::{Args, Subcommand};
use recache::{common::dump::DumpReader, is_tmp_file_name, list_dumps};

pub use self::error::{Error, Result};

/// Arguments of the `dump` command.
#[derive(Debug, Args)]
pub struct DumpArgs {
    #[command(subcommand)]
    command: DumpCommand,
}

#[derive(Debug, Subcommand)]
enum DumpCommand {
    /// List the dumps of a cache, newest first.
    List {
        /// Dump directory of the cache.
        dir: PathBuf,
    },
    /// Validate a dump file and print its header.
    Inspect {
        /// Dump file.
        file: PathBuf,

        /// Print the sizes of the first `entries` entries.
        #[arg(short, long, default_value_t = 0)]
        entries: usize,
    },
}

/// Run a `dump` subcommand and print its output.
pub fn run(args: DumpArgs) -> Result<()> {
    match args.command {
        DumpCommand::List { dir } => {
            for line in list(&dir)? {
                println!("{line}");
            }
        }
        DumpCommand::Inspect { file, entries } => {
            let summary = inspect(&file, entries)?;
            println!("{summary}");
        }
    }
    Ok(())
}

fn format_time(time: SystemTime) -> String {
    humantime::format_rfc3339_micros(time).to_string()
}

fn list(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.display().to_string()));
    }

    let mut lines = vec![];
    for dump in list_dumps(dir)? {
        let size = fs::metadata(&dump.path)?.len();
        lines.push(format!(
            "{}  v{}  {}  {}",
            format_time(dump.update_time),
            dump.format_version,
            ByteSize::b(size),
            dump.path.display()
        ));
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().is_some_and(is_tmp_file_name) {
            lines.push(format!("unfinished write  {}", entry.path().display()));
        }
    }
    Ok(lines)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    version: u32,
    taken_at: Option<SystemTime>,
    entries: u64,
    key_bytes: u64,
    value_bytes: u64,
    oldest_update: Option<SystemTime>,
    samples: Vec<(usize, usize)>,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "format version: {}", self.version)?;
        if let Some(taken_at) = self.taken_at {
            writeln!(f, "taken at:       {}", format_time(taken_at))?;
        }
        writeln!(f, "entries:        {}", self.entries)?;
        writeln!(f, "keys:           {}", ByteSize::b(self.key_bytes))?;
        write!(f, "values:         {}", ByteSize::b(self.value_bytes))?;
        if let Some(oldest) = self.oldest_update {
            write!(f, "\noldest update:  {}", format_time(oldest))?;
        }
        for (i, (key, value)) in self.samples.iter().enumerate() {
            write!(f, "\n#{i}: key {key}B, value {value}B")?;
        }
        Ok(())
    }
}

/// Walk every entry so that a truncated or padded dump is reported.
fn inspect(file: &Path, samples: usize) -> Result<Summary> {
    let buf = fs::read(file)?;
    let mut reader = DumpReader::new(&buf)?;
    let header = reader.header();

    let mut summary = Summary {
        version: header.version,
        taken_at: Some(header.taken_at),
        ..Default::default()
    };
    while let Some(record) = reader.next_entry()? {
        if summary.samples.len() < samples {
            summary.samples.push((record.key.len(), record.value.len()));
        }
        summary.entries += 1;
        summary.key_bytes += record.key.len() as u64;
        summary.value_bytes += record.value.len() as u64;
        summary.oldest_update = Some(match summary.oldest_update {
            Some(oldest) => oldest.min(record.update_time),
            None => record.update_time,
        });
    }
    Ok(summary)
}
