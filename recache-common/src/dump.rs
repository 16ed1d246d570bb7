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

//! Binary dump format.
//!
//! ```plain
//! | magic (4B) | format version (u32) | taken at, unix micros (i64) | entry count (u64) |
//! | key len (u32) | key | value len (u32) | value | update time, unix micros (i64) | ... |
//! ```
//!
//! All integers are big endian. Update times are wall-clock so that they survive a process restart.

use std::{sync::Arc, time::SystemTime};

use bytes::{Buf, BufMut};

use crate::{
    clock::{from_micros, to_micros, TimeAnchor},
    error::{Error, ErrorKind, Result},
};

/// Magic bytes at the start of every dump.
pub const MAGIC: [u8; 4] = *b"RCDP";
/// Version of the layout produced by [`DumpWriter`].
pub const FORMAT_VERSION: u32 = 1;
/// Length of the dump header.
pub const HEADER_LEN: usize = 4 + 4 + 8 + 8;

const COUNT_OFFSET: usize = 4 + 4 + 8;

/// Dump header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpHeader {
    /// Format version.
    pub version: u32,
    /// Wall-clock time the dump was taken at.
    pub taken_at: SystemTime,
    /// Number of entries that follow the header.
    pub entries: u64,
}

/// One dumped entry with its key and value still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    /// Encoded key.
    pub key: Vec<u8>,
    /// Encoded value.
    pub value: Vec<u8>,
    /// Wall-clock time of the last update of the entry.
    pub update_time: SystemTime,
}

/// Serializes entries into the dump format.
#[derive(Debug)]
pub struct DumpWriter {
    anchor: TimeAnchor,
    buf: Vec<u8>,
    entries: u64,
}

impl DumpWriter {
    /// Create a writer. `anchor` translates monotonic update times into wall-clock time.
    pub fn new(anchor: TimeAnchor) -> Self {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.put_slice(&MAGIC);
        buf.put_u32(FORMAT_VERSION);
        buf.put_i64(to_micros(anchor.wall));
        buf.put_u64(0);
        Self { anchor, buf, entries: 0 }
    }

    /// The anchor taken when the dump started.
    pub fn anchor(&self) -> TimeAnchor {
        self.anchor
    }

    /// Append an entry.
    pub fn write_entry(&mut self, key: &[u8], value: &[u8], update_time: SystemTime) -> Result<()> {
        put_chunk(&mut self.buf, key)?;
        put_chunk(&mut self.buf, value)?;
        self.buf.put_i64(to_micros(update_time));
        self.entries += 1;
        Ok(())
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Finish the dump and return its bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let count = self.entries.to_be_bytes();
        self.buf[COUNT_OFFSET..HEADER_LEN].copy_from_slice(&count);
        self.buf
    }
}

fn put_chunk(buf: &mut Vec<u8>, chunk: &[u8]) -> Result<()> {
    let len = u32::try_from(chunk.len())
        .map_err(|_| Error::new(ErrorKind::DumpCorrupted, "entry too large").with_context("len", chunk.len()))?;
    buf.put_u32(len);
    buf.put_slice(chunk);
    Ok(())
}

/// Parses a dump produced by [`DumpWriter`].
#[derive(Debug)]
pub struct DumpReader<'a> {
    header: DumpHeader,
    body: &'a [u8],
    read: u64,
}

impl<'a> DumpReader<'a> {
    /// Parse the header of `buf`.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::dump_corrupted("dump is shorter than its header").with_context("len", buf.len()));
        }
        let mut body = buf;
        if body[..MAGIC.len()] != MAGIC {
            return Err(Error::dump_corrupted("bad magic"));
        }
        body.advance(MAGIC.len());
        let version = body.get_u32();
        if version != FORMAT_VERSION {
            return Err(Error::new(ErrorKind::DumpIncompatible, "unknown dump format version")
                .with_context("version", version)
                .with_context("supported", FORMAT_VERSION));
        }
        let taken_at = from_micros(body.get_i64());
        let entries = body.get_u64();
        Ok(Self {
            header: DumpHeader {
                version,
                taken_at,
                entries,
            },
            body,
            read: 0,
        })
    }

    /// The parsed header.
    pub fn header(&self) -> DumpHeader {
        self.header
    }

    /// Read the next entry, `None` once all entries announced by the header are read.
    pub fn next_entry(&mut self) -> Result<Option<DumpRecord>> {
        if self.read == self.header.entries {
            if self.body.has_remaining() {
                return Err(Error::dump_corrupted("trailing bytes after the last entry")
                    .with_context("remaining", self.body.remaining()));
            }
            return Ok(None);
        }
        let key = self.get_chunk()?;
        let value = self.get_chunk()?;
        if self.body.remaining() < 8 {
            return Err(self.truncated());
        }
        let update_time = from_micros(self.body.get_i64());
        self.read += 1;
        Ok(Some(DumpRecord { key, value, update_time }))
    }

    fn get_chunk(&mut self) -> Result<Vec<u8>> {
        if self.body.remaining() < 4 {
            return Err(self.truncated());
        }
        let len = self.body.get_u32() as usize;
        if self.body.remaining() < len {
            return Err(self.truncated());
        }
        let chunk = self.body[..len].to_vec();
        self.body.advance(len);
        Ok(chunk)
    }

    fn truncated(&self) -> Error {
        Error::dump_corrupted("dump body is truncated")
            .with_context("expected", self.header.entries)
            .with_context("read", self.read)
    }
}

/// A cache whose contents can be written to and restored from a dump.
pub trait Dumpable: Send + Sync + 'static {
    /// Write every entry into `writer`.
    fn get_and_write(&self, writer: &mut DumpWriter) -> Result<()>;

    /// Restore every entry from `reader`.
    fn read_and_set(&self, reader: &mut DumpReader<'_>) -> Result<()>;
}

/// Notified whenever a dumpable cache is modified.
pub trait DirtyListener: Send + Sync + 'static {
    /// The cache contents changed since the last dump.
    fn on_modified(&self);
}

impl<T> DirtyListener for Arc<T>
where
    T: DirtyListener + ?Sized,
{
    fn on_modified(&self) {
        self.as_ref().on_modified()
    }
}
