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

//! recache - self-refreshing sharded cache for Rust.
//!
//! The in-memory cache lives in [`recache_memory`] and is re-exported here. On top of it this crate provides:
//!
//! - [`CacheUpdater`]: periodic full and incremental updates of a whole cache, with failure accounting, dumps and
//!   config hot reload.
//! - [`Dumper`] and [`DumpManager`]: crash-safe dumps that warm-start a cache after a restart.
//! - [`LruCacheComponent`]: a named LRU cache bound to a fetch function, with statistics, dumps and hot reload.
//! - [`ConfigSource`]: the in-process source of hot reloadable config sections.
//! - [`PeriodicTask`]: the scheduler the updates run on.

mod component;
mod config;
mod dump;
mod periodic;
mod source;
mod update;
mod updater;

/// Re-exported items of recache.
pub mod prelude;
pub use prelude::*;

pub use recache_common as common;
pub use recache_memory as memory;
