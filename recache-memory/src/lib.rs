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

//! In-memory part of recache.
//!
//! The building blocks, leaves first:
//!
//! - [`LockTable`]: async locks selected by key hash, used to run at most one fetch per key.
//! - [`Way`]: one LRU partition.
//! - [`ShardedStore`]: a fixed number of ways, a key is routed to a way by hash.
//! - [`ExpirableCache`]: the store with time-to-live, refresh-ahead, single-flight fetches, dumps and
//!   statistics.

mod dumpable;
mod expirable;
mod lock_table;
mod statistics;
mod store;
mod way;
mod wrapper;

/// Re-exported items of recache-memory.
pub mod prelude;
pub use prelude::*;
