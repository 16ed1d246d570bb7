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

//! Shared components and utils for recache.

/// Injected wall-clock and monotonic time.
pub mod clock;
/// Key and value traits, codecs for dumped entries.
pub mod code;
/// Dump format and the dumpable cache contract.
pub mod dump;
/// Error type.
pub mod error;
/// Read-copy-update cell for hot reloadable settings.
pub mod rcu;
/// Task spawner.
pub mod spawn;
/// Statistics registry.
pub mod statistics;
/// Tracking of detached tasks.
pub mod wait_token;
