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

//! Persisting cache contents across restarts.

mod dumper;
mod manager;

pub use dumper::{DumpStatistics, Dumper, DumperBuilder, DumperDirtyListener};
pub use manager::{
    dump_file_name, is_tmp_file_name, list_dumps, parse_dump_file_name, round_to_micros, DumpFile, DumpManager,
    TMP_SUFFIX,
};
