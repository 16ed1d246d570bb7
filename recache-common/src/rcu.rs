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

//! Read-copy-update cell.
//!
//! Readers get a consistent snapshot without blocking writers. A replaced snapshot is kept alive until the
//! last reader holding it lets go, then [`Variable::cleanup`] releases it.

use std::{fmt::Debug, sync::Arc};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

/// A value that is read often and replaced rarely.
pub struct Variable<T> {
    current: ArcSwap<T>,
    retired: Mutex<Vec<Arc<T>>>,
}

impl<T: Debug> Debug for Variable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("current", &self.current.load())
            .field("retired", &self.retired.lock().len())
            .finish()
    }
}

impl<T: Default> Default for Variable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Variable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(value),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Take a snapshot of the current value.
    pub fn read(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Replace the current value. Readers that already took a snapshot keep seeing the old one.
    pub fn assign(&self, value: T) {
        let old = self.current.swap(Arc::new(value));
        let mut retired = self.retired.lock();
        retired.retain(|v| Arc::strong_count(v) > 1);
        if Arc::strong_count(&old) > 1 {
            retired.push(old);
        }
    }

    /// Replace the current value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        // Serialize writers so that concurrent updates do not lose each other.
        let mut retired = self.retired.lock();
        let current = self.current.load_full();
        let old = self.current.swap(Arc::new(f(&current)));
        drop(current);
        retired.retain(|v| Arc::strong_count(v) > 1);
        if Arc::strong_count(&old) > 1 {
            retired.push(old);
        }
    }

    /// Drop retired snapshots that no reader holds any more.
    pub fn cleanup(&self) {
        self.retired.lock().retain(|v| Arc::strong_count(v) > 1);
    }

    /// Number of retired snapshots still alive.
    pub fn retired_len(&self) -> usize {
        self.retired.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_isolation() {
        let var = Variable::new(1u64);
        let snapshot = var.read();

        var.assign(2);
        assert_eq!(*snapshot, 1);
        assert_eq!(*var.read(), 2);
        assert_eq!(var.retired_len(), 1);

        drop(snapshot);
        var.cleanup();
        assert_eq!(var.retired_len(), 0);
    }

    #[test]
    fn test_update() {
        let var = Variable::new(vec![1u64]);
        var.update(|v| {
            let mut v = v.clone();
            v.push(2);
            v
        });
        assert_eq!(*var.read(), vec![1, 2]);
        assert_eq!(var.retired_len(), 0);
    }
}
