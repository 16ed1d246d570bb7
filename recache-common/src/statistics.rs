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

//! Statistics registry.
//!
//! Components register a writer under a metric path prefix. [`StatisticsStorage::collect`] calls every live
//! writer and renders the result as JSON:
//!
//! ```json
//! { "cache": [ { "labels": { "cache_name": "tickets" }, "value": { "hits": 10 } } ] }
//! ```

use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use serde_json::{json, Value};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increase by one.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increase by `v`.
    pub fn add(&self, v: u64) {
        self.0.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Reset to zero and return the previous value.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

type Writer = Arc<dyn Fn() -> Value + Send + Sync + 'static>;

struct Entry {
    id: u64,
    prefix: String,
    labels: BTreeMap<String, String>,
    writer: Writer,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

/// A registry of statistics writers.
#[derive(Clone, Default)]
pub struct StatisticsStorage {
    inner: Arc<Inner>,
}

impl Debug for StatisticsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsStorage")
            .field("writers", &self.inner.entries.read().len())
            .finish()
    }
}

/// Keeps a writer registered. Dropping it unregisters the writer.
#[must_use = "the writer is unregistered as soon as the holder is dropped"]
pub struct StatisticsHolder {
    id: u64,
    inner: Arc<Inner>,
}

impl Debug for StatisticsHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsHolder").field("id", &self.id).finish()
    }
}

impl Drop for StatisticsHolder {
    fn drop(&mut self) {
        self.inner.entries.write().retain(|e| e.id != self.id);
    }
}

impl StatisticsStorage {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `writer` under `prefix` with the given labels.
    pub fn register_writer<I, K, V, F>(&self, prefix: impl Into<String>, labels: I, writer: F) -> StatisticsHolder
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            id,
            prefix: prefix.into(),
            labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            writer: Arc::new(writer),
        };
        self.inner.entries.write().push(entry);
        StatisticsHolder {
            id,
            inner: self.inner.clone(),
        }
    }

    /// Number of registered writers.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether no writer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every registered writer and group the results by prefix.
    pub fn collect(&self) -> Value {
        // Writers run outside of the lock so they may touch the registry themselves.
        let entries = self
            .inner
            .entries
            .read()
            .iter()
            .map(|e| (e.prefix.clone(), e.labels.clone(), e.writer.clone()))
            .collect::<Vec<_>>();

        let mut out: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for (prefix, labels, writer) in entries {
            out.entry(prefix).or_default().push(json!({
                "labels": labels,
                "value": writer(),
            }));
        }
        json!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_collect() {
        let storage = StatisticsStorage::new();
        let counter = Arc::new(Counter::default());
        counter.add(3);

        let c = counter.clone();
        let holder = storage.register_writer("cache", [("cache_name", "tickets")], move || json!({ "hits": c.get() }));

        assert_eq!(
            storage.collect(),
            json!({ "cache": [ { "labels": { "cache_name": "tickets" }, "value": { "hits": 3 } } ] })
        );

        drop(holder);
        assert!(storage.is_empty());
        assert_eq!(storage.collect(), json!({}));
    }

    #[test]
    fn test_counter_take() {
        let counter = Counter::default();
        counter.inc();
        counter.inc();
        assert_eq!(counter.take(), 2);
        assert_eq!(counter.get(), 0);
    }
}
