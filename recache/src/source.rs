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

//! In-process source of hot reloadable configuration.
//!
//! A snapshot is a JSON object whose top level keys are sections:
//!
//! ```json
//! {
//!     "caches": { "tickets": { "update-interval-ms": 1000 } },
//!     "lru-caches": { "dns": { "lifetime-ms": 30000 } },
//!     "dumps": { "tickets": { "dumps-enabled": false } }
//! }
//! ```

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use recache_common::{
    error::{Error, Result},
    rcu::Variable,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Section with [`crate::ConfigPatch`]es of updater driven caches, by cache name.
pub const CACHES_SECTION: &str = "caches";
/// Section with [`crate::LruCachePatch`]es, by cache name.
pub const LRU_CACHES_SECTION: &str = "lru-caches";
/// Section with [`crate::DumpConfigPatch`]es, by cache name.
pub const DUMPS_SECTION: &str = "dumps";

type Callback = Arc<dyn Fn(Option<&Value>) + Send + Sync + 'static>;

struct Subscriber {
    id: u64,
    section: String,
    callback: Callback,
}

struct Inner {
    snapshot: Variable<Value>,
    subscribers: Mutex<Vec<Subscriber>>,
    /// Serializes publishing and subscribing so that no snapshot is missed or delivered twice.
    publish: Mutex<()>,
    next_id: AtomicU64,
}

/// Holds the current config snapshot and notifies subscribers of changed sections.
#[derive(Clone)]
pub struct ConfigSource {
    inner: Arc<Inner>,
}

impl Debug for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSource")
            .field("snapshot", &self.inner.snapshot.read())
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::new(Value::Object(Default::default()))
    }
}

impl ConfigSource {
    /// Create a source holding `snapshot`.
    pub fn new(snapshot: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                snapshot: Variable::new(snapshot),
                subscribers: Mutex::new(vec![]),
                publish: Mutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Value> {
        self.inner.snapshot.read()
    }

    /// The current value of `section`.
    pub fn section(&self, section: &str) -> Option<Value> {
        self.inner.snapshot.read().get(section).cloned()
    }

    /// Call `callback` with the current value of `section` and then on every change of it.
    ///
    /// The callback runs on the publishing thread and must not publish itself.
    pub fn update_and_listen<F>(&self, section: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let section = section.into();
        let callback: Callback = Arc::new(callback);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let _publish = self.inner.publish.lock();
        callback(self.inner.snapshot.read().get(&section));
        self.inner.subscribers.lock().push(Subscriber {
            id,
            section: section.clone(),
            callback,
        });
        tracing::trace!(id, section, "[config source]: subscribed");

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Replace the snapshot and notify subscribers of every section that changed.
    pub fn publish(&self, snapshot: Value) {
        let _publish = self.inner.publish.lock();
        let old = self.inner.snapshot.read();
        self.inner.snapshot.assign(snapshot);
        let new = self.inner.snapshot.read();

        let changed = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| old.get(&s.section) != new.get(&s.section))
            .map(|s| (s.section.clone(), s.callback.clone()))
            .collect::<Vec<_>>();
        drop(old);

        tracing::debug!(notified = changed.len(), "[config source]: snapshot published");
        for (section, callback) in changed {
            callback(new.get(&section));
        }
        self.inner.snapshot.cleanup();
    }

    /// Update a single section.
    pub fn publish_section(&self, section: &str, value: Value) {
        let mut snapshot = (*self.inner.snapshot.read()).clone();
        match snapshot.as_object_mut() {
            Some(object) => {
                object.insert(section.to_string(), value);
            }
            None => {
                let mut object = serde_json::Map::new();
                object.insert(section.to_string(), value);
                snapshot = Value::Object(object);
            }
        }
        self.publish(snapshot);
    }

    /// Number of live subscriptions.
    pub fn subscribers(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Parse the entry of `name` in a section mapping names to patches.
pub fn find_patch<T>(section: Option<&Value>, name: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(value) = section.and_then(|s| s.get(name)) else {
        return Ok(None);
    };
    serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| Error::config("invalid config patch").with_context("name", name).with_source(e))
}

/// Unsubscribes from a [`ConfigSource`] when dropped.
#[must_use = "the subscription is cancelled as soon as it is dropped"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    /// Cancel the subscription now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
            tracing::trace!(id = self.id, "[config source]: unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ConfigPatch;

    #[test_log::test]
    fn test_update_and_listen() {
        let source = ConfigSource::new(json!({ "caches": { "a": { "update-interval-ms": 10 } } }));
        let seen = Arc::new(Mutex::new(vec![]));

        let subscription = {
            let seen = seen.clone();
            source.update_and_listen(CACHES_SECTION, move |section| {
                seen.lock().push(find_patch::<ConfigPatch>(section, "a").unwrap());
            })
        };
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(
            seen.lock()[0].map(|p| p.update_interval),
            Some(std::time::Duration::from_millis(10))
        );

        // Unrelated section: no notification.
        source.publish_section(DUMPS_SECTION, json!({ "a": { "dumps-enabled": false } }));
        assert_eq!(seen.lock().len(), 1);

        source.publish_section(CACHES_SECTION, json!({}));
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(seen.lock()[1], None);

        assert_eq!(source.subscribers(), 1);
        subscription.unsubscribe();
        assert_eq!(source.subscribers(), 0);

        source.publish(json!({ "caches": { "a": { "update-interval-ms": 20 } } }));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_find_patch_error() {
        let section = json!({ "a": { "update-interval-ms": "soon" } });
        assert!(find_patch::<ConfigPatch>(Some(&section), "a").is_err());
        assert!(find_patch::<ConfigPatch>(Some(&section), "b").unwrap().is_none());
        assert!(find_patch::<ConfigPatch>(None, "a").unwrap().is_none());
    }
}
