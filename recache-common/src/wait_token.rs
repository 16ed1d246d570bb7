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

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    tokens: AtomicUsize,
    notify: Notify,
}

/// Tracks detached tasks so their owner can wait for all of them before tearing down.
///
/// Every detached task holds a [`WaitToken`]. [`WaitTokenStorage::wait_for_all_tokens`] resolves once all
/// tokens have been dropped.
#[derive(Debug, Default, Clone)]
pub struct WaitTokenStorage {
    inner: Arc<Inner>,
}

/// A token held by a detached task.
#[derive(Debug)]
pub struct WaitToken {
    inner: Arc<Inner>,
}

impl Drop for WaitToken {
    fn drop(&mut self) {
        if self.inner.tokens.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

impl WaitTokenStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new token.
    pub fn get_token(&self) -> WaitToken {
        self.inner.tokens.fetch_add(1, Ordering::AcqRel);
        WaitToken {
            inner: self.inner.clone(),
        }
    }

    /// Number of tokens that have not been dropped yet.
    pub fn alive_tokens(&self) -> usize {
        self.inner.tokens.load(Ordering::Acquire)
    }

    /// Wait until every issued token is dropped.
    pub async fn wait_for_all_tokens(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the counter so a concurrent drop cannot be missed.
            notified.as_mut().enable();
            if self.alive_tokens() == 0 {
                return;
            }
            notified.await;
        }
    }
}
