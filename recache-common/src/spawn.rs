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

use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{runtime::Handle, task::JoinHandle};

use crate::error::{Error, ErrorKind, Result};

/// A wrapper for [`JoinHandle`] that maps join failures into [`Error`].
#[derive(Debug)]
pub struct SpawnHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> SpawnHandle<T> {
    /// Abort the task. Awaiting an aborted handle returns an [`ErrorKind::Join`] error.
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Check whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for SpawnHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(v)) => Poll::Ready(Ok(v)),
            Poll::Ready(Err(e)) => {
                let message = if e.is_cancelled() { "task cancelled" } else { "task panicked" };
                Poll::Ready(Err(Error::new(ErrorKind::Join, message).with_source(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Where background refreshes, periodic updates and dump writes run.
#[derive(Debug, Clone)]
pub struct Spawner {
    handle: Handle,
}

impl From<Handle> for Spawner {
    fn from(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Spawner {
    /// Wrapper for [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> SpawnHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        SpawnHandle {
            inner: self.handle.spawn(future),
        }
    }

    /// Wrapper for [`Handle::spawn_blocking`].
    pub fn spawn_blocking<F, R>(&self, func: F) -> SpawnHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        SpawnHandle {
            inner: self.handle.spawn_blocking(func),
        }
    }

    /// Get the spawner of the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// Get the spawner of the current runtime, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self { handle })
    }
}
