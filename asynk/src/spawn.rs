// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The spawn handle: a future that resolves with the spawned
//! computation's output, plus cooperative cancellation.

use crate::{
    atomic_waker::AtomicWaker,
    context::Context,
    error::Cancelled,
    future::Future,
    poll::Poll,
    promise::Promise,
};
use asynk_infra::shared::Shared;
use core::sync::atomic::{AtomicBool, Ordering};
use log::trace;
use std::any::Any;

pub(crate) struct CancelState {
    flag: AtomicBool,
    /// The spawned task's waker, refreshed on every poll so `cancel`
    /// can reschedule it.
    waker: AtomicWaker,
}

/// An owned handle to a spawned computation. Polling it polls the
/// embedded promise; dropping it detaches (the computation keeps
/// running).
pub struct Task<T: Send + 'static> {
    promise: Promise<Result<T, Cancelled>>,
    cancel: Shared<CancelState>,
    /// Keeps the executor that owns the computation alive for the
    /// handle's lifetime.
    _owner: Box<dyn Any + Send + Sync>,
}

impl<T: Send + 'static> Task<T> {
    /// Asks the computation to stop. Cooperative: the wrapping future
    /// observes the flag at its next poll, before or after the user
    /// future's own poll. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.flag.swap(true, Ordering::AcqRel) {
            trace!("task handle: cancel requested");
            self.cancel.waker.signal();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.flag.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Future for Task<T> {
    type Output = Result<T, Cancelled>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.promise.poll(cx)
    }
}

impl<T: Send + 'static> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builds the executor-side future and the user-side handle for one
/// spawn. The remote future resolves the shared promise and always
/// completes with `()` so the scheduler can release its node.
pub(crate) fn spawn_pair<G>(
    future: G,
    owner: Box<dyn Any + Send + Sync>,
) -> (RemoteFuture<G>, Task<G::Output>)
where
    G: Future + Send + 'static,
    G::Output: Send + 'static,
{
    let promise = Promise::new();
    let cancel = Shared::new(CancelState {
        flag: AtomicBool::new(false),
        waker: AtomicWaker::new(),
    });
    let remote = RemoteFuture {
        inner: Some(future),
        promise: promise.clone(),
        cancel: cancel.clone(),
    };
    let handle = Task {
        promise,
        cancel,
        _owner: owner,
    };
    (remote, handle)
}

pub(crate) struct RemoteFuture<G: Future>
where
    G::Output: Send,
{
    inner: Option<G>,
    promise: Promise<Result<G::Output, Cancelled>>,
    cancel: Shared<CancelState>,
}

impl<G: Future> RemoteFuture<G>
where
    G::Output: Send,
{
    fn finish_cancelled(&mut self) -> Poll<()> {
        trace!("task handle: spawned future dropped on cancellation");
        self.inner = None;
        self.promise.resolve(Err(Cancelled));
        Poll::Ready(())
    }
}

impl<G: Future> Future for RemoteFuture<G>
where
    G::Output: Send,
{
    type Output = ();

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.cancel.flag.load(Ordering::Acquire) {
            return self.finish_cancelled();
        }
        // Register before polling so a cancel that fires mid-poll
        // still reschedules this task.
        self.cancel.waker.register(cx.waker());
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(());
        };
        match inner.poll(cx) {
            Poll::Ready(value) => {
                self.inner = None;
                self.promise.resolve(Ok(value));
                Poll::Ready(())
            }
            Poll::Pending => {
                if self.cancel.flag.load(Ordering::Acquire) {
                    return self.finish_cancelled();
                }
                Poll::Pending
            }
        }
    }
}
