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

//! The executor façade: submission and spawning over a type-erased
//! task future, plus the blocking single-threaded executor.

use crate::{
    context::Context,
    error::SubmitError,
    future::Future,
    park::{Semaphore, SemaphoreWake},
    poll::Poll,
    scheduler::Scheduler,
    spawn::{self, Task},
    task::SchedShared,
    waker::Waker,
};
use asynk_infra::shared::Shared;
use core::sync::atomic::Ordering;
use log::{debug, trace};
use std::{cell::RefCell, sync::Arc};

/// The type-erased unit future stored at the executor boundary.
pub type TaskFuture = Box<dyn Future<Output = ()> + Send + 'static>;

/// Schedules unit-output futures for asynchronous execution. An
/// executor always returns to the caller before polling the
/// submission.
pub trait Executor {
    fn try_submit(&self, future: TaskFuture) -> Result<(), SubmitError>;
}

pub trait ExecutorExt: Executor {
    /// The infallible flavor of [`Executor::try_submit`]; panics if
    /// the executor is shut down.
    fn submit(&self, future: impl Future<Output = ()> + Send + 'static) {
        self.try_submit(Box::new(future))
            .expect("Executor rejected the submission");
    }

    /// Submit-with-handle: wraps `future` so its output lands in a
    /// promise, and returns the [`Task`] that awaits (and can cancel)
    /// it.
    fn try_spawn<G>(&self, future: G) -> Result<Task<G::Output>, SubmitError>
    where
        Self: Clone + Send + Sync + Sized + 'static,
        G: Future + Send + 'static,
        G::Output: Send + 'static,
    {
        let (remote, handle) = spawn::spawn_pair(future, Box::new(self.clone()));
        self.try_submit(Box::new(remote))?;
        Ok(handle)
    }

    /// The infallible flavor of [`ExecutorExt::try_spawn`].
    fn spawn<G>(&self, future: G) -> Task<G::Output>
    where
        Self: Clone + Send + Sync + Sized + 'static,
        G: Future + Send + 'static,
        G::Output: Send + 'static,
    {
        self.try_spawn(future).expect("Executor rejected the spawn")
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

/// A clonable, thread-safe handle to a [`ThreadExecutor`]'s submission
/// queue.
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Shared<SchedShared<TaskFuture>>,
}

impl Executor for ExecutorHandle {
    fn try_submit(&self, future: TaskFuture) -> Result<(), SubmitError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Shutdown);
        }
        self.shared.incoming.push(future);
        self.shared.driver.signal();
        Ok(())
    }
}

impl std::fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHandle").finish_non_exhaustive()
    }
}

thread_local! {
    static CURRENT_RUNNER: RefCell<Option<ExecutorHandle>> = const { RefCell::new(None) };
}

/// The runner driving the current thread, if any. Installed around
/// the driver loop so that ambient `Context::submit`/`spawn` can find
/// their executor.
pub fn current() -> Option<ExecutorHandle> {
    CURRENT_RUNNER.with(|slot| slot.borrow().clone())
}

struct RunnerGuard {
    prev: Option<ExecutorHandle>,
}

impl RunnerGuard {
    fn enter(handle: ExecutorHandle) -> Self {
        let prev = CURRENT_RUNNER.with(|slot| slot.borrow_mut().replace(handle));
        Self { prev }
    }
}

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_RUNNER.with(|slot| *slot.borrow_mut() = prev);
    }
}

/// A blocking executor: drives its scheduler on the calling thread and
/// parks on a counting semaphore between ticks.
///
/// Polling is strictly single-threaded; submissions and wake-ups may
/// come from anywhere. Re-entering `run`/`run_until` from inside a
/// task is a programmer bug and traps.
pub struct ThreadExecutor {
    scheduler: RefCell<Scheduler<TaskFuture>>,
    parker: Arc<Semaphore>,
}

impl ThreadExecutor {
    pub fn new() -> Self {
        Self {
            scheduler: RefCell::new(Scheduler::new()),
            parker: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            shared: self.scheduler.borrow().shared().clone(),
        }
    }

    pub fn try_spawn<G>(&self, future: G) -> Result<Task<G::Output>, SubmitError>
    where
        G: Future + Send + 'static,
        G::Output: Send + 'static,
    {
        self.handle().try_spawn(future)
    }

    pub fn spawn<G>(&self, future: G) -> Task<G::Output>
    where
        G: Future + Send + 'static,
        G::Output: Send + 'static,
    {
        self.handle().spawn(future)
    }

    /// The number of submitted futures that have not completed yet.
    /// Excludes submissions still sitting in the cross-thread queue.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.borrow().len()
    }

    fn unpark_waker(&self) -> Waker {
        Waker::from_wake(SemaphoreWake(self.parker.clone()))
    }

    /// Polls ready tasks until every one of them is blocked (false) or
    /// none remain (true).
    fn drive(&self, cx: &mut Context<'_>) -> bool {
        let mut sched = self.scheduler.borrow_mut();
        loop {
            match sched.poll_next(cx) {
                Poll::Ready(Some(())) => {}
                Poll::Ready(None) => return true,
                Poll::Pending => return false,
            }
        }
    }

    /// Runs until no task remains, parking whenever all of them are
    /// blocked.
    pub fn run(&self) {
        let waker = self.unpark_waker();
        let _runner = RunnerGuard::enter(self.handle());
        loop {
            let mut cx = Context::new(&waker);
            if self.drive(&mut cx) {
                debug!("executor: run complete");
                return;
            }
            trace!("executor: parking");
            self.parker.acquire();
        }
    }

    /// Blocks the calling thread until `future` completes, driving
    /// spawned tasks in between. The main future is polled on the
    /// stack and never enters the scheduler, so it may be `!Send`.
    pub fn run_until<G: Future>(&self, mut future: G) -> G::Output {
        let waker = self.unpark_waker();
        let _runner = RunnerGuard::enter(self.handle());
        loop {
            let mut cx = Context::new(&waker);
            if let Poll::Ready(value) = future.poll(&mut cx) {
                return value;
            }
            self.drive(&mut cx);
            trace!("executor: parking");
            self.parker.acquire();
        }
    }
}

impl Executor for ThreadExecutor {
    fn try_submit(&self, future: TaskFuture) -> Result<(), SubmitError> {
        self.handle().try_submit(future)
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThreadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadExecutor")
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

/// Drives `future` to completion on a throwaway [`ThreadExecutor`].
pub fn block_on<G: Future>(future: G) -> G::Output {
    ThreadExecutor::new().run_until(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{self, FutureExt};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn test_block_on_plain_value() {
        assert_eq!(block_on(future::ready(41).map(|v| v + 1)), 42);
    }

    #[test]
    fn test_run_drains_submissions() {
        let exec = ThreadExecutor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let hits = hits.clone();
            exec.submit(future::yield_now().map(move |()| {
                hits.fetch_add(1, AtomicOrdering::SeqCst);
            }));
        }
        exec.run();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 5);
        assert_eq!(exec.pending_tasks(), 0);
    }

    #[test]
    fn test_spawn_returns_output() {
        let exec = ThreadExecutor::new();
        let task = exec.spawn(future::ready("out"));
        assert_eq!(exec.run_until(task), Ok("out"));
    }

    #[test]
    fn test_submit_from_other_thread() {
        let exec = ThreadExecutor::new();
        let handle = exec.handle();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let sender = std::thread::spawn(move || {
            handle.submit(future::ready(()).map(move |()| {
                seen.fetch_add(1, AtomicOrdering::SeqCst);
            }));
        });
        sender.join().unwrap();
        exec.run();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_ambient_spawn_resolves_current_runner() {
        let exec = ThreadExecutor::new();
        let out = exec.run_until(future::poll_fn(|cx| {
            let task = cx.spawn(future::ready(13)).expect("runner installed");
            Poll::Ready(task)
        }));
        assert_eq!(exec.run_until(out), Ok(13));
    }

    #[test]
    fn test_no_runner_outside_loop() {
        assert!(current().is_none());
        let waker = Waker::noop();
        let cx = Context::new(&waker);
        assert_eq!(
            cx.submit(future::ready(())).unwrap_err(),
            SubmitError::NoRunner
        );
    }

    #[test]
    fn test_handle_rejects_after_shutdown() {
        let exec = ThreadExecutor::new();
        let handle = exec.handle();
        drop(exec);
        assert_eq!(
            handle.try_submit(Box::new(future::ready(()))),
            Err(SubmitError::Shutdown)
        );
    }
}
