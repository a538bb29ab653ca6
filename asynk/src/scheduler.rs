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

//! The driver: an intrusive list of active tasks plus the MPSC ready
//! queue. One thread polls; signals arrive from anywhere.

use crate::{
    context::Context,
    future::Future,
    poll::Poll,
    stream::Stream,
    task::{self, task_from_queue_node, SchedShared, TaskNode, TaskRef},
};
use asynk_infra::{
    backoff::Backoff,
    queue::{Pop, PopRef},
    shared::{Shared, SharedList},
};
use core::sync::atomic::Ordering;
use log::trace;

const DEFAULT_NODE_CACHE: usize = 64;

/// Drives a homogeneous set of futures and yields their outputs as a
/// stream: `Ready(Some(v))` per completion, `Ready(None)` once no task
/// remains, `Pending` while everything is blocked.
///
/// Polling is single-threaded; wake-ups may come from any thread.
pub struct Scheduler<F: Future + Send + 'static> {
    shared: Shared<SchedShared<F>>,
    active: SharedList<TaskNode<F>, task::OffsetOfActive<F>>,
    cache: Vec<TaskRef<F>>,
    cache_cap: usize,
}

impl<F: Future + Send + 'static> Scheduler<F> {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_NODE_CACHE)
    }

    /// `cache_cap` bounds the node reuse cache; nodes beyond it are
    /// destroyed on release.
    pub fn with_cache_capacity(cache_cap: usize) -> Self {
        Self {
            shared: SchedShared::new(),
            active: SharedList::new(),
            cache: Vec::new(),
            cache_cap,
        }
    }

    pub(crate) fn shared(&self) -> &Shared<SchedShared<F>> {
        &self.shared
    }

    /// The number of tasks whose futures have not completed.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Wraps `future` in a task node (reusing a cached node when one
    /// is available) and schedules its first poll. The future is not
    /// polled before the next driver tick.
    pub fn submit(&mut self, future: F) {
        let task = match self.cache.pop() {
            Some(task) => task,
            None => TaskNode::new(self.shared.clone()),
        };
        task.bind(future);
        let ok = self.active.push_back(task.clone());
        debug_assert!(ok);
        TaskNode::enqueue(task);
        trace!("scheduler: submitted, {} active", self.active.len());
    }

    fn release(&mut self, task: TaskRef<F>) {
        TaskNode::release(&task);
        if self.cache.len() < self.cache_cap {
            self.cache.push(task);
        } else {
            TaskNode::destroy(&task);
        }
    }

    fn drain_incoming(&mut self) {
        let backoff = Backoff::new();
        loop {
            match unsafe { self.shared.incoming.pop() } {
                Pop::Data(future) => {
                    self.submit(future);
                    backoff.reset();
                }
                Pop::Empty => return,
                Pop::Inconsistent => {
                    if backoff.is_completed() {
                        // The producer signals the driver once its push
                        // completes; take that wake-up instead of
                        // spinning on.
                        return;
                    }
                    backoff.snooze();
                }
            }
        }
    }

    /// One driver tick. Registers `cx`'s waker for external signals,
    /// folds in cross-thread submissions, then drains the ready queue
    /// until a task completes or everything blocks.
    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<F::Output>> {
        self.shared.driver.register(cx.waker());
        self.drain_incoming();
        let backoff = Backoff::new();
        loop {
            let node = match unsafe { self.shared.ready.pop() } {
                PopRef::Empty => break,
                PopRef::Inconsistent => {
                    if backoff.is_completed() {
                        break;
                    }
                    backoff.snooze();
                    continue;
                }
                PopRef::Node(node) => node,
            };
            backoff.reset();
            let task: TaskRef<F> = unsafe { task_from_queue_node(node) };
            let Some(mut future) = task.claim() else {
                // A release raced with a late dequeue; nothing to run.
                continue;
            };
            self.active.detach(&task);
            // From here a signal() during the poll re-enqueues.
            task.queue_node.clear_enqueued();
            task.poll_entry();
            let waker = task.self_waker();
            let mut task_cx = cx.with_waker(&waker);
            match future.poll(&mut task_cx) {
                Poll::Ready(value) => {
                    task.poll_exit_ready();
                    self.release(task);
                    trace!("scheduler: task complete, {} active", self.active.len());
                    return Poll::Ready(Some(value));
                }
                Poll::Pending => {
                    task.restore(future);
                    let ok = self.active.push_back(task.clone());
                    debug_assert!(ok);
                    let prev = task.poll_exit_pending();
                    if prev.contains(task::NOTIFIED) {
                        // Signalled mid-poll: run again this tick.
                        TaskNode::enqueue(task);
                    }
                }
            }
        }
        if self.active.is_empty() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

impl<F: Future + Send + 'static> Default for Scheduler<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Future + Send + 'static> Stream for Scheduler<F> {
    type Item = F::Output;

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Scheduler::poll_next(self, cx)
    }
}

impl<F: Future + Send + 'static> Drop for Scheduler<F> {
    fn drop(&mut self) {
        // Refuse new enqueues, then break the queue→task reference
        // cycle by draining both queues. A signal that won its closed
        // check concurrently can at worst leak its node, never touch
        // freed memory.
        self.shared.closed.store(true, Ordering::Release);
        let backoff = Backoff::new();
        loop {
            match unsafe { self.shared.ready.pop() } {
                PopRef::Node(node) => {
                    let task: TaskRef<F> = unsafe { task_from_queue_node(node) };
                    task.queue_node.clear_enqueued();
                    drop(task);
                    backoff.reset();
                }
                PopRef::Empty => break,
                PopRef::Inconsistent => backoff.snooze(),
            }
        }
        loop {
            match unsafe { self.shared.incoming.pop() } {
                Pop::Data(future) => drop(future),
                Pop::Empty => break,
                Pop::Inconsistent => backoff.snooze(),
            }
        }
        self.active.clear();
        self.cache.clear();
    }
}

impl<F: Future + Send + 'static> std::fmt::Debug for Scheduler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.active.len())
            .field("cached_nodes", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{self, FutureExt};
    use crate::waker::Waker;
    use pretty_assertions::assert_eq;

    type TestFuture = Box<dyn Future<Output = i32> + Send>;

    fn drain(sched: &mut Scheduler<TestFuture>) -> Vec<i32> {
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        let mut out = Vec::new();
        loop {
            match sched.poll_next(&mut cx) {
                Poll::Ready(Some(v)) => out.push(v),
                Poll::Ready(None) => return out,
                Poll::Pending => panic!("Nothing can wake this scheduler again"),
            }
        }
    }

    #[test]
    fn test_completion_order_is_fifo() {
        let mut sched = Scheduler::new();
        for i in 0..4 {
            sched.submit(future::ready(i).boxed());
        }
        assert_eq!(sched.len(), 4);
        assert_eq!(drain(&mut sched), vec![0, 1, 2, 3]);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_rescheduled_task_completes() {
        let mut sched = Scheduler::new();
        sched.submit(future::yield_now().then(|()| future::ready(7)).boxed());
        sched.submit(future::ready(1).boxed());
        // The yielding task re-signals itself mid-tick and still
        // finishes without external help.
        assert_eq!(drain(&mut sched), vec![1, 7]);
    }

    #[test]
    fn test_empty_scheduler_is_done() {
        let mut sched: Scheduler<TestFuture> = Scheduler::new();
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        assert_eq!(sched.poll_next(&mut cx), Poll::Ready(None));
    }

    #[test]
    fn test_blocked_task_leaves_pending() {
        let mut sched = Scheduler::new();
        sched.submit(future::pending::<i32>().boxed());
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        assert_eq!(sched.poll_next(&mut cx), Poll::Pending);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn test_node_reuse_cache() {
        let mut sched = Scheduler::new();
        sched.submit(future::ready(1).boxed());
        assert_eq!(drain(&mut sched), vec![1]);
        assert_eq!(sched.cache.len(), 1);
        sched.submit(future::ready(2).boxed());
        // The released node was recycled instead of a fresh allocation.
        assert_eq!(sched.cache.len(), 0);
        assert_eq!(drain(&mut sched), vec![2]);
        assert_eq!(sched.cache.len(), 1);
    }

    #[test]
    fn test_zero_cache_destroys_nodes() {
        let mut sched = Scheduler::with_cache_capacity(0);
        sched.submit(future::ready(5).boxed());
        assert_eq!(drain(&mut sched), vec![5]);
        assert_eq!(sched.cache.len(), 0);
    }

    #[test]
    fn test_cross_thread_submission_queue() {
        let mut sched: Scheduler<TestFuture> = Scheduler::new();
        sched.shared().incoming.push(future::ready(9).boxed());
        sched.shared().driver.signal();
        assert_eq!(drain(&mut sched), vec![9]);
    }

    #[test]
    fn test_ready_queue_only_stub_after_drain() {
        let mut sched = Scheduler::new();
        for i in 0..3 {
            sched.submit(future::ready(i).boxed());
        }
        let _ = drain(&mut sched);
        assert!(sched.shared().ready.is_empty());
        assert!(sched.active.is_empty());
    }
}
