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

//! The scheduler's task node: a refcounted record wrapping a top-level
//! future, with the bitset state machine that arbitrates between the
//! driver thread and `signal()` calls from anywhere.

use crate::{atomic_waker::AtomicWaker, future::Future, waker::{Wake, Waker}};
use asynk_infra::{
    intrusive::Adapter,
    list::ListHead,
    queue::{MpscNode, MpscQueueCore, UnboundedQueue},
    shared::Shared,
};
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    mem,
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};

pub(crate) const NOTIFIED: u8 = 0b0000_0001;
pub(crate) const RUNNING: u8 = 0b0000_0010;
pub(crate) const COMPLETE: u8 = 0b0000_0100;
pub(crate) const RELEASED: u8 = 0b0000_1000;
pub(crate) const DESTROYED: u8 = 0b0001_0000;

/// A snapshot of a task's state word. The zero word is idle; at most
/// one of NOTIFIED-handling and RUNNING is in flight at a time, and
/// COMPLETE/RELEASED/DESTROYED are gained monotonically.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TaskState(pub u8);

impl TaskState {
    #[inline]
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    #[inline]
    pub fn is_idle(self) -> bool {
        self.0 == 0
    }
}

/// State shared between a scheduler's driver side and every handle
/// that can signal its tasks: the intrusive ready queue, the
/// cross-thread submission queue, and the waker that rouses the
/// driver loop.
pub(crate) struct SchedShared<F: Future + Send + 'static> {
    pub(crate) ready: MpscQueueCore,
    pub(crate) incoming: UnboundedQueue<F>,
    pub(crate) driver: AtomicWaker,
    pub(crate) closed: AtomicBool,
}

impl<F: Future + Send + 'static> SchedShared<F> {
    pub(crate) fn new() -> Shared<Self> {
        Shared::new(Self {
            ready: MpscQueueCore::new(),
            incoming: UnboundedQueue::new(),
            driver: AtomicWaker::new(),
            closed: AtomicBool::new(false),
        })
    }
}

pub(crate) type TaskRef<F> = Shared<TaskNode<F>>;

pub(crate) struct OffsetOfActive<F>(PhantomData<F>);

impl<F: Future + Send + 'static> Adapter for OffsetOfActive<F> {
    #[inline]
    fn offset() -> usize {
        mem::offset_of!(TaskNode<F>, active_link)
    }
}

struct OffsetOfQueue<F>(PhantomData<F>);

impl<F: Future + Send + 'static> Adapter for OffsetOfQueue<F> {
    #[inline]
    fn offset() -> usize {
        mem::offset_of!(TaskNode<F>, queue_node)
    }
}

pub(crate) struct TaskNode<F: Future + Send + 'static> {
    state: AtomicU8,
    /// The claimable future slot; driver thread only, and only while
    /// RUNNING arbitration allows.
    future: UnsafeCell<Option<F>>,
    /// Cached self-waker, written once at node creation.
    waker: UnsafeCell<Option<Waker>>,
    /// Link for the scheduler's active list; driver thread only.
    pub(crate) active_link: ListHead<TaskNode<F>, OffsetOfActive<F>>,
    /// Link for the ready queue; any thread via `signal`.
    pub(crate) queue_node: MpscNode,
    shared: Shared<SchedShared<F>>,
}

// The waker half (state word + queue node) is touched from any thread;
// the future slot and the active link belong to the driver thread
// while the state machine says so.
unsafe impl<F: Future + Send + 'static> Send for TaskNode<F> {}
unsafe impl<F: Future + Send + 'static> Sync for TaskNode<F> {}

struct TaskWake<F: Future + Send + 'static> {
    task: TaskRef<F>,
}

impl<F: Future + Send + 'static> Wake for TaskWake<F> {
    fn signal(&self) {
        TaskNode::signal(&self.task);
    }
}

impl<F: Future + Send + 'static> TaskNode<F> {
    /// Creates an empty (released) node bound to `shared`. `bind` arms
    /// it with a future.
    pub(crate) fn new(shared: Shared<SchedShared<F>>) -> TaskRef<F> {
        let task = Shared::new(TaskNode {
            state: AtomicU8::new(COMPLETE | RELEASED),
            future: UnsafeCell::new(None),
            waker: UnsafeCell::new(None),
            active_link: ListHead::new(),
            queue_node: MpscNode::new(),
            shared,
        });
        let waker = Waker::from_wake(TaskWake { task: task.clone() });
        unsafe { *task.waker.get() = Some(waker) };
        task
    }

    /// Installs a fresh future and arms the node for its first poll.
    /// Driver thread only; the node must be released (or new).
    pub(crate) fn bind(&self, future: F) {
        debug_assert!(TaskState(self.state.load(Ordering::Relaxed)).contains(RELEASED));
        unsafe { *self.future.get() = Some(future) };
        self.queue_node.clear_enqueued();
        self.state.store(NOTIFIED, Ordering::Release);
    }

    pub(crate) fn self_waker(&self) -> Waker {
        unsafe { (*self.waker.get()).as_ref() }
            .expect("Task node has no waker")
            .clone()
    }

    pub(crate) fn snapshot(&self) -> TaskState {
        TaskState(self.state.load(Ordering::Acquire))
    }

    /// The waker entry point. Enqueues the node exactly when the
    /// previous state word was idle; every other state already has a
    /// scheduled poll that will observe NOTIFIED.
    pub(crate) fn signal(task: &TaskRef<F>) {
        let prev = TaskState(task.state.fetch_or(NOTIFIED, Ordering::AcqRel));
        if !prev.is_idle() {
            return;
        }
        if task.shared.closed.load(Ordering::Acquire) {
            return;
        }
        Self::enqueue(task.clone());
        task.shared.driver.signal();
    }

    /// Transfers one count into the ready queue along with the node.
    pub(crate) fn enqueue(task: TaskRef<F>) {
        let shared = task.shared.clone();
        let ptr = Shared::into_data_ptr(task) as *mut TaskNode<F>;
        let node = unsafe { OffsetOfQueue::<F>::link_of(NonNull::new_unchecked(ptr)) };
        if !shared.ready.push(node) {
            // The enqueued flag blocked us: someone already queued it.
            debug_assert!(false, "Task enqueued twice");
            drop(unsafe { Shared::from_data_ptr(ptr) });
        }
    }

    pub(crate) fn claim(&self) -> Option<F> {
        unsafe { (*self.future.get()).take() }
    }

    pub(crate) fn restore(&self, future: F) {
        let slot = unsafe { &mut *self.future.get() };
        debug_assert!(slot.is_none());
        *slot = Some(future);
    }

    pub(crate) fn poll_entry(&self) {
        let prev = TaskState(self.state.fetch_xor(NOTIFIED | RUNNING, Ordering::AcqRel));
        assert!(prev.contains(NOTIFIED), "Task polled without notification");
        assert!(!prev.contains(RUNNING), "Task polled concurrently");
    }

    pub(crate) fn poll_exit_ready(&self) {
        let prev = TaskState(self.state.fetch_xor(RUNNING | COMPLETE, Ordering::AcqRel));
        debug_assert!(prev.contains(RUNNING));
        debug_assert!(!prev.contains(COMPLETE));
    }

    /// Returns the previous state; a NOTIFIED bit in it means a signal
    /// landed mid-poll and the caller must reschedule the node.
    pub(crate) fn poll_exit_pending(&self) -> TaskState {
        let prev = TaskState(self.state.fetch_xor(RUNNING, Ordering::AcqRel));
        debug_assert!(prev.contains(RUNNING));
        prev
    }

    /// Retires the node after completion: the future slot is already
    /// empty, and the enqueued mark blocks stray ready-queue pushes
    /// while the node sits in the reuse cache.
    pub(crate) fn release(task: &TaskRef<F>) {
        debug_assert!(unsafe { (*task.future.get()).is_none() });
        task.queue_node.mark_enqueued();
        let prev = TaskState(task.state.fetch_or(RELEASED, Ordering::AcqRel));
        debug_assert!(prev.contains(COMPLETE));
    }

    /// Marks a node that will never be reused.
    pub(crate) fn destroy(task: &TaskRef<F>) {
        task.state.fetch_or(DESTROYED, Ordering::AcqRel);
    }
}

/// Recovers the owning task from a popped ready-queue node, adopting
/// the count [`TaskNode::enqueue`] stored there.
///
/// # Safety
///
/// `node` must be the `queue_node` of a live `TaskNode<F>` popped from
/// the ready queue.
pub(crate) unsafe fn task_from_queue_node<F: Future + Send + 'static>(
    node: NonNull<MpscNode>,
) -> TaskRef<F> {
    let owner: NonNull<TaskNode<F>> = OffsetOfQueue::<F>::owner_of(node);
    Shared::from_data_ptr(owner.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future;
    use asynk_infra::queue::PopRef;
    use pretty_assertions::assert_eq;

    type TestFuture = future::Pending<()>;

    fn fixture() -> (Shared<SchedShared<TestFuture>>, TaskRef<TestFuture>) {
        let shared = SchedShared::new();
        let task = TaskNode::new(shared.clone());
        task.bind(future::pending());
        (shared, task)
    }

    fn ready_len(shared: &SchedShared<TestFuture>) -> usize {
        let mut n = 0;
        loop {
            match unsafe { shared.ready.pop() } {
                PopRef::Node(q) => {
                    let t: TaskRef<TestFuture> = unsafe { task_from_queue_node(q) };
                    t.queue_node.clear_enqueued();
                    drop(t);
                    n += 1;
                }
                PopRef::Empty => return n,
                PopRef::Inconsistent => std::thread::yield_now(),
            }
        }
    }

    #[test]
    fn test_bind_arms_notified() {
        let (_shared, task) = fixture();
        assert_eq!(task.snapshot(), TaskState(NOTIFIED));
    }

    #[test]
    fn test_signal_enqueues_once_from_idle() {
        let (shared, task) = fixture();
        // Simulate the driver consuming the bind notification.
        task.poll_entry();
        let prev = task.poll_exit_pending();
        assert!(!prev.contains(NOTIFIED));
        assert!(task.snapshot().is_idle());

        let waker = task.self_waker();
        waker.signal();
        waker.signal();
        waker.signal();
        // Repeated signals collapse into one enqueue.
        assert_eq!(ready_len(&shared), 1);
        assert_eq!(task.snapshot(), TaskState(NOTIFIED));
    }

    #[test]
    fn test_signal_during_poll_defers_to_exit() {
        let (shared, task) = fixture();
        task.poll_entry();
        assert_eq!(task.snapshot(), TaskState(RUNNING));
        TaskNode::signal(&task);
        // Mid-poll signals never enqueue directly.
        assert_eq!(ready_len(&shared), 0);
        let prev = task.poll_exit_pending();
        assert!(prev.contains(NOTIFIED));
        // The driver reschedules on behalf of the mid-poll signal.
        TaskNode::enqueue(task.clone());
        assert_eq!(ready_len(&shared), 1);
    }

    #[test]
    fn test_complete_release_blocks_signals() {
        let (shared, task) = fixture();
        task.poll_entry();
        let f = task.claim();
        assert!(f.is_some());
        drop(f);
        task.poll_exit_ready();
        TaskNode::release(&task);
        assert!(task.snapshot().contains(COMPLETE));
        assert!(task.snapshot().contains(RELEASED));
        TaskNode::signal(&task);
        assert_eq!(ready_len(&shared), 0);
    }

    #[test]
    #[should_panic(expected = "without notification")]
    fn test_poll_entry_without_notify_traps() {
        let (_shared, task) = fixture();
        task.poll_entry();
        let _ = task.poll_exit_pending();
        task.poll_entry();
    }

    #[test]
    fn test_rebind_after_release() {
        let (shared, task) = fixture();
        task.poll_entry();
        drop(task.claim());
        task.poll_exit_ready();
        TaskNode::release(&task);
        task.bind(future::pending());
        assert_eq!(task.snapshot(), TaskState(NOTIFIED));
        TaskNode::enqueue(task.clone());
        assert_eq!(ready_len(&shared), 1);
    }
}
