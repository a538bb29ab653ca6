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

//! An unbounded node-linked MPSC queue (the 1024cores two-store push
//! with a permanent stub). Producers are wait-free; the single
//! consumer may observe the queue mid-push and is told so through
//! [`Pop::Inconsistent`] instead of spinning internally.

use core::{
    cell::UnsafeCell,
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: Option<T>,
}

impl<T> Node<T> {
    fn boxed(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Pop<T> {
    Data(T),
    Empty,
    /// A producer has swapped the tail but not yet published its
    /// `next` pointer; retry after backing off.
    Inconsistent,
}

pub struct UnboundedQueue<T> {
    tail: AtomicPtr<Node<T>>,
    head: UnsafeCell<*mut Node<T>>,
}

// Producers only touch `tail`; `head` belongs to the single consumer.
unsafe impl<T: Send> Send for UnboundedQueue<T> {}
unsafe impl<T: Send> Sync for UnboundedQueue<T> {}

impl<T> UnboundedQueue<T> {
    pub fn new() -> Self {
        let stub = Node::boxed(None);
        Self {
            tail: AtomicPtr::new(stub),
            head: UnsafeCell::new(stub),
        }
    }

    /// Enqueues `value`. Safe from any thread.
    pub fn push(&self, value: T) {
        let node = Node::boxed(Some(value));
        let prev = self.tail.swap(node, Ordering::AcqRel);
        // Between the swap above and the store below the queue is
        // momentarily unlinked; the consumer reports Inconsistent.
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }

    /// Dequeues the oldest value.
    ///
    /// # Safety
    ///
    /// Only one thread may consume at a time.
    pub unsafe fn pop(&self) -> Pop<T> {
        let head = *self.head.get();
        let next = (*head).next.load(Ordering::Acquire);
        if !next.is_null() {
            *self.head.get() = next;
            debug_assert!((*head).value.is_none());
            let value = (*next)
                .value
                .take()
                .expect("Queue node lost its value before dequeue");
            drop(Box::from_raw(head));
            return Pop::Data(value);
        }
        if self.tail.load(Ordering::Acquire) == head {
            Pop::Empty
        } else {
            Pop::Inconsistent
        }
    }
}

impl<T> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for UnboundedQueue<T> {
    fn drop(&mut self) {
        let mut cur = unsafe { *self.head.get() };
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
    }
}

impl<T> core::fmt::Debug for UnboundedQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnboundedQueue").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_pop_fifo() {
        let q = UnboundedQueue::new();
        assert_eq!(unsafe { q.pop() }, Pop::<usize>::Empty);
        for i in 0..16 {
            q.push(i);
        }
        for i in 0..16 {
            assert_eq!(unsafe { q.pop() }, Pop::Data(i));
        }
        assert_eq!(unsafe { q.pop() }, Pop::Empty);
    }

    #[test]
    fn test_drop_releases_items() {
        let item = Arc::new(());
        let q = UnboundedQueue::new();
        for _ in 0..5 {
            q.push(item.clone());
        }
        assert_eq!(Arc::strong_count(&item), 6);
        drop(q);
        assert_eq!(Arc::strong_count(&item), 1);
    }

    #[test]
    fn test_mpsc_stress_per_producer_fifo() {
        let q = Arc::new(UnboundedQueue::new());
        let producers = 8usize;
        let per_producer = 4096usize;
        let mut vt = Vec::new();
        for p in 0..producers {
            let q = q.clone();
            vt.push(thread::spawn(move || {
                for i in 0..per_producer {
                    q.push((p, i));
                }
            }));
        }
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut last_seen = vec![None::<usize>; producers];
                let mut total = 0usize;
                let backoff = Backoff::new();
                while total < producers * per_producer {
                    match unsafe { q.pop() } {
                        Pop::Data((p, i)) => {
                            // Per-producer FIFO must hold even though
                            // producers interleave arbitrarily.
                            if let Some(prev) = last_seen[p] {
                                assert!(i > prev);
                            }
                            last_seen[p] = Some(i);
                            total += 1;
                            backoff.reset();
                        }
                        Pop::Empty | Pop::Inconsistent => backoff.snooze(),
                    }
                }
                total
            })
        };
        for t in vt {
            t.join().unwrap();
        }
        assert_eq!(consumer.join().unwrap(), producers * per_producer);
    }
}
