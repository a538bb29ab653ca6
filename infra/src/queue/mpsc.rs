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

//! The intrusive flavor of the unbounded MPSC queue: nodes are
//! embedded in their owners (no allocation per enqueue), the stub node
//! is owned by the queue itself and never handed out. This is the
//! substrate of the scheduler's ready queue; the typed layer above it
//! is responsible for keeping node owners alive while enqueued.

use core::{
    cell::Cell,
    ptr::{self, NonNull},
    sync::atomic::{AtomicBool, AtomicPtr, Ordering},
};

/// The link embedded in each enqueueable owner: an atomically
/// swingable `next` pointer plus the "currently enqueued" flag.
#[derive(Debug)]
pub struct MpscNode {
    next: AtomicPtr<MpscNode>,
    enqueued: AtomicBool,
}

impl MpscNode {
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            enqueued: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_enqueued(&self) -> bool {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Marks the node enqueued; returns the previous value. Used both
    /// by the queue and by owners that want to block further enqueues
    /// (e.g. nodes parked on a reuse cache).
    #[inline]
    pub fn mark_enqueued(&self) -> bool {
        self.enqueued.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn clear_enqueued(&self) {
        self.enqueued.store(false, Ordering::Release);
    }
}

impl Default for MpscNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PopRef {
    Node(NonNull<MpscNode>),
    Empty,
    /// A producer is between its two stores; back off and retry.
    Inconsistent,
}

pub struct MpscQueueCore {
    tail: AtomicPtr<MpscNode>,
    head: Cell<*mut MpscNode>,
    stub: Box<MpscNode>,
}

// `tail` is touched from any thread; `head` and the stub rotation
// belong to the single consumer.
unsafe impl Send for MpscQueueCore {}
unsafe impl Sync for MpscQueueCore {}

impl MpscQueueCore {
    pub fn new() -> Self {
        let stub = Box::new(MpscNode::new());
        let stub_ptr = &*stub as *const MpscNode as *mut MpscNode;
        Self {
            tail: AtomicPtr::new(stub_ptr),
            head: Cell::new(stub_ptr),
            stub,
        }
    }

    #[inline]
    fn stub_ptr(&self) -> *mut MpscNode {
        &*self.stub as *const MpscNode as *mut MpscNode
    }

    fn push_raw(&self, node: *mut MpscNode) {
        unsafe { (*node).next.store(ptr::null_mut(), Ordering::Relaxed) };
        let prev = self.tail.swap(node, Ordering::AcqRel);
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }

    /// Enqueues `node`. Returns false (and does nothing) if the node
    /// is already enqueued. Safe from any thread as long as the node
    /// outlives its queue membership.
    pub fn push(&self, node: NonNull<MpscNode>) -> bool {
        if unsafe { node.as_ref() }.mark_enqueued() {
            return false;
        }
        self.push_raw(node.as_ptr());
        true
    }

    /// Dequeues the oldest node. The returned node still has its
    /// `enqueued` flag set; the consumer clears it once the node may
    /// be enqueued again.
    ///
    /// # Safety
    ///
    /// Only one thread may consume at a time.
    pub unsafe fn pop(&self) -> PopRef {
        let mut head = self.head.get();
        let mut next = (*head).next.load(Ordering::Acquire);
        if head == self.stub_ptr() {
            if next.is_null() {
                if self.tail.load(Ordering::Acquire) == head {
                    return PopRef::Empty;
                }
                return PopRef::Inconsistent;
            }
            self.head.set(next);
            head = next;
            next = (*head).next.load(Ordering::Acquire);
        }
        if !next.is_null() {
            self.head.set(next);
            return PopRef::Node(NonNull::new_unchecked(head));
        }
        let tail = self.tail.load(Ordering::Acquire);
        if tail != head {
            return PopRef::Inconsistent;
        }
        // Singleton: re-enqueue the stub behind it so the queue always
        // keeps at least one node.
        self.push_raw(self.stub_ptr());
        next = (*head).next.load(Ordering::Acquire);
        if !next.is_null() {
            self.head.set(next);
            return PopRef::Node(NonNull::new_unchecked(head));
        }
        PopRef::Inconsistent
    }

    /// Whether the queue currently holds nothing but the stub. Only
    /// meaningful on the consumer thread while producers are quiet.
    pub fn is_empty(&self) -> bool {
        let head = self.head.get();
        head == self.stub_ptr() && self.tail.load(Ordering::Acquire) == head
    }
}

impl Default for MpscQueueCore {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MpscQueueCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MpscQueueCore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn node_box() -> Box<MpscNode> {
        Box::new(MpscNode::new())
    }

    #[test]
    fn test_push_pop_order() {
        let q = MpscQueueCore::new();
        assert!(q.is_empty());
        let nodes: Vec<Box<MpscNode>> = (0..4).map(|_| node_box()).collect();
        for n in nodes.iter() {
            assert!(q.push(NonNull::from(&**n)));
        }
        assert!(!q.is_empty());
        for n in nodes.iter() {
            match unsafe { q.pop() } {
                PopRef::Node(got) => {
                    assert_eq!(got.as_ptr(), &**n as *const MpscNode as *mut MpscNode);
                    unsafe { got.as_ref() }.clear_enqueued();
                }
                other => panic!("Expected a node, got {:?}", other),
            }
        }
        assert_eq!(unsafe { q.pop() }, PopRef::Empty);
        assert!(q.is_empty());
    }

    #[test]
    fn test_double_enqueue_blocked() {
        let q = MpscQueueCore::new();
        let n = node_box();
        assert!(q.push(NonNull::from(&*n)));
        assert!(!q.push(NonNull::from(&*n)));
        match unsafe { q.pop() } {
            PopRef::Node(got) => {
                // Still marked until the consumer clears it.
                assert!(unsafe { got.as_ref() }.is_enqueued());
                unsafe { got.as_ref() }.clear_enqueued();
            }
            other => panic!("Expected a node, got {:?}", other),
        }
        assert!(q.push(NonNull::from(&*n)));
        let _ = unsafe { q.pop() };
    }

    struct SendPtr(*mut MpscNode);
    unsafe impl Send for SendPtr {}

    #[test]
    fn test_concurrent_producers() {
        let q = Arc::new(MpscQueueCore::new());
        let producers = 8usize;
        let per_producer = 2048usize;
        let mut all_nodes = Vec::new();
        let mut vt = Vec::new();
        for _ in 0..producers {
            let nodes: Vec<Box<MpscNode>> = (0..per_producer).map(|_| node_box()).collect();
            let ptrs: Vec<SendPtr> = nodes
                .iter()
                .map(|n| SendPtr(&**n as *const MpscNode as *mut MpscNode))
                .collect();
            all_nodes.push(nodes);
            let q = q.clone();
            vt.push(thread::spawn(move || {
                for p in ptrs {
                    assert!(q.push(unsafe { NonNull::new_unchecked(p.0) }));
                }
            }));
        }
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut popped = 0usize;
                let backoff = Backoff::new();
                while popped < producers * per_producer {
                    match unsafe { q.pop() } {
                        PopRef::Node(n) => {
                            unsafe { n.as_ref() }.clear_enqueued();
                            popped += 1;
                            backoff.reset();
                        }
                        PopRef::Empty | PopRef::Inconsistent => backoff.snooze(),
                    }
                }
                popped
            })
        };
        for t in vt {
            t.join().unwrap();
        }
        assert_eq!(consumer.join().unwrap(), producers * per_producer);
        assert!(q.is_empty());
    }
}
