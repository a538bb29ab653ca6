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

//! Buffer policies a channel composes with a parking policy. All of
//! them assume the channel's single-consumer contract: `try_pop` is
//! only called by the receiver half.

use asynk_infra::{
    backoff::Backoff,
    queue::{BoundedQueue, Pop, UnboundedQueue},
};
use core::{
    cell::UnsafeCell,
    ptr,
    sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering},
};

pub trait Buffer<T>: Send + Sync {
    /// Enqueues the item or hands it back when no space is available.
    fn try_push(&self, value: T) -> Result<(), T>;

    /// Dequeues the oldest available item. Receiver half only.
    fn try_pop(&self) -> Option<T>;

    fn is_empty(&self) -> bool;

    fn is_full(&self) -> bool;

    /// `None` means sends never block on space.
    fn capacity(&self) -> Option<usize>;
}

/// The bounded flavor: a sequence-counter ring.
pub struct Ring<T>(BoundedQueue<T>);

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        Self(BoundedQueue::new(capacity))
    }
}

impl<T: Send> Buffer<T> for Ring<T> {
    fn try_push(&self, value: T) -> Result<(), T> {
        self.0.try_push(value)
    }

    fn try_pop(&self) -> Option<T> {
        self.0.try_pop()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn is_full(&self) -> bool {
        self.0.is_full()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.0.capacity())
    }
}

impl<T> std::fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring").field("len", &self.0.len()).finish()
    }
}

/// The unbounded flavor: a node-linked queue plus a length counter so
/// either half can ask about emptiness.
pub struct List<T> {
    queue: UnboundedQueue<T>,
    len: AtomicUsize,
}

impl<T> List<T> {
    pub fn new() -> Self {
        Self {
            queue: UnboundedQueue::new(),
            len: AtomicUsize::new(0),
        }
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Buffer<T> for List<T> {
    fn try_push(&self, value: T) -> Result<(), T> {
        self.queue.push(value);
        self.len.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn try_pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            // Single consumer per the channel contract.
            match unsafe { self.queue.pop() } {
                Pop::Data(value) => {
                    self.len.fetch_sub(1, Ordering::AcqRel);
                    return Some(value);
                }
                Pop::Empty => return None,
                // A producer is between its two stores; the wait is a
                // couple of instructions.
                Pop::Inconsistent => backoff.spin(),
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }

    fn is_full(&self) -> bool {
        false
    }

    fn capacity(&self) -> Option<usize> {
        None
    }
}

impl<T> std::fmt::Debug for List<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List")
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

const SLOT_EMPTY: u8 = 0;
const SLOT_BUSY: u8 = 1;
const SLOT_FULL: u8 = 2;

/// The unbuffered flavor: a single hand-off cell. A send only
/// succeeds into an empty cell, so at most one item is in flight.
pub struct SlotBuffer<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

unsafe impl<T: Send> Send for SlotBuffer<T> {}
unsafe impl<T: Send> Sync for SlotBuffer<T> {}

impl<T> SlotBuffer<T> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SLOT_EMPTY),
            value: UnsafeCell::new(None),
        }
    }
}

impl<T> Default for SlotBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Buffer<T> for SlotBuffer<T> {
    fn try_push(&self, value: T) -> Result<(), T> {
        match self.state.compare_exchange(
            SLOT_EMPTY,
            SLOT_BUSY,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                unsafe { *self.value.get() = Some(value) };
                self.state.store(SLOT_FULL, Ordering::Release);
                Ok(())
            }
            // BUSY counts as occupied; the racing side finishes fast.
            Err(_) => Err(value),
        }
    }

    fn try_pop(&self) -> Option<T> {
        match self.state.compare_exchange(
            SLOT_FULL,
            SLOT_BUSY,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                let value = unsafe { (*self.value.get()).take() };
                debug_assert!(value.is_some());
                self.state.store(SLOT_EMPTY, Ordering::Release);
                value
            }
            Err(_) => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLOT_EMPTY
    }

    fn is_full(&self) -> bool {
        self.state.load(Ordering::Acquire) != SLOT_EMPTY
    }

    fn capacity(&self) -> Option<usize> {
        Some(1)
    }
}

impl<T> std::fmt::Debug for SlotBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotBuffer").finish_non_exhaustive()
    }
}

/// The passthrough flavor: a conflating cell. Sends never block; each
/// send replaces whatever the receiver has not taken yet, and the
/// receiver always observes the most recent item.
pub struct Latest<T> {
    item: AtomicPtr<T>,
}

unsafe impl<T: Send> Send for Latest<T> {}
unsafe impl<T: Send> Sync for Latest<T> {}

impl<T> Latest<T> {
    pub fn new() -> Self {
        Self {
            item: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Buffer<T> for Latest<T> {
    fn try_push(&self, value: T) -> Result<(), T> {
        let fresh = Box::into_raw(Box::new(value));
        let stale = self.item.swap(fresh, Ordering::AcqRel);
        if !stale.is_null() {
            drop(unsafe { Box::from_raw(stale) });
        }
        Ok(())
    }

    fn try_pop(&self) -> Option<T> {
        let taken = self.item.swap(ptr::null_mut(), Ordering::AcqRel);
        if taken.is_null() {
            None
        } else {
            Some(*unsafe { Box::from_raw(taken) })
        }
    }

    fn is_empty(&self) -> bool {
        self.item.load(Ordering::Acquire).is_null()
    }

    fn is_full(&self) -> bool {
        false
    }

    fn capacity(&self) -> Option<usize> {
        None
    }
}

impl<T> Drop for Latest<T> {
    fn drop(&mut self) {
        let stale = self.item.swap(ptr::null_mut(), Ordering::AcqRel);
        if !stale.is_null() {
            drop(unsafe { Box::from_raw(stale) });
        }
    }
}

impl<T: Send> std::fmt::Debug for Latest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latest")
            .field("occupied", &!self.is_empty())
            .finish()
    }
}
