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

//! A bounded MPMC ring following the sequence-counter protocol: slot
//! `i` carries a counter `seq`; the slot is writable for producer
//! position `h` when `seq == h` and readable for consumer position `t`
//! when `seq == t + 1`. Producers and consumers claim positions by
//! CAS; single-producer/single-consumer callers may elide their CAS
//! through the `_unsync` entry points.

use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicUsize, Ordering},
};

struct Slot<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct BoundedQueue<T> {
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: Box<[Slot<T>]>,
}

// Values move through the queue across threads; nothing else is
// shared by reference.
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Bounded queue needs at least one slot");
        let slots = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Instantaneous snapshot; exact only while the queue is quiescent.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        head == tail
    }

    pub fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        head.wrapping_sub(tail) >= self.capacity()
    }

    /// Enqueues `value`, or hands it back when the queue is at
    /// capacity.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head % self.slots.len()];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = (seq as isize).wrapping_sub(head as isize);
            if dif == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.seq.store(head.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => head = current,
                }
            } else if dif < 0 {
                // The slot still carries the previous lap: full.
                return Err(value);
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail % self.slots.len()];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = (seq as isize).wrapping_sub(tail.wrapping_add(1) as isize);
            if dif == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq
                            .store(tail.wrapping_add(self.slots.len()), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => tail = current,
                }
            } else if dif < 0 {
                return None;
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Producer-side push without the CAS, for single-producer
    /// flavors.
    ///
    /// # Safety
    ///
    /// No other push (of either kind) may run concurrently.
    pub unsafe fn push_unsync(&self, value: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let slot = &self.slots[head % self.slots.len()];
        let seq = slot.seq.load(Ordering::Acquire);
        if (seq as isize).wrapping_sub(head as isize) < 0 {
            return Err(value);
        }
        debug_assert_eq!(seq, head);
        (*slot.value.get()).write(value);
        self.head.store(head.wrapping_add(1), Ordering::Relaxed);
        slot.seq.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer-side pop without the CAS, for single-consumer flavors.
    ///
    /// # Safety
    ///
    /// No other pop (of either kind) may run concurrently.
    pub unsafe fn pop_unsync(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[tail % self.slots.len()];
        let seq = slot.seq.load(Ordering::Acquire);
        if (seq as isize).wrapping_sub(tail.wrapping_add(1) as isize) < 0 {
            return None;
        }
        debug_assert_eq!(seq, tail.wrapping_add(1));
        let value = (*slot.value.get()).assume_init_read();
        self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        slot.seq
            .store(tail.wrapping_add(self.slots.len()), Ordering::Release);
        Some(value)
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}

impl<T> core::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
