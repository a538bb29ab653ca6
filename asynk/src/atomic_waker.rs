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

//! A single-slot waker registration cell. One side registers (the
//! polling task), any number of threads signal; the state machine
//! guarantees a signal concurrent with a registration is never lost.

use crate::waker::Waker;
use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU8, Ordering},
};

const IDLE: u8 = 0;
const REGISTERING: u8 = 0b01;
const NOTIFYING: u8 = 0b10;

pub struct AtomicWaker {
    state: AtomicU8,
    slot: UnsafeCell<Option<Waker>>,
}

// The slot is only written while the REGISTERING or NOTIFYING bit is
// exclusively held.
unsafe impl Send for AtomicWaker {}
unsafe impl Sync for AtomicWaker {}

impl AtomicWaker {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            slot: UnsafeCell::new(None),
        }
    }

    /// Installs `waker` as the slot's waker. Not thread-safe against
    /// itself: only the single polling owner may register, and a
    /// concurrent `register` traps. If a `signal` lands mid-flight the
    /// fresh waker is signalled before this returns, so no wake-up is
    /// lost.
    pub fn register(&self, waker: &Waker) {
        match self
            .state
            .compare_exchange(IDLE, REGISTERING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                unsafe { *self.slot.get() = Some(waker.clone()) };
                // Publish the slot. Failure means a signal arrived
                // while we held the bit; deliver it ourselves.
                if let Err(actual) = self.state.compare_exchange(
                    REGISTERING,
                    IDLE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    debug_assert_eq!(actual, REGISTERING | NOTIFYING);
                    let pending = unsafe { (*self.slot.get()).take() };
                    self.state.store(IDLE, Ordering::Release);
                    if let Some(w) = pending {
                        w.signal();
                    }
                }
            }
            Err(NOTIFYING) => {
                // A signal is in flight with nobody registered; it
                // will restore IDLE itself. Hand the notification to
                // the new waker directly.
                waker.signal();
            }
            Err(state) => {
                panic!(
                    "Concurrent register on AtomicWaker (state {:#04b})",
                    state
                );
            }
        }
    }

    /// Wakes the most recently registered waker. Safe from any thread;
    /// concurrent signals collapse into at least one delivery.
    pub fn signal(&self) {
        match self.state.fetch_or(NOTIFYING, Ordering::AcqRel) {
            IDLE => {
                let waker = unsafe { (*self.slot.get()).take() };
                self.state.fetch_and(!NOTIFYING, Ordering::Release);
                if let Some(w) = waker {
                    w.signal();
                }
            }
            state => {
                // Either a registrar will observe NOTIFYING on its way
                // out, or another signal already owns the slot.
                debug_assert!(
                    state == REGISTERING || state == REGISTERING | NOTIFYING || state == NOTIFYING
                );
            }
        }
    }

    /// Removes and returns the registered waker without signalling it.
    pub fn take(&self) -> Option<Waker> {
        match self.state.fetch_or(NOTIFYING, Ordering::AcqRel) {
            IDLE => {
                let waker = unsafe { (*self.slot.get()).take() };
                self.state.fetch_and(!NOTIFYING, Ordering::Release);
                waker
            }
            _ => None,
        }
    }
}

impl Default for AtomicWaker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AtomicWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicWaker").finish_non_exhaustive()
    }
}
