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

use std::sync::Arc;

/// A wake-up target. `signal` schedules a poll of the associated
/// computation; it must be callable from any thread and tolerate
/// spurious or duplicated calls.
pub trait Wake: Send + Sync {
    fn signal(&self);
}

/// A clonable handle to a [`Wake`] implementation. This is the object
/// leaf futures register with their event source before returning
/// `Pending`.
#[derive(Clone)]
pub struct Waker {
    wake: Arc<dyn Wake>,
}

impl Waker {
    pub fn new(wake: Arc<dyn Wake>) -> Self {
        Self { wake }
    }

    pub fn from_wake(wake: impl Wake + 'static) -> Self {
        Self::new(Arc::new(wake))
    }

    /// Wakes whoever is polling the associated computation. Spurious
    /// wake-ups are legal; polled values must tolerate them.
    #[inline]
    pub fn signal(&self) {
        self.wake.signal();
    }

    /// True when both handles wake the same target.
    pub fn same_target(&self, other: &Waker) -> bool {
        Arc::ptr_eq(&self.wake, &other.wake)
    }

    /// A waker that drops every signal. Handy for driving values whose
    /// progress is checked by polling in a loop.
    pub fn noop() -> Self {
        struct Noop;
        impl Wake for Noop {
            fn signal(&self) {}
        }
        Self::from_wake(Noop)
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").finish_non_exhaustive()
    }
}
