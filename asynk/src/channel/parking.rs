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

//! Sender-side parking policies. The receiver side always parks in a
//! single [`AtomicWaker`]; senders park here when the buffer is full
//! or a flush is waiting.

use crate::{atomic_waker::AtomicWaker, waker::Waker};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

pub trait Park: Send + Sync + Default {
    fn park(&self, waker: &Waker);
    fn unpark_one(&self);
    fn unpark_all(&self);
}

/// Parking for a single sender: one registration slot.
#[derive(Default, Debug)]
pub struct Single {
    slot: AtomicWaker,
}

impl Park for Single {
    fn park(&self, waker: &Waker) {
        self.slot.register(waker);
    }

    fn unpark_one(&self) {
        self.slot.signal();
    }

    fn unpark_all(&self) {
        self.slot.signal();
    }
}

/// Parking for any number of senders: a wait list in arrival order.
/// Duplicate parks from a sender that re-polls only cost a spurious
/// wake-up.
#[derive(Default)]
pub struct Multi {
    parked: Mutex<VecDeque<Waker>>,
}

impl Park for Multi {
    fn park(&self, waker: &Waker) {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(waker.clone());
    }

    fn unpark_one(&self) {
        let waker = self
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(w) = waker {
            w.signal();
        }
    }

    fn unpark_all(&self) {
        let wakers: Vec<Waker> = self
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for w in wakers {
            w.signal();
        }
    }
}

impl std::fmt::Debug for Multi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multi").finish_non_exhaustive()
    }
}

/// Marker for parking policies that allow the sender half to be
/// cloned.
pub trait SharedPark: Park {}

impl SharedPark for Multi {}
