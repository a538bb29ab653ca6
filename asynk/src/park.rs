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

//! Thread-level park/unpark for blocking executors: a counting
//! semaphore doubling as a waker, so signals issued between ticks are
//! never lost.

use crate::waker::Wake;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits += 1;
        self.available.notify_one();
    }

    pub fn acquire(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }
}

/// A waker that releases one parked tick of the owning executor.
pub(crate) struct SemaphoreWake(pub Arc<Semaphore>);

impl Wake for SemaphoreWake {
    fn signal(&self) {
        self.0.post();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_posts_accumulate() {
        let sem = Semaphore::new(0);
        sem.post();
        sem.post();
        sem.acquire();
        sem.acquire();
    }

    #[test]
    fn test_cross_thread_unpark() {
        let sem = Arc::new(Semaphore::new(0));
        let poster = {
            let sem = sem.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                sem.post();
            })
        };
        sem.acquire();
        poster.join().unwrap();
    }
}
