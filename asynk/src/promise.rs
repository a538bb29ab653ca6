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

//! A one-shot cross-thread slot: any thread resolves, a single task
//! awaits. Exactly one resolve wins; the rest are dropped.

use crate::{context::Context, future::Future, poll::Poll, ready, waker::Waker};
use asynk_infra::{backoff::Backoff, shared::Shared};
use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU8, Ordering},
};

const IDLE: u8 = 0;
const POLLING: u8 = 1;
const RESOLVING: u8 = 2;
const RESOLVED: u8 = 3;

struct PromiseCore<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
    waker: UnsafeCell<Option<Waker>>,
}

// The value and waker slots are only touched while the POLLING or
// RESOLVING state is exclusively held, or after RESOLVED is published.
unsafe impl<T: Send> Send for PromiseCore<T> {}
unsafe impl<T: Send> Sync for PromiseCore<T> {}

/// A clonable handle to the slot. The slot lives until the last handle
/// (producer or consumer) drops.
pub struct Promise<T> {
    core: Shared<PromiseCore<T>>,
}

impl<T: Send> Promise<T> {
    pub fn new() -> Self {
        Self {
            core: Shared::new(PromiseCore {
                state: AtomicU8::new(IDLE),
                value: UnsafeCell::new(None),
                waker: UnsafeCell::new(None),
            }),
        }
    }

    /// Fulfils the promise. Returns false if it was already resolved;
    /// later resolves are dropped.
    pub fn resolve(&self, value: T) -> bool {
        let core = &*self.core;
        let backoff = Backoff::new();
        loop {
            match core
                .state
                .compare_exchange(IDLE, RESOLVING, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => {
                    let waker = unsafe { (*core.waker.get()).take() };
                    unsafe { *core.value.get() = Some(value) };
                    core.state.store(RESOLVED, Ordering::Release);
                    if let Some(w) = waker {
                        w.signal();
                    }
                    return true;
                }
                Err(RESOLVING) | Err(RESOLVED) => return false,
                Err(POLLING) => {
                    // The consumer is mid-registration; it restores
                    // IDLE promptly.
                    backoff.snooze();
                }
                Err(_) => unreachable!(),
            }
        }
    }

    /// A unit future that resolves this promise with `future`'s
    /// output.
    pub fn resolve_when<F>(&self, future: F) -> ResolveWhen<F>
    where
        F: Future<Output = T>,
    {
        ResolveWhen {
            future,
            promise: self.clone(),
        }
    }

    fn poll_value(&self, cx: &mut Context<'_>) -> Poll<T> {
        let core = &*self.core;
        let backoff = Backoff::new();
        loop {
            match core
                .state
                .compare_exchange(IDLE, POLLING, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => {
                    unsafe { *core.waker.get() = Some(cx.waker().clone()) };
                    let published = core.state.compare_exchange(
                        POLLING,
                        IDLE,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    );
                    debug_assert!(published.is_ok());
                    return Poll::Pending;
                }
                Err(RESOLVED) => {
                    let value = unsafe { (*core.value.get()).take() };
                    return Poll::Ready(value.expect("Promise polled again after completion"));
                }
                Err(RESOLVING) => {
                    // The producer is between claiming the slot and
                    // publishing the value.
                    if backoff.is_completed() {
                        return cx.yield_now();
                    }
                    backoff.snooze();
                }
                Err(POLLING) => panic!("Concurrent poll on a promise"),
                Err(_) => unreachable!(),
            }
        }
    }
}

impl<T: Send> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Send> Future for Promise<T> {
    type Output = T;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<T> {
        self.poll_value(cx)
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

/// See [`Promise::resolve_when`].
#[derive(Debug)]
pub struct ResolveWhen<F: Future>
where
    F::Output: Send,
{
    future: F,
    promise: Promise<F::Output>,
}

impl<F: Future> Future for ResolveWhen<F>
where
    F::Output: Send,
{
    type Output = ();

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let value = ready!(self.future.poll(cx));
        self.promise.resolve(value);
        Poll::Ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waker::{Wake, Waker};
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    };

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn signal(&self) {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    #[test]
    fn test_poll_then_resolve() {
        let mut p = Promise::new();
        let count = Arc::new(Counter(AtomicUsize::new(0)));
        let waker = Waker::new(count.clone());
        let mut cx = Context::new(&waker);
        assert_eq!(p.poll(&mut cx), Poll::Pending);
        assert!(p.resolve(11));
        assert_eq!(count.0.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(p.poll(&mut cx), Poll::Ready(11));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut p = Promise::new();
        assert!(p.resolve(1));
        assert!(!p.resolve(2));
        assert!(!p.resolve(3));
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        assert_eq!(p.poll(&mut cx), Poll::Ready(1));
    }

    #[test]
    fn test_resolve_before_first_poll() {
        let mut p = Promise::new();
        let producer = p.clone();
        assert!(producer.resolve("early"));
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        assert_eq!(p.poll(&mut cx), Poll::Ready("early"));
    }

    #[test]
    fn test_resolve_when() {
        let p = Promise::new();
        let mut consumer = p.clone();
        let mut resolver = p.resolve_when(crate::future::ready(5));
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        assert_eq!(resolver.poll(&mut cx), Poll::Ready(()));
        assert_eq!(consumer.poll(&mut cx), Poll::Ready(5));
    }

    #[test]
    #[should_panic(expected = "polled again after completion")]
    fn test_repoll_after_completion_traps() {
        let mut p = Promise::new();
        assert!(p.resolve(1));
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        let _ = p.poll(&mut cx);
        let _ = p.poll(&mut cx);
    }
}
