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

//! The single-shot asynchronous value and its combinators. Combinators
//! are tagged-union state machines laid out flat in their parent, so a
//! suspension costs no allocation; type erasure happens only at the
//! executor boundary.

use crate::{context::Context, poll::Poll, ready};

/// A computation that eventually produces one `Output`.
///
/// `poll` either completes or arranges for the context's waker to be
/// signalled when progress is possible again, then returns `Pending`.
/// At most one thread polls a given value at a time, and a value that
/// returned `Ready` is never polled again.
pub trait Future {
    type Output;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output>;
}

impl<F: Future + ?Sized> Future for Box<F> {
    type Output = F::Output;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        (**self).poll(cx)
    }
}

impl<F: Future + ?Sized> Future for &mut F {
    type Output = F::Output;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        (**self).poll(cx)
    }
}

/// A future that is immediately ready with `value`.
pub fn ready<T>(value: T) -> Ready<T> {
    Ready(Some(value))
}

#[derive(Debug)]
pub struct Ready<T>(Option<T>);

impl<T> Future for Ready<T> {
    type Output = T;

    fn poll(&mut self, _cx: &mut Context<'_>) -> Poll<T> {
        Poll::Ready(self.0.take().expect("`Ready` polled after completion"))
    }
}

/// A future that never completes and registers nothing.
pub fn pending<T>() -> Pending<T> {
    Pending(core::marker::PhantomData)
}

#[derive(Debug)]
pub struct Pending<T>(core::marker::PhantomData<fn() -> T>);

impl<T> Future for Pending<T> {
    type Output = T;

    fn poll(&mut self, _cx: &mut Context<'_>) -> Poll<T> {
        Poll::Pending
    }
}

/// Wraps a closure as a future.
pub fn poll_fn<T, F>(f: F) -> PollFn<F>
where
    F: FnMut(&mut Context<'_>) -> Poll<T>,
{
    PollFn(f)
}

pub struct PollFn<F>(F);

impl<T, F> Future for PollFn<F>
where
    F: FnMut(&mut Context<'_>) -> Poll<T>,
{
    type Output = T;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<T> {
        (self.0)(cx)
    }
}

/// Completes after one reschedule: the first poll signals its own
/// waker and suspends.
pub fn yield_now() -> YieldNow {
    YieldNow { polled: false }
}

#[derive(Debug)]
pub struct YieldNow {
    polled: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.polled {
            Poll::Ready(())
        } else {
            self.polled = true;
            cx.yield_now()
        }
    }
}

pub trait FutureExt: Future + Sized {
    /// Transforms the output with `f` once it arrives.
    fn map<U, F: FnOnce(Self::Output) -> U>(self, f: F) -> Map<Self, F> {
        Map {
            future: self,
            f: Some(f),
        }
    }

    /// Chains a second future computed from this one's output.
    fn then<B, F>(self, f: F) -> Then<Self, B, F>
    where
        B: Future,
        F: FnOnce(Self::Output) -> B,
    {
        Then::First(self, Some(f))
    }

    /// Erases the concrete type; used where heterogeneous futures must
    /// be stored together.
    fn boxed(self) -> Box<dyn Future<Output = Self::Output> + Send>
    where
        Self: Send + 'static,
    {
        Box::new(self)
    }
}

impl<F: Future> FutureExt for F {}

#[derive(Debug)]
pub struct Map<Fut, F> {
    future: Fut,
    f: Option<F>,
}

impl<Fut: Future, U, F: FnOnce(Fut::Output) -> U> Future for Map<Fut, F> {
    type Output = U;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<U> {
        let value = ready!(self.future.poll(cx));
        let f = self.f.take().expect("`Map` polled after completion");
        Poll::Ready(f(value))
    }
}

pub enum Then<A: Future, B: Future, F> {
    First(A, Option<F>),
    Second(B),
    Done,
}

impl<A, B, F> Future for Then<A, B, F>
where
    A: Future,
    B: Future,
    F: FnOnce(A::Output) -> B,
{
    type Output = B::Output;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<B::Output> {
        loop {
            match self {
                Then::First(a, f) => {
                    let value = ready!(a.poll(cx));
                    let f = f.take().expect("`Then` lost its continuation");
                    *self = Then::Second(f(value));
                }
                Then::Second(b) => {
                    let value = ready!(b.poll(cx));
                    *self = Then::Done;
                    return Poll::Ready(value);
                }
                Then::Done => panic!("`Then` polled after completion"),
            }
        }
    }
}

/// Drives every future to completion; the output vector preserves
/// input order regardless of completion order.
pub fn join_all<F, I>(futures: I) -> JoinAll<F>
where
    F: Future,
    I: IntoIterator<Item = F>,
{
    JoinAll {
        slots: futures.into_iter().map(JoinSlot::Running).collect(),
    }
}

enum JoinSlot<F: Future> {
    Running(F),
    Done(Option<F::Output>),
}

pub struct JoinAll<F: Future> {
    slots: Vec<JoinSlot<F>>,
}

impl<F: Future> Future for JoinAll<F> {
    type Output = Vec<F::Output>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Vec<F::Output>> {
        let mut all_done = true;
        for slot in self.slots.iter_mut() {
            if let JoinSlot::Running(f) = slot {
                match f.poll(cx) {
                    Poll::Ready(v) => *slot = JoinSlot::Done(Some(v)),
                    Poll::Pending => all_done = false,
                }
            }
        }
        if !all_done {
            return Poll::Pending;
        }
        let out = self
            .slots
            .iter_mut()
            .map(|slot| match slot {
                JoinSlot::Done(v) => v.take().expect("`JoinAll` polled after completion"),
                JoinSlot::Running(_) => unreachable!(),
            })
            .collect();
        Poll::Ready(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    Left(A),
    Right(B),
}

/// Completes with whichever side finishes first; `a` wins ties since
/// it is polled first.
pub fn select<A: Future, B: Future>(a: A, b: B) -> Select<A, B> {
    Select { a, b }
}

#[derive(Debug)]
pub struct Select<A, B> {
    a: A,
    b: B,
}

impl<A: Future, B: Future> Future for Select<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(v) = self.a.poll(cx) {
            return Poll::Ready(Either::Left(v));
        }
        if let Poll::Ready(v) = self.b.poll(cx) {
            return Poll::Ready(Either::Right(v));
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waker::Waker;
    use pretty_assertions::assert_eq;

    fn drive<F: Future>(future: &mut F) -> Poll<F::Output> {
        let waker = Waker::noop();
        let mut cx = Context::new(&waker);
        future.poll(&mut cx)
    }

    #[test]
    fn test_ready_and_map() {
        let mut f = ready(6).map(|v| v * 7);
        assert_eq!(drive(&mut f), Poll::Ready(42));
    }

    #[test]
    #[should_panic(expected = "polled after completion")]
    fn test_ready_repoll_traps() {
        let mut f = ready(1);
        let _ = drive(&mut f);
        let _ = drive(&mut f);
    }

    #[test]
    fn test_then_chains() {
        let mut f = ready(2).then(|v| ready(v + 3)).then(|v| ready(v * 10));
        assert_eq!(drive(&mut f), Poll::Ready(50));
    }

    #[test]
    fn test_then_across_suspension() {
        let mut f = yield_now().then(|()| ready("late"));
        assert_eq!(drive(&mut f), Poll::Pending);
        assert_eq!(drive(&mut f), Poll::Ready("late"));
    }

    #[test]
    fn test_join_all_preserves_input_order() {
        // The middle future completes last; output order must not care.
        let futures = vec![
            ready(10).boxed(),
            yield_now().then(|()| ready(20)).boxed(),
            ready(30).boxed(),
        ];
        let mut f = join_all(futures);
        assert_eq!(drive(&mut f), Poll::Pending);
        assert_eq!(drive(&mut f), Poll::Ready(vec![10, 20, 30]));
    }

    #[test]
    fn test_select_prefers_the_finished_side() {
        let mut f = select(pending::<u32>(), ready("done"));
        assert_eq!(drive(&mut f), Poll::Ready(Either::Right("done")));
        let mut f = select(ready(1), ready(2));
        assert_eq!(drive(&mut f), Poll::Ready(Either::Left(1)));
    }

    #[test]
    fn test_poll_fn() {
        let mut calls = 0;
        let mut f = poll_fn(move |_| {
            calls += 1;
            if calls < 3 {
                Poll::Pending
            } else {
                Poll::Ready(calls)
            }
        });
        assert_eq!(drive(&mut f), Poll::Pending);
        assert_eq!(drive(&mut f), Poll::Pending);
        assert_eq!(drive(&mut f), Poll::Ready(3));
    }
}
