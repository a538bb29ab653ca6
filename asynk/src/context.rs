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

use crate::{
    error::SubmitError,
    executor::{self, Executor, ExecutorExt},
    future::Future,
    poll::Poll,
    spawn::Task,
    waker::Waker,
};

/// The ambient argument of every poll call: the current waker plus
/// handles for handing sibling futures to the executor that owns the
/// caller.
pub struct Context<'a> {
    waker: &'a Waker,
}

impl<'a> Context<'a> {
    pub fn new(waker: &'a Waker) -> Self {
        Self { waker }
    }

    #[inline]
    pub fn waker(&self) -> &'a Waker {
        self.waker
    }

    /// Derives a context for a child poll with a different waker,
    /// leaving this context untouched.
    pub fn with_waker<'b>(&self, waker: &'b Waker) -> Context<'b> {
        Context::new(waker)
    }

    /// Returns `Pending` after signalling the current waker: a
    /// voluntary reschedule. Primitives spinning on a short-lived race
    /// use this to give other work a chance.
    pub fn yield_now<T>(&self) -> Poll<T> {
        self.waker.signal();
        Poll::Pending
    }

    /// Hands `future` to the executor driving the current task. The
    /// executor will not poll it before the current poll returns.
    pub fn submit(
        &self,
        future: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), SubmitError> {
        executor::current()
            .ok_or(SubmitError::NoRunner)?
            .try_submit(Box::new(future))
    }

    /// Like [`Context::submit`], but returns a handle carrying the
    /// future's eventual output.
    pub fn spawn<F>(&self, future: F) -> Result<Task<F::Output>, SubmitError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        executor::current()
            .ok_or(SubmitError::NoRunner)?
            .try_spawn(future)
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
