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

//! Demand-driven cooperative asynchronous computation.
//!
//! Values make progress only when polled, and are re-polled only after
//! their registered [`Waker`] is signalled. The crate provides the
//! poll protocol itself ([`Future`], [`Stream`], [`Sink`]), the task
//! scheduler that drives top-level futures, channels for asynchronous
//! hand-off, and [`Promise`]/[`Task`] for crossing threads.

pub mod atomic_waker;
pub mod channel;
pub mod context;
pub mod error;
pub mod executor;
pub mod future;
mod park;
pub mod poll;
pub mod promise;
pub mod scheduler;
pub mod sink;
pub mod spawn;
pub mod stream;
mod task;
pub mod waker;

pub use atomic_waker::AtomicWaker;
pub use context::Context;
pub use error::{Cancelled, SubmitError, TrySendError};
pub use executor::{
    block_on, current, Executor, ExecutorExt, ExecutorHandle, TaskFuture, ThreadExecutor,
};
pub use future::{Future, FutureExt};
pub use poll::Poll;
pub use promise::Promise;
pub use scheduler::Scheduler;
pub use sink::Sink;
pub use spawn::Task;
pub use stream::{Stream, StreamExt};
pub use waker::{Wake, Waker};
