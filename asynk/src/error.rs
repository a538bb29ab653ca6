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

//! Error values. Errors travel through `Result`; the poll protocol and
//! the scheduler themselves never fail.

use thiserror::Error;

/// The computation or channel on the other end is gone: a closed
/// channel after its buffer drained, or a spawned task cancelled
/// before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// A non-blocking send that could not take the item; the item is
/// handed back in either case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrySendError<T> {
    /// Bounded channel at capacity. Transient.
    #[error("channel is full")]
    Full(T),
    /// The channel no longer accepts sends.
    #[error("channel is closed")]
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) | TrySendError::Closed(v) => v,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TrySendError::Full(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TrySendError::Closed(_))
    }
}

/// A submission the executor did not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The executor is shutting down and drains instead of accepting.
    #[error("executor is shut down")]
    Shutdown,
    /// No task runner is installed on the current thread to resolve an
    /// ambient submit/spawn against.
    #[error("no task runner is current on this thread")]
    NoRunner,
}
