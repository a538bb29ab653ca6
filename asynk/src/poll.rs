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

/// The result of one non-blocking attempt to advance a computation.
///
/// `Pending` promises that the current context's waker has been
/// registered with exactly one event source. After a computation
/// returns `Ready` it must not be polled again; implementations may
/// treat a repoll as a programmer bug and trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

impl<T> Poll<T> {
    #[inline]
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Poll<U> {
        match self {
            Poll::Ready(v) => Poll::Ready(f(v)),
            Poll::Pending => Poll::Pending,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready(_))
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Poll::Pending)
    }
}

impl<T> From<T> for Poll<T> {
    fn from(value: T) -> Self {
        Poll::Ready(value)
    }
}

/// Unwraps `Poll::Ready` or returns `Poll::Pending` from the enclosing
/// function.
#[macro_export]
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::poll::Poll::Ready(v) => v,
            $crate::poll::Poll::Pending => return $crate::poll::Poll::Pending,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_queries() {
        let p: Poll<u32> = Poll::Ready(2);
        assert!(p.is_ready());
        assert_eq!(p.map(|v| v * 10), Poll::Ready(20));
        let p: Poll<u32> = Poll::Pending;
        assert!(p.is_pending());
        assert_eq!(p.map(|v| v * 10), Poll::Pending);
        assert_eq!(Poll::from(1), Poll::Ready(1));
    }
}
