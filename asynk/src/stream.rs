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

use crate::{context::Context, future::Future, poll::Poll, ready};

/// A lazy sequence of values; `poll_next` yields `Ready(None)` once at
/// end-of-stream, after which the stream must not be polled again.
pub trait Stream {
    type Item;

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Self::Item>>;
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    type Item = S::Item;

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        (**self).poll_next(cx)
    }
}

impl<S: Stream + ?Sized> Stream for &mut S {
    type Item = S::Item;

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        (**self).poll_next(cx)
    }
}

/// Adapts an iterator; every item is ready immediately.
pub fn iter<I: IntoIterator>(into_iter: I) -> Iter<I::IntoIter> {
    Iter(into_iter.into_iter())
}

#[derive(Debug)]
pub struct Iter<I>(I);

impl<I: Iterator> Stream for Iter<I> {
    type Item = I::Item;

    fn poll_next(&mut self, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.0.next())
    }
}

pub trait StreamExt: Stream + Sized {
    /// A future resolving to the stream's next item.
    fn next(&mut self) -> Next<'_, Self> {
        Next { stream: self }
    }

    /// Drains the stream to completion, collecting every item.
    fn collect(self) -> Collect<Self> {
        Collect {
            stream: self,
            items: Vec::new(),
        }
    }
}

impl<S: Stream> StreamExt for S {}

#[derive(Debug)]
pub struct Next<'a, S> {
    stream: &'a mut S,
}

impl<S: Stream> Future for Next<'_, S> {
    type Output = Option<S::Item>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.stream.poll_next(cx)
    }
}

#[derive(Debug)]
pub struct Collect<S: Stream> {
    stream: S,
    items: Vec<S::Item>,
}

impl<S: Stream> Future for Collect<S> {
    type Output = Vec<S::Item>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match ready!(self.stream.poll_next(cx)) {
                Some(item) => self.items.push(item),
                None => return Poll::Ready(core::mem::take(&mut self.items)),
            }
        }
    }
}
