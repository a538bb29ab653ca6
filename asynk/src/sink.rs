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

use crate::{context::Context, poll::Poll};

/// The dual of a stream: an asynchronous consumer of items.
///
/// `poll_send` receives the item through an option so a suspended send
/// keeps ownership with the caller: on `Ready(Ok(()))` the item has
/// been taken, on `Pending` it is left in place for the retry.
pub trait Sink<Item> {
    type Error;

    fn poll_send(
        &mut self,
        cx: &mut Context<'_>,
        item: &mut Option<Item>,
    ) -> Poll<Result<(), Self::Error>>;

    /// Ready once every previously accepted item has been handed
    /// onward.
    fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;

    /// Stops accepting new items, then flushes.
    fn poll_close(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;
}

impl<S: Sink<Item> + ?Sized, Item> Sink<Item> for &mut S {
    type Error = S::Error;

    fn poll_send(
        &mut self,
        cx: &mut Context<'_>,
        item: &mut Option<Item>,
    ) -> Poll<Result<(), Self::Error>> {
        (**self).poll_send(cx, item)
    }

    fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        (**self).poll_flush(cx)
    }

    fn poll_close(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        (**self).poll_close(cx)
    }
}
