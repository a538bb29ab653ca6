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

//! Asynchronous FIFO channels: a buffer policy composed with a
//! sender-parking policy, integrated with the waker protocol for
//! backpressure and flush notification.
//!
//! Flavors: [`pipe`] (unbuffered single-item hand-off), [`bounded`],
//! [`unbounded`], [`passthrough`] (conflating, never blocks), each in
//! a single-sender and a multi-sender ([`mpsc`]) variant. Ordering is
//! FIFO per sender; multi-sender flavors make no cross-sender promise.
//!
//! Closing is idempotent and keeps buffered items for the receiver to
//! drain; dropping the receiver or the last sender closes the channel.

pub mod buffer;
pub mod parking;

use crate::{
    atomic_waker::AtomicWaker,
    context::Context,
    error::{Cancelled, TrySendError},
    future::Future,
    poll::Poll,
    sink::Sink,
    stream::Stream,
};
use asynk_infra::shared::Shared;
use buffer::{Buffer, Latest, List, Ring, SlotBuffer};
use core::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use log::debug;
use parking::{Multi, Park, SharedPark, Single};

struct Core<T, B: Buffer<T>, P: Park> {
    buffer: B,
    /// Where the single receiver parks while the buffer is empty.
    rx_waker: AtomicWaker,
    /// Where senders park while the buffer is full, and flushers wait
    /// for it to drain.
    tx_park: P,
    closed: AtomicBool,
    rx_dropped: AtomicBool,
    senders: AtomicUsize,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, B: Buffer<T>, P: Park> Core<T, B, P> {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("channel: closed");
            self.rx_waker.signal();
            self.tx_park.unpark_all();
        }
    }
}

/// Both halves of a freshly created channel; `split` separates their
/// lifetimes.
pub struct Pipe<T, B: Buffer<T>, P: Park> {
    sender: Sender<T, B, P>,
    receiver: Receiver<T, B, P>,
}

impl<T, B: Buffer<T>, P: Park> Pipe<T, B, P> {
    pub fn split(self) -> (Sender<T, B, P>, Receiver<T, B, P>) {
        (self.sender, self.receiver)
    }
}

impl<T, B: Buffer<T>, P: Park> std::fmt::Debug for Pipe<T, B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe").finish_non_exhaustive()
    }
}

fn make<T, B: Buffer<T>, P: Park>(buffer: B) -> Pipe<T, B, P> {
    let core = Shared::new(Core {
        buffer,
        rx_waker: AtomicWaker::new(),
        tx_park: P::default(),
        closed: AtomicBool::new(false),
        rx_dropped: AtomicBool::new(false),
        senders: AtomicUsize::new(1),
        _marker: PhantomData,
    });
    Pipe {
        sender: Sender { core: core.clone() },
        receiver: Receiver { core },
    }
}

/// Unbuffered: one item in flight, the next send waits until the
/// receiver takes it.
pub fn pipe<T: Send>() -> Pipe<T, SlotBuffer<T>, Single> {
    make(SlotBuffer::new())
}

/// Bounded with `capacity` slots; sends park when full.
pub fn bounded<T: Send>(capacity: usize) -> Pipe<T, Ring<T>, Single> {
    make(Ring::new(capacity))
}

/// Unbounded; sends never park.
pub fn unbounded<T: Send>() -> Pipe<T, List<T>, Single> {
    make(List::new())
}

/// Conflating: a send replaces any undelivered item, the receiver
/// observes the most recent one.
pub fn passthrough<T: Send>() -> Pipe<T, Latest<T>, Single> {
    make(Latest::new())
}

/// Multi-sender variants; the sender half is clonable.
pub mod mpsc {
    use super::*;

    pub fn pipe<T: Send>() -> Pipe<T, SlotBuffer<T>, Multi> {
        make(SlotBuffer::new())
    }

    pub fn bounded<T: Send>(capacity: usize) -> Pipe<T, Ring<T>, Multi> {
        make(Ring::new(capacity))
    }

    pub fn unbounded<T: Send>() -> Pipe<T, List<T>, Multi> {
        make(List::new())
    }

    pub fn passthrough<T: Send>() -> Pipe<T, Latest<T>, Multi> {
        make(Latest::new())
    }
}

/// The producing half.
pub struct Sender<T, B: Buffer<T>, P: Park> {
    core: Shared<Core<T, B, P>>,
}

impl<T, B: Buffer<T>, P: Park> Sender<T, B, P> {
    /// Non-blocking send: `Full` hands the item back on a bounded
    /// flavor at capacity, `Closed` once the channel no longer accepts
    /// sends.
    pub fn try_send(&mut self, value: T) -> Result<(), TrySendError<T>> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(TrySendError::Closed(value));
        }
        match self.core.buffer.try_push(value) {
            Ok(()) => {
                self.core.rx_waker.signal();
                Ok(())
            }
            Err(value) => Err(TrySendError::Full(value)),
        }
    }

    /// Sends the item in `item`, parking on the channel when full. On
    /// `Ready(Ok(()))` the item has been taken; on `Pending` it stays
    /// in place for the retry.
    pub fn poll_send(
        &mut self,
        cx: &mut Context<'_>,
        item: &mut Option<T>,
    ) -> Poll<Result<(), Cancelled>> {
        loop {
            if self.core.closed.load(Ordering::Acquire) {
                return Poll::Ready(Err(Cancelled));
            }
            let value = item.take().expect("poll_send called without an item");
            match self.core.buffer.try_push(value) {
                Ok(()) => {
                    self.core.rx_waker.signal();
                    return Poll::Ready(Ok(()));
                }
                Err(value) => {
                    *item = Some(value);
                    self.core.tx_park.park(cx.waker());
                    // Re-check after parking so a concurrent receive
                    // or close cannot strand us.
                    if self.core.closed.load(Ordering::Acquire) {
                        return Poll::Ready(Err(Cancelled));
                    }
                    if self.core.buffer.is_full() {
                        return Poll::Pending;
                    }
                }
            }
        }
    }

    /// A future completing once the item is in the channel.
    pub fn send(&mut self, value: T) -> Sending<'_, T, B, P> {
        Sending {
            sender: self,
            item: Some(value),
        }
    }

    /// Ready once the buffer is empty. Advisory under multiple
    /// senders: others may enqueue before the flusher observes the
    /// result. Fails only when the receiver is gone and the buffer can
    /// never drain.
    pub fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Cancelled>> {
        loop {
            if self.core.buffer.is_empty() {
                return Poll::Ready(Ok(()));
            }
            if self.core.rx_dropped.load(Ordering::Acquire) {
                return Poll::Ready(Err(Cancelled));
            }
            self.core.tx_park.park(cx.waker());
            if !self.core.buffer.is_empty() && !self.core.rx_dropped.load(Ordering::Acquire) {
                return Poll::Pending;
            }
        }
    }

    /// A future completing once the buffer has drained.
    pub fn flush(&mut self) -> Flushing<'_, T, B, P> {
        Flushing { sender: self }
    }

    /// Stops the channel from accepting further sends; buffered items
    /// stay available to the receiver. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }
}

impl<T, B: Buffer<T>, P: Park> Sink<T> for Sender<T, B, P> {
    type Error = Cancelled;

    fn poll_send(
        &mut self,
        cx: &mut Context<'_>,
        item: &mut Option<T>,
    ) -> Poll<Result<(), Self::Error>> {
        Sender::poll_send(self, cx, item)
    }

    fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sender::poll_flush(self, cx)
    }

    fn poll_close(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.core.close();
        Sender::poll_flush(self, cx)
    }
}

// Only multi-sender parking admits more than one producer.
impl<T, B: Buffer<T>, P: SharedPark> Clone for Sender<T, B, P> {
    fn clone(&self) -> Self {
        self.core.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T, B: Buffer<T>, P: Park> Drop for Sender<T, B, P> {
    fn drop(&mut self) {
        if self.core.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.core.close();
        }
    }
}

impl<T, B: Buffer<T>, P: Park> std::fmt::Debug for Sender<T, B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The consuming half. Single consumer by construction.
pub struct Receiver<T, B: Buffer<T>, P: Park> {
    core: Shared<Core<T, B, P>>,
}

impl<T, B: Buffer<T>, P: Park> Receiver<T, B, P> {
    fn note_pop(&self) {
        // Senders park on a full buffer; flushers wait for empty.
        if self.core.buffer.is_empty() {
            self.core.tx_park.unpark_all();
        } else {
            self.core.tx_park.unpark_one();
        }
    }

    /// Non-blocking receive: `Ok(None)` while temporarily empty,
    /// `Err(Cancelled)` only once the channel is closed *and* drained.
    pub fn try_recv(&mut self) -> Result<Option<T>, Cancelled> {
        if let Some(value) = self.core.buffer.try_pop() {
            self.note_pop();
            return Ok(Some(value));
        }
        if self.core.closed.load(Ordering::Acquire) {
            // A send may have landed between the pop and the flag.
            if let Some(value) = self.core.buffer.try_pop() {
                self.note_pop();
                return Ok(Some(value));
            }
            return Err(Cancelled);
        }
        Ok(None)
    }

    /// Receives the next item, parking while the channel is empty;
    /// woken by a send or a close.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Result<T, Cancelled>> {
        loop {
            match self.try_recv() {
                Ok(Some(value)) => return Poll::Ready(Ok(value)),
                Err(cancelled) => return Poll::Ready(Err(cancelled)),
                Ok(None) => {
                    self.core.rx_waker.register(cx.waker());
                    // Re-check so a send or close racing with the
                    // registration is not lost.
                    if !self.core.buffer.is_empty() || self.core.closed.load(Ordering::Acquire) {
                        continue;
                    }
                    return Poll::Pending;
                }
            }
        }
    }

    /// A future resolving to the next item, or `Err(Cancelled)` after
    /// close-and-drain.
    pub fn recv(&mut self) -> Recv<'_, T, B, P> {
        Recv { receiver: self }
    }

    /// Stops the channel from accepting further sends. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }
}

impl<T, B: Buffer<T>, P: Park> Stream for Receiver<T, B, P> {
    type Item = T;

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self.poll_recv(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Some(value)),
            Poll::Ready(Err(Cancelled)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, B: Buffer<T>, P: Park> Drop for Receiver<T, B, P> {
    fn drop(&mut self) {
        self.core.rx_dropped.store(true, Ordering::Release);
        self.core.close();
    }
}

impl<T, B: Buffer<T>, P: Park> std::fmt::Debug for Receiver<T, B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// See [`Sender::send`].
#[derive(Debug)]
pub struct Sending<'a, T, B: Buffer<T>, P: Park> {
    sender: &'a mut Sender<T, B, P>,
    item: Option<T>,
}

impl<T, B: Buffer<T>, P: Park> Future for Sending<'_, T, B, P> {
    type Output = Result<(), Cancelled>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sender.poll_send(cx, &mut self.item)
    }
}

/// See [`Sender::flush`].
#[derive(Debug)]
pub struct Flushing<'a, T, B: Buffer<T>, P: Park> {
    sender: &'a mut Sender<T, B, P>,
}

impl<T, B: Buffer<T>, P: Park> Future for Flushing<'_, T, B, P> {
    type Output = Result<(), Cancelled>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sender.poll_flush(cx)
    }
}

/// See [`Receiver::recv`].
#[derive(Debug)]
pub struct Recv<'a, T, B: Buffer<T>, P: Park> {
    receiver: &'a mut Receiver<T, B, P>,
}

impl<T, B: Buffer<T>, P: Park> Future for Recv<'_, T, B, P> {
    type Output = Result<T, Cancelled>;

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_try_send_try_recv_round() {
        let (mut tx, mut rx) = bounded(2).split();
        assert_eq!(rx.try_recv(), Ok(None));
        assert!(tx.try_send(1).is_ok());
        assert!(tx.try_send(2).is_ok());
        assert_eq!(tx.try_send(3), Err(TrySendError::Full(3)));
        assert_eq!(rx.try_recv(), Ok(Some(1)));
        assert!(tx.try_send(3).is_ok());
        assert_eq!(rx.try_recv(), Ok(Some(2)));
        assert_eq!(rx.try_recv(), Ok(Some(3)));
        assert_eq!(rx.try_recv(), Ok(None));
    }

    #[test]
    fn test_close_preserves_buffered_items() {
        let (mut tx, mut rx) = bounded(4).split();
        assert!(tx.try_send("a").is_ok());
        assert!(tx.try_send("b").is_ok());
        tx.close();
        tx.close();
        assert_eq!(tx.try_send("c"), Err(TrySendError::Closed("c")));
        assert_eq!(rx.try_recv(), Ok(Some("a")));
        assert_eq!(rx.try_recv(), Ok(Some("b")));
        assert_eq!(rx.try_recv(), Err(Cancelled));
    }

    #[test]
    fn test_drop_sender_closes() {
        let (tx, mut rx) = unbounded::<u8>().split();
        drop(tx);
        assert!(rx.is_closed());
        assert_eq!(rx.try_recv(), Err(Cancelled));
    }

    #[test]
    fn test_drop_receiver_closes() {
        let (mut tx, rx) = unbounded().split();
        drop(rx);
        assert_eq!(tx.try_send(1), Err(TrySendError::Closed(1)));
    }

    #[test]
    fn test_mpsc_last_sender_drop_closes() {
        let (tx, mut rx) = mpsc::unbounded::<u8>().split();
        let tx2 = tx.clone();
        drop(tx);
        assert!(!rx.is_closed());
        drop(tx2);
        assert!(rx.is_closed());
        assert_eq!(rx.try_recv(), Err(Cancelled));
    }

    #[test]
    fn test_passthrough_conflates() {
        let (mut tx, mut rx) = passthrough().split();
        assert!(tx.try_send(1).is_ok());
        assert!(tx.try_send(2).is_ok());
        assert_eq!(rx.try_recv(), Ok(Some(2)));
        assert_eq!(rx.try_recv(), Ok(None));
    }

    #[test]
    fn test_pipe_hands_off_one_at_a_time() {
        let (mut tx, mut rx) = pipe().split();
        assert!(tx.try_send(1).is_ok());
        assert_eq!(tx.try_send(2), Err(TrySendError::Full(2)));
        assert_eq!(rx.try_recv(), Ok(Some(1)));
        assert!(tx.try_send(2).is_ok());
    }
}
