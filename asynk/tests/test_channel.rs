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

use asynk::{
    channel,
    error::Cancelled,
    future,
    stream::StreamExt,
    waker::{Wake, Waker},
    Context, ExecutorExt, Poll, ThreadExecutor,
};
use pretty_assertions::assert_eq;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread;

struct Counter(AtomicUsize);

impl Wake for Counter {
    fn signal(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_waker() -> (Arc<Counter>, Waker) {
    let c = Arc::new(Counter(AtomicUsize::new(0)));
    (c.clone(), Waker::new(c))
}

// Bounded capacity 4, five sends, close after the fifth: the consumer
// sees every item in order, then the closed error.
#[test]
fn test_channel_echo() {
    let exec = ThreadExecutor::new();
    let (mut tx, mut rx) = channel::bounded::<i32>(4).split();

    let mut next = 1;
    let mut slot: Option<i32> = None;
    exec.submit(future::poll_fn(move |cx| loop {
        if slot.is_none() {
            if next > 5 {
                tx.close();
                return Poll::Ready(());
            }
            slot = Some(next);
        }
        match tx.poll_send(cx, &mut slot) {
            Poll::Ready(Ok(())) => next += 1,
            Poll::Ready(Err(Cancelled)) => return Poll::Ready(()),
            Poll::Pending => return Poll::Pending,
        }
    }));

    let collected = exec.run_until((&mut rx).collect());
    assert_eq!(collected, vec![1, 2, 3, 4, 5]);
    assert_eq!(exec.run_until(rx.recv()), Err(Cancelled));
}

// Capacity 1 with one item already buffered: the second send parks,
// one receive signals the parked sender, the retry succeeds.
#[test]
fn test_backpressure_wakes_parked_sender() {
    let (mut tx, mut rx) = channel::bounded::<i32>(1).split();
    assert!(tx.try_send(1).is_ok());

    let (count, waker) = counting_waker();
    let mut cx = Context::new(&waker);
    let mut item = Some(2);
    assert_eq!(tx.poll_send(&mut cx, &mut item), Poll::Pending);
    assert_eq!(item, Some(2));
    assert_eq!(count.0.load(Ordering::SeqCst), 0);

    assert_eq!(rx.try_recv(), Ok(Some(1)));
    assert!(count.0.load(Ordering::SeqCst) >= 1);

    assert_eq!(tx.poll_send(&mut cx, &mut item), Poll::Ready(Ok(())));
    assert_eq!(item, None);
    assert_eq!(rx.try_recv(), Ok(Some(2)));
}

#[test]
fn test_close_twice_equals_once() {
    let (mut tx, mut rx) = channel::bounded::<u8>(2).split();
    assert!(tx.try_send(7).is_ok());
    tx.close();
    let after_first = (rx.is_closed(), tx.try_send(8).is_err());
    tx.close();
    assert_eq!(after_first, (rx.is_closed(), true));
    assert_eq!(rx.try_recv(), Ok(Some(7)));
    assert_eq!(rx.try_recv(), Err(Cancelled));
}

#[test]
fn test_flush_completes_when_drained() {
    let (mut tx, mut rx) = channel::bounded::<i32>(2).split();
    assert!(tx.try_send(1).is_ok());
    assert!(tx.try_send(2).is_ok());

    let (count, waker) = counting_waker();
    let mut cx = Context::new(&waker);
    assert_eq!(tx.poll_flush(&mut cx), Poll::Pending);

    assert_eq!(rx.try_recv(), Ok(Some(1)));
    assert_eq!(rx.try_recv(), Ok(Some(2)));
    assert!(count.0.load(Ordering::SeqCst) >= 1);
    assert_eq!(tx.poll_flush(&mut cx), Poll::Ready(Ok(())));
}

#[test]
fn test_flush_fails_without_receiver() {
    let (mut tx, rx) = channel::bounded::<i32>(2).split();
    assert!(tx.try_send(1).is_ok());
    drop(rx);
    let waker = Waker::noop();
    let mut cx = Context::new(&waker);
    assert_eq!(tx.poll_flush(&mut cx), Poll::Ready(Err(Cancelled)));
}

// Multi-sender: per-sender FIFO holds, nothing is lost, and the close
// arrives only after the last sender is gone.
#[test]
fn test_mpsc_cross_thread() {
    let senders = 3usize;
    let per_sender = 256usize;
    let (tx, mut rx) = channel::mpsc::unbounded::<(usize, usize)>().split();

    let mut handles = Vec::new();
    for s in 0..senders {
        let mut tx = tx.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_sender {
                let mut item = (s, i);
                loop {
                    match tx.try_send(item) {
                        Ok(()) => break,
                        Err(e) if e.is_full() => {
                            item = e.into_inner();
                            thread::yield_now();
                        }
                        Err(_) => panic!("Channel closed under the senders"),
                    }
                }
            }
        }));
    }
    drop(tx);

    let items = asynk::block_on((&mut rx).collect());
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(items.len(), senders * per_sender);
    let mut last = vec![None::<usize>; senders];
    for (s, i) in items {
        if let Some(prev) = last[s] {
            assert!(i > prev, "Sender {} reordered {} after {}", s, i, prev);
        }
        last[s] = Some(i);
    }
}

#[test]
fn test_passthrough_never_blocks() {
    let exec = ThreadExecutor::new();
    let (mut tx, mut rx) = channel::passthrough::<u64>().split();
    for i in 0..64 {
        assert!(tx.try_send(i).is_ok());
    }
    drop(tx);
    let got = exec.run_until(rx.recv());
    assert_eq!(got, Ok(63));
}

#[test]
fn test_sink_protocol_on_sender() {
    use asynk::Sink;
    let (mut tx, mut rx) = channel::bounded::<i32>(4).split();
    let waker = Waker::noop();
    let mut cx = Context::new(&waker);

    let mut item = Some(5);
    assert_eq!(Sink::poll_send(&mut tx, &mut cx, &mut item), Poll::Ready(Ok(())));
    assert_eq!(rx.try_recv(), Ok(Some(5)));
    // poll_close stops sends and completes once drained.
    assert_eq!(Sink::poll_close(&mut tx, &mut cx), Poll::Ready(Ok(())));
    assert!(tx.is_closed());
    assert_eq!(rx.try_recv(), Err(Cancelled));
}
