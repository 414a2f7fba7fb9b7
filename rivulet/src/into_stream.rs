// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bridge from the subscription protocol to `futures::Stream`.

use crate::multi::Multi;
use futures::Stream;
use rivulet_core::{RivuletError, Subscriber, Subscription, UpstreamSlot};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

enum StreamSignal<T> {
    Item(T),
    Failure(RivuletError),
}

/// A `futures::Stream` view of a [`Multi`].
///
/// Items arrive as `Ok`, the terminal failure (if any) as one final `Err`;
/// completion ends the stream. Dropping the stream cancels the underlying
/// subscription.
pub struct MultiStream<T: Send + 'static> {
    receiver: async_channel::Receiver<StreamSignal<T>>,
    upstream: Arc<UpstreamSlot>,
}

// `async_channel::Receiver` is marked `!Unpin` only to keep the door open for
// future internal optimizations; nothing in this module relies on address
// stability of the receiver, so it is safe to let `MultiStream` be `Unpin`.
impl<T: Send + 'static> Unpin for MultiStream<T> {}

pub(crate) fn into_stream<T: Send + 'static>(multi: &Multi<T>, capacity: usize) -> MultiStream<T> {
    assert!(capacity > 0, "bridge capacity must be strictly positive");
    // One extra slot so a trailing failure always fits alongside the
    // demanded items.
    let (sender, receiver) = async_channel::bounded(capacity + 1);
    let upstream = Arc::new(UpstreamSlot::new());
    multi.subscribe(Arc::new(BridgeSubscriber {
        sender,
        upstream: Arc::clone(&upstream),
        capacity,
    }));
    MultiStream { receiver, upstream }
}

struct BridgeSubscriber<T: Send + 'static> {
    sender: async_channel::Sender<StreamSignal<T>>,
    upstream: Arc<UpstreamSlot>,
    capacity: usize,
}

impl<T: Send + 'static> Subscriber<T> for BridgeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            subscription.request(self.capacity as u64);
        }
    }

    fn on_next(&self, item: T) {
        // Demand never exceeds the channel capacity, so this only fails
        // against an upstream that ignores the request discipline.
        if self.sender.try_send(StreamSignal::Item(item)).is_err() {
            self.upstream.cancel();
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        let _ = self.sender.try_send(StreamSignal::Failure(failure));
        self.sender.close();
    }

    fn on_complete(&self) {
        self.sender.close();
    }
}

impl<T: Send + 'static> Stream for MultiStream<T> {
    type Item = Result<T, RivuletError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        // SAFETY: `MultiStream` is `Unpin`, and `receiver` is never moved out
        // of `this`; it is only ever accessed through this pinned reference.
        let receiver = unsafe { Pin::new_unchecked(&mut this.receiver) };
        match receiver.poll_next(cx) {
            Poll::Ready(Some(StreamSignal::Item(item))) => {
                // The consumed slot is replayed upstream.
                this.upstream.request(1);
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(StreamSignal::Failure(failure))) => Poll::Ready(Some(Err(failure))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send + 'static> Drop for MultiStream<T> {
    fn drop(&mut self) {
        self.upstream.cancel();
        self.receiver.close();
    }
}
