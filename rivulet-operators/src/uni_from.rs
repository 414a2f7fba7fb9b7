// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Adapters from the multi-item protocol to the single-value contract.

use parking_lot::Mutex;
use rivulet_core::{
    Cancellable, Publisher, RivuletError, Subscriber, Subscription, UniSubscriber, UpstreamSlot,
    UNBOUNDED,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A lazy source of one optional value.
///
/// The single-value counterpart of [`Publisher`], implemented by the
/// adapters in this module.
pub trait UniSource<T: Send + 'static>: Send + Sync {
    /// Binds `subscriber` to a fresh resolution of this source.
    fn subscribe_uni(&self, subscriber: Arc<dyn UniSubscriber<T>>);
}

/// Resolves a stream to its first item.
///
/// Subscribes with a demand of one: the first item cancels the upstream and
/// becomes the result, an empty completion resolves to no item, a failure
/// resolves to that failure. Anything the upstream pushes afterwards is
/// discarded.
pub struct UniFromPublisherOp<T> {
    source: Arc<dyn Publisher<T>>,
}

impl<T: Send + 'static> UniFromPublisherOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>) -> Self {
        Self { source }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn UniSubscriber<T>>) {
        let adapter = Arc::new_cyclic(|weak: &Weak<FirstItemAdapter<T>>| FirstItemAdapter {
            downstream: subscriber,
            upstream: UpstreamSlot::new(),
            done: AtomicBool::new(false),
            self_ref: weak.clone(),
        });
        self.source.subscribe(adapter);
    }
}

impl<T: Send + 'static> UniSource<T> for UniFromPublisherOp<T> {
    fn subscribe_uni(&self, subscriber: Arc<dyn UniSubscriber<T>>) {
        self.subscribe(subscriber);
    }
}

struct FirstItemAdapter<T: Send + 'static> {
    downstream: Arc<dyn UniSubscriber<T>>,
    upstream: UpstreamSlot,
    done: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> Subscriber<T> for FirstItemAdapter<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(1);
        }
    }

    fn on_next(&self, item: T) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.cancel();
            self.downstream.on_item(Some(item));
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.downstream.on_failure(failure);
        } else {
            crate::debug!("dropping failure received after the single-value resolution");
        }
    }

    fn on_complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.downstream.on_item(None);
        }
    }
}

impl<T: Send + 'static> Cancellable for FirstItemAdapter<T> {
    fn cancel(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.cancel();
        }
    }
}

/// Buffers a whole stream and resolves to the collected items on
/// completion.
pub struct CollectItemsOp<T> {
    source: Arc<dyn Publisher<T>>,
}

impl<T: Send + 'static> CollectItemsOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>) -> Self {
        Self { source }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn UniSubscriber<Vec<T>>>) {
        let adapter = Arc::new_cyclic(|weak: &Weak<CollectAdapter<T>>| CollectAdapter {
            downstream: subscriber,
            upstream: UpstreamSlot::new(),
            buffer: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
            self_ref: weak.clone(),
        });
        self.source.subscribe(adapter);
    }
}

impl<T: Send + 'static> UniSource<Vec<T>> for CollectItemsOp<T> {
    fn subscribe_uni(&self, subscriber: Arc<dyn UniSubscriber<Vec<T>>>) {
        self.subscribe(subscriber);
    }
}

struct CollectAdapter<T: Send + 'static> {
    downstream: Arc<dyn UniSubscriber<Vec<T>>>,
    upstream: UpstreamSlot,
    buffer: Mutex<Vec<T>>,
    done: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> Subscriber<T> for CollectAdapter<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        if !self.done.load(Ordering::Acquire) {
            self.buffer.lock().push(item);
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.buffer.lock().clear();
            self.downstream.on_failure(failure);
        }
    }

    fn on_complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            let items = std::mem::take(&mut *self.buffer.lock());
            self.downstream.on_item(Some(items));
        }
    }
}

impl<T: Send + 'static> Cancellable for CollectAdapter<T> {
    fn cancel(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.cancel();
            self.buffer.lock().clear();
        }
    }
}
