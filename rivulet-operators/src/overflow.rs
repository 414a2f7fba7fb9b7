// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Overflow policies for upstreams that outrun downstream demand.
//!
//! All three operators request unbounded demand from their upstream and let
//! the downstream pace emission. They differ in what happens to an item
//! arriving without demand: `buffer` queues it up to a fixed capacity and
//! fails on saturation, `drop` discards it (optionally notifying a
//! callback), `keep-last` retains only the most recent one.

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use rivulet_core::demand::{add_request, subtract_produced};
use rivulet_core::{
    Publisher, Result, RivuletError, SerializedSubscriber, Subscriber, Subscription,
    UpstreamSlot, UNBOUNDED,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Buffers up to `capacity` items; one more is a back-pressure failure that
/// cancels the upstream.
pub struct OnOverflowBufferOp<T> {
    source: Arc<dyn Publisher<T>>,
    capacity: usize,
}

impl<T: Send + 'static> OnOverflowBufferOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be strictly positive");
        Self { source, capacity }
    }
}

impl<T: Send + 'static> Publisher<T> for OnOverflowBufferOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let processor = Arc::new_cyclic(|weak: &Weak<BufferProcessor<T>>| BufferProcessor {
            downstream: SerializedSubscriber::new(subscriber),
            upstream: UpstreamSlot::new(),
            queue: ArrayQueue::new(self.capacity),
            capacity: self.capacity,
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            failure: Mutex::new(None),
            self_ref: weak.clone(),
        });
        self.source.subscribe(processor);
    }
}

struct BufferProcessor<T: Send + 'static> {
    downstream: Arc<SerializedSubscriber<T>>,
    upstream: UpstreamSlot,
    queue: ArrayQueue<T>,
    capacity: usize,
    requested: AtomicU64,
    wip: AtomicUsize,
    done: AtomicBool,
    cancelled: AtomicBool,
    failure: Mutex<Option<RivuletError>>,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> BufferProcessor<T> {
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            loop {
                if self.cancelled.load(Ordering::Acquire) {
                    while self.queue.pop().is_some() {}
                    return;
                }
                if self.requested.load(Ordering::Acquire) == 0 {
                    break;
                }
                let Some(item) = self.queue.pop() else {
                    break;
                };
                self.downstream.on_next(item);
                subtract_produced(&self.requested, 1);
            }
            if self.done.load(Ordering::Acquire) && self.queue.is_empty() {
                match self.failure.lock().take() {
                    Some(failure) => self.downstream.on_failure(failure),
                    None => self.downstream.on_complete(),
                }
                return;
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return;
            }
            missed = previous - missed;
        }
    }

    fn halt_with(&self, failure: RivuletError) {
        *self.failure.lock() = Some(failure);
        self.done.store(true, Ordering::Release);
        self.drain();
    }
}

impl<T: Send + 'static> Subscriber<T> for BufferProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if self.queue.push(item).is_err() {
            self.upstream.cancel();
            self.halt_with(RivuletError::back_pressure(format!(
                "overflow buffer of {} items saturated",
                self.capacity
            )));
        } else {
            self.drain();
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if !self.done.load(Ordering::Acquire) && !self.cancelled.load(Ordering::Acquire) {
            self.halt_with(failure);
        }
    }

    fn on_complete(&self) {
        self.done.store(true, Ordering::Release);
        self.drain();
    }
}

impl<T: Send + 'static> Subscription for BufferProcessor<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.cancel();
            self.downstream.on_failure(RivuletError::zero_request());
            return;
        }
        add_request(&self.requested, n);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.upstream.cancel();
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            while self.queue.pop().is_some() {}
        }
    }
}

/// Discards items arriving without demand, optionally notifying a callback.
pub struct OnOverflowDropOp<T> {
    source: Arc<dyn Publisher<T>>,
    on_drop: Option<Arc<dyn Fn(T) -> Result<()> + Send + Sync>>,
}

impl<T: Send + 'static> OnOverflowDropOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>) -> Self {
        Self {
            source,
            on_drop: None,
        }
    }

    pub fn with_callback(
        source: Arc<dyn Publisher<T>>,
        on_drop: impl Fn(T) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            on_drop: Some(Arc::new(on_drop)),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for OnOverflowDropOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let processor = Arc::new_cyclic(|weak: &Weak<DropProcessor<T>>| DropProcessor {
            downstream: SerializedSubscriber::new(subscriber),
            upstream: UpstreamSlot::new(),
            on_drop: self.on_drop.clone(),
            requested: AtomicU64::new(0),
            done: AtomicBool::new(false),
            self_ref: weak.clone(),
        });
        self.source.subscribe(processor);
    }
}

struct DropProcessor<T: Send + 'static> {
    downstream: Arc<SerializedSubscriber<T>>,
    upstream: UpstreamSlot,
    on_drop: Option<Arc<dyn Fn(T) -> Result<()> + Send + Sync>>,
    requested: AtomicU64,
    done: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> Subscriber<T> for DropProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) || self.upstream.is_cancelled() {
            return;
        }
        if self.requested.load(Ordering::Acquire) > 0 {
            self.downstream.on_next(item);
            subtract_produced(&self.requested, 1);
        } else if let Some(callback) = &self.on_drop {
            if let Err(failure) = callback(item) {
                if !self.done.swap(true, Ordering::AcqRel) {
                    self.upstream.cancel();
                    self.downstream.on_failure(failure);
                }
            }
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.downstream.on_failure(failure);
        }
    }

    fn on_complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.downstream.on_complete();
        }
    }
}

impl<T: Send + 'static> Subscription for DropProcessor<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            if !self.done.swap(true, Ordering::AcqRel) {
                self.upstream.cancel();
                self.downstream.on_failure(RivuletError::zero_request());
            }
            return;
        }
        add_request(&self.requested, n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }
}

/// Retains only the most recent item while the downstream has no demand.
pub struct OnOverflowKeepLastOp<T> {
    source: Arc<dyn Publisher<T>>,
}

impl<T: Send + 'static> OnOverflowKeepLastOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>) -> Self {
        Self { source }
    }
}

impl<T: Send + 'static> Publisher<T> for OnOverflowKeepLastOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let processor = Arc::new_cyclic(|weak: &Weak<KeepLastProcessor<T>>| KeepLastProcessor {
            downstream: SerializedSubscriber::new(subscriber),
            upstream: UpstreamSlot::new(),
            latest: Mutex::new(None),
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            failure: Mutex::new(None),
            self_ref: weak.clone(),
        });
        self.source.subscribe(processor);
    }
}

struct KeepLastProcessor<T: Send + 'static> {
    downstream: Arc<SerializedSubscriber<T>>,
    upstream: UpstreamSlot,
    latest: Mutex<Option<T>>,
    requested: AtomicU64,
    wip: AtomicUsize,
    done: AtomicBool,
    cancelled: AtomicBool,
    failure: Mutex<Option<RivuletError>>,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> KeepLastProcessor<T> {
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            loop {
                if self.cancelled.load(Ordering::Acquire) {
                    self.latest.lock().take();
                    return;
                }
                if let Some(failure) = self.failure.lock().take() {
                    self.latest.lock().take();
                    self.downstream.on_failure(failure);
                    return;
                }
                if self.requested.load(Ordering::Acquire) == 0 {
                    break;
                }
                let Some(item) = self.latest.lock().take() else {
                    break;
                };
                self.downstream.on_next(item);
                subtract_produced(&self.requested, 1);
            }
            if self.done.load(Ordering::Acquire) && self.latest.lock().is_none() {
                self.downstream.on_complete();
                return;
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return;
            }
            missed = previous - missed;
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for KeepLastProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        *self.latest.lock() = Some(item);
        self.drain();
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.done.swap(true, Ordering::AcqRel) || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        *self.failure.lock() = Some(failure);
        self.drain();
    }

    fn on_complete(&self) {
        self.done.store(true, Ordering::Release);
        self.drain();
    }
}

impl<T: Send + 'static> Subscription for KeepLastProcessor<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.cancel();
            self.downstream.on_failure(RivuletError::zero_request());
            return;
        }
        add_request(&self.requested, n);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.upstream.cancel();
        self.drain();
    }
}
