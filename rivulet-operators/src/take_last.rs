// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Take-last operator buffering the final `n` items of the upstream.

use parking_lot::Mutex;
use rivulet_core::demand::{add_request, subtract_produced};
use rivulet_core::{
    Publisher, RivuletError, SerializedSubscriber, Subscriber, Subscription, UpstreamSlot,
    UNBOUNDED,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Retains a sliding window of the last `count` upstream items and emits it
/// once the upstream completes, paced by downstream demand.
///
/// The upstream is consumed with unbounded demand; downstream demand only
/// paces the replay of the buffered tail.
pub struct TakeLastOp<T> {
    source: Arc<dyn Publisher<T>>,
    count: usize,
}

impl<T: Send + 'static> TakeLastOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>, count: usize) -> Self {
        Self { source, count }
    }
}

impl<T: Send + 'static> Publisher<T> for TakeLastOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let processor = Arc::new_cyclic(|weak: &Weak<TakeLastProcessor<T>>| TakeLastProcessor {
            downstream: SerializedSubscriber::new(subscriber),
            upstream: UpstreamSlot::new(),
            buffer: Mutex::new(VecDeque::new()),
            count: self.count,
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            upstream_done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            self_ref: weak.clone(),
        });
        self.source.subscribe(processor);
    }
}

struct TakeLastProcessor<T: Send + 'static> {
    downstream: Arc<SerializedSubscriber<T>>,
    upstream: UpstreamSlot,
    buffer: Mutex<VecDeque<T>>,
    count: usize,
    requested: AtomicU64,
    wip: AtomicUsize,
    upstream_done: AtomicBool,
    cancelled: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> TakeLastProcessor<T> {
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.buffer.lock().clear();
                return;
            }
            if self.upstream_done.load(Ordering::Acquire) {
                while self.requested.load(Ordering::Acquire) > 0 {
                    if self.cancelled.load(Ordering::Acquire) {
                        self.buffer.lock().clear();
                        return;
                    }
                    let Some(item) = self.buffer.lock().pop_front() else {
                        break;
                    };
                    self.downstream.on_next(item);
                    subtract_produced(&self.requested, 1);
                }
                if self.buffer.lock().is_empty() {
                    self.downstream.on_complete();
                    return;
                }
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return;
            }
            missed = previous - missed;
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for TakeLastProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        if self.upstream_done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if self.count == 0 {
            return;
        }
        let mut buffer = self.buffer.lock();
        if buffer.len() == self.count {
            buffer.pop_front();
        }
        buffer.push_back(item);
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.upstream_done.swap(true, Ordering::AcqRel) || self.cancelled.load(Ordering::Acquire)
        {
            return;
        }
        // The buffered tail is stale once the upstream failed.
        self.buffer.lock().clear();
        self.downstream.on_failure(failure);
    }

    fn on_complete(&self) {
        if !self.upstream_done.swap(true, Ordering::AcqRel) {
            self.drain();
        }
    }
}

impl<T: Send + 'static> Subscription for TakeLastProcessor<T> {
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
            self.buffer.lock().clear();
        }
    }
}
