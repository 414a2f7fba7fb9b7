// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Take operator limiting the stream to its first `n` items.

use crate::processor::ProcessorBase;
use rivulet_core::{Publisher, RivuletError, Subscriber, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Emits the first `n` items, then completes and cancels the upstream.
pub struct TakeOp<T> {
    source: Arc<dyn Publisher<T>>,
    count: u64,
}

impl<T: Send + 'static> TakeOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>, count: u64) -> Self {
        Self { source, count }
    }
}

impl<T: Send + 'static> Publisher<T> for TakeOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(TakeProcessor {
            base: ProcessorBase::new(subscriber),
            remaining: AtomicU64::new(self.count),
        }));
    }
}

struct TakeProcessor<T: Send + 'static> {
    base: ProcessorBase<T>,
    remaining: AtomicU64,
}

impl<T: Send + 'static> Subscriber<T> for TakeProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.base.set_upstream(subscription) {
            self.base.deliver_subscription();
            if self.remaining.load(Ordering::Acquire) == 0 {
                self.base.complete_and_cancel();
            }
        }
    }

    fn on_next(&self, item: T) {
        if self.base.is_terminated() {
            return;
        }
        let taken = self.remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
            if r == 0 {
                None
            } else {
                Some(r - 1)
            }
        });
        if let Ok(before) = taken {
            self.base.emit(item);
            if before == 1 {
                self.base.complete_and_cancel();
            }
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        self.base.forward_failure(failure);
    }

    fn on_complete(&self) {
        self.base.forward_complete();
    }
}
