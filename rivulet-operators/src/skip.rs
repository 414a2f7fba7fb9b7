// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Skip operator dropping the first `n` items.

use crate::processor::ProcessorBase;
use rivulet_core::{Publisher, RivuletError, Subscriber, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Drops the first `count` items, replenishing one upstream request for
/// each dropped item, then forwards the rest unchanged.
pub struct SkipOp<T> {
    source: Arc<dyn Publisher<T>>,
    count: u64,
}

impl<T: Send + 'static> SkipOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>, count: u64) -> Self {
        Self { source, count }
    }
}

impl<T: Send + 'static> Publisher<T> for SkipOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(SkipProcessor {
            base: ProcessorBase::new(subscriber),
            remaining: AtomicU64::new(self.count),
        }));
    }
}

struct SkipProcessor<T: Send + 'static> {
    base: ProcessorBase<T>,
    remaining: AtomicU64,
}

impl<T: Send + 'static> Subscriber<T> for SkipProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.base.set_upstream(subscription) {
            self.base.deliver_subscription();
        }
    }

    fn on_next(&self, item: T) {
        if self.base.is_terminated() {
            return;
        }
        let skipped = self.remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
            if r == 0 {
                None
            } else {
                Some(r - 1)
            }
        });
        if skipped.is_ok() {
            drop(item);
            self.base.request_upstream(1);
        } else {
            self.base.emit(item);
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        self.base.forward_failure(failure);
    }

    fn on_complete(&self) {
        self.base.forward_complete();
    }
}
