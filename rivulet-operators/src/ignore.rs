// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Ignore operator: drains the upstream and only forwards the terminal.

use crate::processor::ProcessorBase;
use rivulet_core::{Publisher, RivuletError, Subscriber, Subscription, UNBOUNDED};
use std::sync::Arc;

/// Discards every item and forwards only completion or failure.
///
/// The upstream is requested unbounded demand on subscription — no item is
/// ever delivered downstream, so downstream demand is irrelevant.
pub struct IgnoreOp<T> {
    source: Arc<dyn Publisher<T>>,
}

impl<T: Send + 'static> IgnoreOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>) -> Self {
        Self { source }
    }
}

impl<T: Send + 'static> Publisher<T> for IgnoreOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(IgnoreProcessor {
            base: ProcessorBase::new(subscriber),
        }));
    }
}

struct IgnoreProcessor<T: Send + 'static> {
    base: ProcessorBase<T>,
}

impl<T: Send + 'static> Subscriber<T> for IgnoreProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.base.set_upstream(subscription) {
            self.base.deliver_subscription();
            self.base.request_upstream(UNBOUNDED);
        }
    }

    fn on_next(&self, _item: T) {}

    fn on_failure(&self, failure: RivuletError) {
        self.base.forward_failure(failure);
    }

    fn on_complete(&self) {
        self.base.forward_complete();
    }
}
