// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Filter operator with demand replenishment for rejected items.

use crate::processor::ProcessorBase;
use rivulet_core::{Publisher, Result, RivuletError, Subscriber, Subscription};
use std::sync::Arc;

/// Forwards only the items accepted by `predicate`.
///
/// Each rejected item is replaced by a `request(1)` towards the upstream so
/// the downstream demand stays covered. A predicate failure cancels the
/// upstream and surfaces as the terminal failure.
pub struct FilterOp<T, P> {
    source: Arc<dyn Publisher<T>>,
    predicate: Arc<P>,
}

impl<T, P> FilterOp<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn Publisher<T>>, predicate: P) -> Self {
        Self {
            source,
            predicate: Arc::new(predicate),
        }
    }
}

impl<T, P> Publisher<T> for FilterOp<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(FilterProcessor {
            base: ProcessorBase::new(subscriber),
            predicate: Arc::clone(&self.predicate),
        }));
    }
}

struct FilterProcessor<T: Send + 'static, P> {
    base: ProcessorBase<T>,
    predicate: Arc<P>,
}

impl<T, P> Subscriber<T> for FilterProcessor<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.base.set_upstream(subscription) {
            self.base.deliver_subscription();
        }
    }

    fn on_next(&self, item: T) {
        if self.base.is_terminated() {
            return;
        }
        match (self.predicate)(&item) {
            Ok(true) => self.base.emit(item),
            Ok(false) => self.base.request_upstream(1),
            Err(failure) => self.base.fail_and_cancel(failure),
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        self.base.forward_failure(failure);
    }

    fn on_complete(&self) {
        self.base.forward_complete();
    }
}
