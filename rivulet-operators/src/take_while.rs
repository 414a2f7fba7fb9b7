// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Take-while operator: forwards items until the predicate rejects one.

use crate::processor::ProcessorBase;
use rivulet_core::{Publisher, Result, RivuletError, Subscriber, Subscription};
use std::sync::Arc;

/// Forwards items while `predicate` holds; the first rejected item is
/// dropped, the upstream cancelled and the downstream completed.
pub struct TakeWhileOp<T, P> {
    source: Arc<dyn Publisher<T>>,
    predicate: Arc<P>,
}

impl<T, P> TakeWhileOp<T, P>
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

impl<T, P> Publisher<T> for TakeWhileOp<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(Arc::new(TakeWhileProcessor {
            base: ProcessorBase::new(subscriber),
            predicate: Arc::clone(&self.predicate),
        }));
    }
}

struct TakeWhileProcessor<T: Send + 'static, P> {
    base: ProcessorBase<T>,
    predicate: Arc<P>,
}

impl<T, P> Subscriber<T> for TakeWhileProcessor<T, P>
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
            Ok(false) => self.base.complete_and_cancel(),
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
