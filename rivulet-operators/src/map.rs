// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Map operator applying a fallible transform to every item.

use crate::processor::ProcessorBase;
use rivulet_core::{Publisher, Result, RivuletError, Subscriber, Subscription};
use std::marker::PhantomData;
use std::sync::Arc;

/// Transforms every upstream item with `mapper`.
///
/// A mapper failure cancels the upstream and surfaces as the terminal
/// failure of the subscription; demand and cancellation pass through
/// unchanged.
pub struct MapOp<I, O, F> {
    source: Arc<dyn Publisher<I>>,
    mapper: Arc<F>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> MapOp<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn Publisher<I>>, mapper: F) -> Self {
        Self {
            source,
            mapper: Arc::new(mapper),
            _marker: PhantomData,
        }
    }
}

impl<I, O, F> Publisher<O> for MapOp<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<O>>) {
        self.source.subscribe(Arc::new(MapProcessor {
            base: ProcessorBase::new(subscriber),
            mapper: Arc::clone(&self.mapper),
            _marker: PhantomData,
        }));
    }
}

struct MapProcessor<I, O: Send + 'static, F> {
    base: ProcessorBase<O>,
    mapper: Arc<F>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> Subscriber<I> for MapProcessor<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.base.set_upstream(subscription) {
            self.base.deliver_subscription();
        }
    }

    fn on_next(&self, item: I) {
        if self.base.is_terminated() {
            return;
        }
        match (self.mapper)(item) {
            Ok(mapped) => self.base.emit(mapped),
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
