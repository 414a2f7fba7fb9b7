// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Tap operator for side-effect observation of every protocol signal.

use rivulet_core::{
    Publisher, Result, RivuletError, Subscriber, Subscription, UpstreamSlot,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Optional callbacks invoked around the signals of one subscription.
///
/// Each callback runs before the corresponding downstream signal. The
/// fallible ones redirect the stream on failure: a failing `on_item`
/// cancels the upstream and surfaces the failure, a failing `on_failure`
/// composes its failure with the original, and a failing `on_complete`
/// turns the completion into a failure. `on_termination` fires exactly
/// once, with the terminal failure (if any) and whether the termination was
/// a cancellation.
pub struct TapCallbacks<T: Send + 'static> {
    on_subscribe: Option<Arc<dyn Fn() + Send + Sync>>,
    on_item: Option<Arc<dyn Fn(&T) -> Result<()> + Send + Sync>>,
    on_failure: Option<Arc<dyn Fn(&RivuletError) -> Result<()> + Send + Sync>>,
    on_complete: Option<Arc<dyn Fn() -> Result<()> + Send + Sync>>,
    on_request: Option<Arc<dyn Fn(u64) + Send + Sync>>,
    on_cancel: Option<Arc<dyn Fn() + Send + Sync>>,
    on_termination: Option<Arc<dyn Fn(Option<&RivuletError>, bool) + Send + Sync>>,
}

impl<T: Send + 'static> TapCallbacks<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            on_subscribe: None,
            on_item: None,
            on_failure: None,
            on_complete: None,
            on_request: None,
            on_cancel: None,
            on_termination: None,
        }
    }

    #[must_use]
    pub fn on_subscribe(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_subscribe = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_item(
        mut self,
        callback: impl Fn(&T) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_item = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_failure(
        mut self,
        callback: impl Fn(&RivuletError) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_complete(
        mut self,
        callback: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_request(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_request = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_cancel(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_termination(
        mut self,
        callback: impl Fn(Option<&RivuletError>, bool) + Send + Sync + 'static,
    ) -> Self {
        self.on_termination = Some(Arc::new(callback));
        self
    }
}

impl<T: Send + 'static> Default for TapCallbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Clone for TapCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: self.on_subscribe.clone(),
            on_item: self.on_item.clone(),
            on_failure: self.on_failure.clone(),
            on_complete: self.on_complete.clone(),
            on_request: self.on_request.clone(),
            on_cancel: self.on_cancel.clone(),
            on_termination: self.on_termination.clone(),
        }
    }
}

/// Signal-consumer operator wrapping an upstream with [`TapCallbacks`].
pub struct TapOp<T: Send + 'static> {
    source: Arc<dyn Publisher<T>>,
    callbacks: TapCallbacks<T>,
}

impl<T: Send + 'static> TapOp<T> {
    pub fn new(source: Arc<dyn Publisher<T>>, callbacks: TapCallbacks<T>) -> Self {
        Self { source, callbacks }
    }
}

impl<T: Send + 'static> Publisher<T> for TapOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let processor = Arc::new_cyclic(|weak: &Weak<TapProcessor<T>>| TapProcessor {
            downstream: subscriber,
            callbacks: self.callbacks.clone(),
            upstream: UpstreamSlot::new(),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            termination_fired: AtomicBool::new(false),
            self_ref: weak.clone(),
        });
        self.source.subscribe(processor);
    }
}

struct TapProcessor<T: Send + 'static> {
    downstream: Arc<dyn Subscriber<T>>,
    callbacks: TapCallbacks<T>,
    upstream: UpstreamSlot,
    done: AtomicBool,
    cancelled: AtomicBool,
    termination_fired: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> TapProcessor<T> {
    fn fire_termination(&self, failure: Option<&RivuletError>, cancelled: bool) {
        if !self.termination_fired.swap(true, Ordering::AcqRel) {
            if let Some(callback) = &self.callbacks.on_termination {
                callback(failure, cancelled);
            }
        }
    }

    fn fail_and_cancel(&self, failure: RivuletError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.cancel();
            self.fire_termination(Some(&failure), false);
            self.downstream.on_failure(failure);
        }
    }

    fn is_halted(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Subscriber<T> for TapProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(subscription) {
            if let Some(callback) = &self.callbacks.on_subscribe {
                callback();
            }
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
        }
    }

    fn on_next(&self, item: T) {
        if self.is_halted() {
            return;
        }
        if let Some(callback) = &self.callbacks.on_item {
            if let Err(failure) = callback(&item) {
                self.fail_and_cancel(failure);
                return;
            }
        }
        self.downstream.on_next(item);
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.is_halted() {
            return;
        }
        let mut failure = failure;
        if let Some(callback) = &self.callbacks.on_failure {
            if let Err(callback_failure) = callback(&failure) {
                failure = RivuletError::composite(vec![failure, callback_failure]);
            }
        }
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.fire_termination(Some(&failure), false);
            self.downstream.on_failure(failure);
        }
    }

    fn on_complete(&self) {
        if self.is_halted() {
            return;
        }
        if let Some(callback) = &self.callbacks.on_complete {
            if let Err(failure) = callback() {
                // The completion callback failed; the downstream observes a
                // failure instead of the completion.
                if !self.done.swap(true, Ordering::AcqRel) {
                    self.upstream.mark_terminated();
                    self.fire_termination(Some(&failure), false);
                    self.downstream.on_failure(failure);
                }
                return;
            }
        }
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.mark_terminated();
            self.fire_termination(None, false);
            self.downstream.on_complete();
        }
    }
}

impl<T: Send + 'static> Subscription for TapProcessor<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.fail_and_cancel(RivuletError::zero_request());
            return;
        }
        if let Some(callback) = &self.callbacks.on_request {
            callback(n);
        }
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            if let Some(callback) = &self.callbacks.on_cancel {
                callback();
            }
            if !self.done.load(Ordering::Acquire) {
                self.fire_termination(None, true);
            }
        }
        self.upstream.cancel();
    }
}
