// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Shared machinery for single-state operator processors.
//!
//! A processor plays both protocol roles at once: subscriber towards the
//! upstream it wraps, and subscription towards its downstream. For operators
//! without a concurrency fan-out the whole shared part is captured here —
//! the upstream slot, the done flag, the termination helpers and the default
//! demand forwarding. Operators compose a [`ProcessorBase`] and override
//! `on_next` only.

use rivulet_core::{RivuletError, Subscriber, Subscription, UpstreamSlot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct BaseInner<O: Send + 'static> {
    downstream: Arc<dyn Subscriber<O>>,
    upstream: UpstreamSlot,
    done: AtomicBool,
}

/// The shared half of a one-in/one-out operator processor.
///
/// Cloning is shallow: clones share the same state, which is how the
/// processor hands itself downstream as a [`Subscription`].
pub(crate) struct ProcessorBase<O: Send + 'static> {
    inner: Arc<BaseInner<O>>,
}

impl<O: Send + 'static> Clone for ProcessorBase<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Send + 'static> ProcessorBase<O> {
    pub(crate) fn new(downstream: Arc<dyn Subscriber<O>>) -> Self {
        Self {
            inner: Arc::new(BaseInner {
                downstream,
                upstream: UpstreamSlot::new(),
                done: AtomicBool::new(false),
            }),
        }
    }

    /// Installs the upstream subscription; a second subscription is
    /// cancelled and `false` returned.
    pub(crate) fn set_upstream(&self, subscription: Arc<dyn Subscription>) -> bool {
        self.inner.upstream.set(subscription)
    }

    /// Forwards the subscription handle downstream. Call after a successful
    /// [`set_upstream`](Self::set_upstream).
    pub(crate) fn deliver_subscription(&self) {
        self.inner.downstream.on_subscribe(Arc::new(self.clone()));
    }

    pub(crate) fn emit(&self, item: O) {
        self.inner.downstream.on_next(item);
    }

    pub(crate) fn request_upstream(&self, n: u64) {
        self.inner.upstream.request(n);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// True once the processor stopped delivering: terminal emitted or
    /// subscription cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.is_done() || self.inner.upstream.is_cancelled()
    }

    /// Cancels upstream, marks the processor done and delivers a terminal
    /// failure downstream. Signals after the first terminal are dropped.
    pub(crate) fn fail_and_cancel(&self, failure: RivuletError) {
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.upstream.cancel();
            self.inner.downstream.on_failure(failure);
        }
    }

    /// Forwards an upstream failure. The upstream is already terminal, so
    /// the slot is only marked, not cancelled.
    pub(crate) fn forward_failure(&self, failure: RivuletError) {
        if self.inner.upstream.is_cancelled() {
            return;
        }
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.upstream.mark_terminated();
            self.inner.downstream.on_failure(failure);
        }
    }

    /// Forwards an upstream completion.
    pub(crate) fn forward_complete(&self) {
        if self.inner.upstream.is_cancelled() {
            return;
        }
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.upstream.mark_terminated();
            self.inner.downstream.on_complete();
        }
    }

    /// Completes downstream early and cancels the rest of the upstream, for
    /// operators that stop before the source does (take, take-while).
    pub(crate) fn complete_and_cancel(&self) {
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.upstream.cancel();
            self.inner.downstream.on_complete();
        }
    }
}

impl<O: Send + 'static> Subscription for ProcessorBase<O> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.fail_and_cancel(RivuletError::zero_request());
        } else {
            self.inner.upstream.request(n);
        }
    }

    fn cancel(&self) {
        self.inner.upstream.cancel();
    }
}
