// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Contract enforcement at the subscriber boundary.
//!
//! [`SerializedSubscriber`] wraps a downstream subscriber and enforces the
//! terminal rules of the protocol against a misbehaving source: exactly one
//! `on_subscribe`, at most one terminal signal, and no items after a
//! terminal. Operators whose internal state machine already guarantees this
//! do not need the wrapper; the drain engines use it as the boundary layer
//! under which their emission paths stay simple.

use crate::error::RivuletError;
use crate::protocol::{Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Terminal-once wrapper around a downstream subscriber.
pub struct SerializedSubscriber<T: Send + 'static> {
    downstream: Arc<dyn Subscriber<T>>,
    subscribed: AtomicBool,
    done: AtomicBool,
}

impl<T: Send + 'static> SerializedSubscriber<T> {
    #[must_use]
    pub fn new(downstream: Arc<dyn Subscriber<T>>) -> Arc<Self> {
        Arc::new(Self {
            downstream,
            subscribed: AtomicBool::new(false),
            done: AtomicBool::new(false),
        })
    }

    /// True once a terminal signal has been delivered downstream.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Subscriber<T> for SerializedSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            // A second subscription must not reach the downstream; cancel it.
            subscription.cancel();
        } else {
            self.downstream.on_subscribe(subscription);
        }
    }

    fn on_next(&self, item: T) {
        if !self.done.load(Ordering::Acquire) {
            self.downstream.on_next(item);
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.downstream.on_failure(failure);
        }
    }

    fn on_complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.downstream.on_complete();
        }
    }
}
