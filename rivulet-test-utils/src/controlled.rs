// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A hand-pumped publisher that records the demand signals it receives.
//!
//! `ControlledPublisher` is the push side of protocol tests: it emits items,
//! completion and failures on command — deliberately without checking
//! demand, so tests can verify how operators defend against misbehaving
//! sources — and records every `request`/`cancel` the operator sends back
//! up.

use parking_lot::Mutex;
use rivulet_core::demand::add_request;
use rivulet_core::{Publisher, RivuletError, Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct ControlCore<T: Send + 'static> {
    subscriber: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    requests: Mutex<Vec<u64>>,
    total_requested: AtomicU64,
    cancelled: AtomicBool,
}

/// Single-subscriber test source with manual emission.
pub struct ControlledPublisher<T: Send + 'static> {
    core: Arc<ControlCore<T>>,
}

impl<T: Send + 'static> ControlledPublisher<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(ControlCore {
                subscriber: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                total_requested: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    fn subscriber(&self) -> Arc<dyn Subscriber<T>> {
        self.core
            .subscriber
            .lock()
            .clone()
            .expect("no subscriber attached; subscribe before pushing signals")
    }

    /// Pushes one item, regardless of recorded demand.
    pub fn emit(&self, item: T) {
        self.subscriber().on_next(item);
    }

    /// Pushes the completion terminal.
    pub fn complete(&self) {
        self.subscriber().on_complete();
    }

    /// Pushes a failure terminal.
    pub fn fail(&self, failure: RivuletError) {
        self.subscriber().on_failure(failure);
    }

    /// Every `request(n)` received, in arrival order.
    pub fn requests(&self) -> Vec<u64> {
        self.core.requests.lock().clone()
    }

    /// Sum of all received demand (saturating).
    pub fn total_requested(&self) -> u64 {
        self.core.total_requested.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.cancelled.load(Ordering::Acquire)
    }

    pub fn has_subscriber(&self) -> bool {
        self.core.subscriber.lock().is_some()
    }
}

impl<T: Send + 'static> Default for ControlledPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Clone for ControlledPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ControlledPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        *self.core.subscriber.lock() = Some(Arc::clone(&subscriber));
        subscriber.on_subscribe(Arc::new(ControlledSubscription {
            core: Arc::clone(&self.core),
        }));
    }
}

struct ControlledSubscription<T: Send + 'static> {
    core: Arc<ControlCore<T>>,
}

impl<T: Send + 'static> Subscription for ControlledSubscription<T> {
    fn request(&self, n: u64) {
        self.core.requests.lock().push(n);
        add_request(&self.core.total_requested, n);
    }

    fn cancel(&self) {
        self.core.cancelled.store(true, Ordering::Release);
    }
}
