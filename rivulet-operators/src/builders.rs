// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Source publishers: collections, empty, never and failed streams.

use parking_lot::Mutex;
use rivulet_core::demand::{add_request, subtract_produced};
use rivulet_core::{Publisher, RivuletError, Subscriber, Subscription};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Publisher that replays a cloneable collection on every subscription.
///
/// Emission is demand-driven: items are handed out on the caller's thread,
/// inside `request`, and only up to the outstanding demand. Re-entrant
/// requests from `on_next` are folded into the running emission loop.
pub struct FromIterPublisher<C> {
    items: C,
}

impl<C> FromIterPublisher<C> {
    pub fn new(items: C) -> Self {
        Self { items }
    }
}

impl<C, T> Publisher<T> for FromIterPublisher<C>
where
    T: Send + 'static,
    C: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    C::IntoIter: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let subscription = Arc::new(IterSubscription {
            downstream: Arc::clone(&subscriber),
            iter: Mutex::new(self.items.clone().into_iter()),
            requested: AtomicU64::new(0),
            halted: AtomicBool::new(false),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct IterSubscription<T: Send + 'static, It> {
    downstream: Arc<dyn Subscriber<T>>,
    iter: Mutex<It>,
    requested: AtomicU64,
    halted: AtomicBool,
}

impl<T, It> IterSubscription<T, It>
where
    T: Send + 'static,
    It: Iterator<Item = T> + Send + 'static,
{
    // Runs on the thread whose request moved the counter off zero; that
    // thread owns the loop until outstanding demand is back to zero.
    fn emit_loop(&self) {
        loop {
            let outstanding = self.requested.load(Ordering::Acquire);
            let mut emitted = 0u64;
            {
                let mut iter = self.iter.lock();
                while emitted < outstanding {
                    if self.halted.load(Ordering::Acquire) {
                        return;
                    }
                    match iter.next() {
                        Some(item) => {
                            self.downstream.on_next(item);
                            emitted += 1;
                        }
                        None => {
                            if !self.halted.swap(true, Ordering::AcqRel) {
                                self.downstream.on_complete();
                            }
                            return;
                        }
                    }
                }
            }
            if emitted == 0 || subtract_produced(&self.requested, emitted) == 0 {
                return;
            }
        }
    }
}

impl<T, It> Subscription for IterSubscription<T, It>
where
    T: Send + 'static,
    It: Iterator<Item = T> + Send + 'static,
{
    fn request(&self, n: u64) {
        if n == 0 {
            if !self.halted.swap(true, Ordering::AcqRel) {
                self.downstream.on_failure(RivuletError::zero_request());
            }
            return;
        }
        if self.halted.load(Ordering::Acquire) {
            return;
        }
        if add_request(&self.requested, n) == 0 {
            self.emit_loop();
        }
    }

    fn cancel(&self) {
        self.halted.store(true, Ordering::Release);
    }
}

/// Subscription handed out by sources that terminate on subscribe.
struct InertSubscription;

impl Subscription for InertSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

/// Publisher that completes immediately without emitting.
pub struct EmptyPublisher<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> EmptyPublisher<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for EmptyPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Publisher<T> for EmptyPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(InertSubscription));
        subscriber.on_complete();
    }
}

/// Publisher that never emits and never terminates.
pub struct NeverPublisher<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> NeverPublisher<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for NeverPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Publisher<T> for NeverPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(InertSubscription));
    }
}

/// Publisher that fails immediately with a clone of the given failure.
pub struct FailurePublisher<T> {
    failure: RivuletError,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FailurePublisher<T> {
    pub fn new(failure: RivuletError) -> Self {
        Self {
            failure,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for FailurePublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(InertSubscription));
        subscriber.on_failure(self.failure.clone());
    }
}
