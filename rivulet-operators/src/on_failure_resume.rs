// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Resume-on-failure operator switching to a fallback publisher.

use crate::arbiter::Arbiter;
use rivulet_core::{
    Publisher, Result, RivuletError, SerializedSubscriber, Subscriber, Subscription,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// On upstream failure, subscribes to the publisher chosen by `fallback`
/// and continues there, preserving outstanding demand.
///
/// The switch happens at most once: a failure of the fallback itself is
/// forwarded downstream. A failing `fallback` function surfaces as a
/// composite of the original failure and its own.
pub struct OnFailureResumeOp<T, F> {
    source: Arc<dyn Publisher<T>>,
    fallback: Arc<F>,
}

impl<T, F> OnFailureResumeOp<T, F>
where
    T: Send + 'static,
    F: Fn(RivuletError) -> Result<Arc<dyn Publisher<T>>> + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn Publisher<T>>, fallback: F) -> Self {
        Self {
            source,
            fallback: Arc::new(fallback),
        }
    }
}

impl<T, F> Publisher<T> for OnFailureResumeOp<T, F>
where
    T: Send + 'static,
    F: Fn(RivuletError) -> Result<Arc<dyn Publisher<T>>> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let main = Arc::new_cyclic(|weak: &Weak<ResumeMain<T, F>>| ResumeMain {
            downstream: SerializedSubscriber::new(subscriber),
            fallback: Arc::clone(&self.fallback),
            arbiter: Arbiter::new(),
            switched: AtomicBool::new(false),
            self_ref: weak.clone(),
        });
        main.downstream.on_subscribe(main.clone());
        self.source.subscribe(main);
    }
}

struct ResumeMain<T: Send + 'static, F> {
    downstream: Arc<SerializedSubscriber<T>>,
    fallback: Arc<F>,
    arbiter: Arbiter,
    switched: AtomicBool,
    self_ref: Weak<Self>,
}

impl<T, F> Subscriber<T> for ResumeMain<T, F>
where
    T: Send + 'static,
    F: Fn(RivuletError) -> Result<Arc<dyn Publisher<T>>> + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.switch_to(subscription);
    }

    fn on_next(&self, item: T) {
        if self.arbiter.is_cancelled() {
            return;
        }
        self.arbiter.note_produced();
        self.downstream.on_next(item);
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.arbiter.is_cancelled() {
            return;
        }
        if self.switched.swap(true, Ordering::AcqRel) {
            // The fallback failed too; no second resume.
            self.downstream.on_failure(failure);
            return;
        }
        let original = failure.clone();
        match (self.fallback)(failure) {
            Ok(next) => {
                if let Some(me) = self.self_ref.upgrade() {
                    next.subscribe(me);
                }
            }
            Err(chooser_failure) => {
                self.downstream
                    .on_failure(RivuletError::composite(vec![original, chooser_failure]));
            }
        }
    }

    fn on_complete(&self) {
        if !self.arbiter.is_cancelled() {
            self.downstream.on_complete();
        }
    }
}

impl<T, F> Subscription for ResumeMain<T, F>
where
    T: Send + 'static,
    F: Fn(RivuletError) -> Result<Arc<dyn Publisher<T>>> + Send + Sync + 'static,
{
    fn request(&self, n: u64) {
        if n == 0 {
            self.cancel();
            self.downstream.on_failure(RivuletError::zero_request());
            return;
        }
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        self.arbiter.cancel();
    }
}
