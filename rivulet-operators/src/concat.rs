// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Concat operator: sequential subscription preserving source order.

use crate::arbiter::Arbiter;
use crate::failures::Failures;
use rivulet_core::{
    Publisher, RivuletError, SerializedSubscriber, Subscriber, Subscription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Subscribes to `sources` one after another, switching only when the
/// current member terminates.
///
/// Downstream demand is preserved across member boundaries. With
/// `postpone_failure` a failing member does not stop the sequence: the
/// remaining members still run and the accumulated failure surfaces after
/// the last one.
pub struct ConcatOp<T> {
    sources: Vec<Arc<dyn Publisher<T>>>,
    postpone_failure: bool,
}

impl<T: Send + 'static> ConcatOp<T> {
    pub fn new(sources: Vec<Arc<dyn Publisher<T>>>, postpone_failure: bool) -> Self {
        Self {
            sources,
            postpone_failure,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ConcatOp<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let main = Arc::new_cyclic(|weak: &Weak<ConcatMain<T>>| ConcatMain {
            downstream: SerializedSubscriber::new(subscriber),
            sources: self.sources.clone(),
            postpone_failure: self.postpone_failure,
            index: AtomicUsize::new(0),
            arbiter: Arbiter::new(),
            wip: AtomicUsize::new(0),
            failures: Failures::new(),
            self_ref: weak.clone(),
        });
        main.downstream.on_subscribe(main.clone());
        main.subscribe_next();
    }
}

struct ConcatMain<T: Send + 'static> {
    downstream: Arc<SerializedSubscriber<T>>,
    sources: Vec<Arc<dyn Publisher<T>>>,
    postpone_failure: bool,
    index: AtomicUsize,
    arbiter: Arbiter,
    wip: AtomicUsize,
    failures: Failures,
    self_ref: Weak<Self>,
}

impl<T: Send + 'static> ConcatMain<T> {
    fn advance(&self) {
        self.index.fetch_add(1, Ordering::AcqRel);
        self.subscribe_next();
    }

    // Trampoline: a chain of members that complete synchronously inside
    // `subscribe` is unrolled here instead of recursing.
    fn subscribe_next(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            if self.arbiter.is_cancelled() {
                return;
            }
            let index = self.index.load(Ordering::Acquire);
            if index >= self.sources.len() {
                match self.failures.take() {
                    Some(failure) => self.downstream.on_failure(failure),
                    None => self.downstream.on_complete(),
                }
                return;
            }
            if let Some(me) = self.self_ref.upgrade() {
                self.sources[index].subscribe(me);
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return;
            }
            missed = previous - missed;
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for ConcatMain<T> {
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
        if self.postpone_failure {
            self.failures.add(failure);
            self.advance();
        } else {
            self.downstream.on_failure(failure);
        }
    }

    fn on_complete(&self) {
        if !self.arbiter.is_cancelled() {
            self.advance();
        }
    }
}

impl<T: Send + 'static> Subscription for ConcatMain<T> {
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
