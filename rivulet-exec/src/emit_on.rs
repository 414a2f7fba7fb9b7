// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Emit-on operator: hands every downstream signal off to an executor.
//!
//! Upstream signals park in a fixed-capacity queue; the drain runs as a
//! task on the executor, so downstream delivery never happens on the
//! producer's thread and never races with it. The drain is serialized by
//! the usual work-in-progress counter; scheduling submits one task when the
//! counter moves 0→1 and every later signal only increments it.

use crate::executor::Executor;
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use rivulet_core::demand::{add_request, subtract_produced, UNBOUNDED};
use rivulet_core::{
    Publisher, RivuletError, SerializedSubscriber, Subscriber, Subscription, UpstreamSlot,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

// Hand-off queue capacity; doubles as the upstream replenish batch size.
const QUEUE_CAPACITY: usize = 16;
const LIMIT: u64 = QUEUE_CAPACITY as u64;

/// Moves downstream delivery onto `executor`.
///
/// The upstream is requested [`QUEUE_CAPACITY`] items up front and
/// replenished one batch at a time as the drain consumes them; a source
/// that outruns this allowance overflows the hand-off queue, which cancels
/// the upstream and surfaces a back-pressure failure.
pub struct EmitOnOp<T, E> {
    source: Arc<dyn Publisher<T>>,
    executor: Arc<E>,
}

impl<T, E> EmitOnOp<T, E>
where
    T: Send + 'static,
    E: Executor + 'static,
{
    pub fn new(source: Arc<dyn Publisher<T>>, executor: E) -> Self {
        Self {
            source,
            executor: Arc::new(executor),
        }
    }
}

impl<T, E> Publisher<T> for EmitOnOp<T, E>
where
    T: Send + 'static,
    E: Executor + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let processor = Arc::new_cyclic(|weak: &Weak<EmitOnProcessor<T, E>>| EmitOnProcessor {
            downstream: SerializedSubscriber::new(subscriber),
            executor: Arc::clone(&self.executor),
            upstream: UpstreamSlot::new(),
            queue: ArrayQueue::new(QUEUE_CAPACITY),
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            produced: AtomicU64::new(0),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            failure: Mutex::new(None),
            self_ref: weak.clone(),
        });
        self.source.subscribe(processor);
    }
}

struct EmitOnProcessor<T: Send + 'static, E> {
    downstream: Arc<SerializedSubscriber<T>>,
    executor: Arc<E>,
    upstream: UpstreamSlot,
    queue: ArrayQueue<T>,
    requested: AtomicU64,
    wip: AtomicUsize,
    // Items emitted since the last upstream replenish batch. Only the
    // drain task touches it.
    produced: AtomicU64,
    done: AtomicBool,
    cancelled: AtomicBool,
    failure: Mutex<Option<RivuletError>>,
    self_ref: Weak<Self>,
}

impl<T, E> EmitOnProcessor<T, E>
where
    T: Send + 'static,
    E: Executor + 'static,
{
    fn is_halted(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire)
    }

    // Submits the drain task when this signal is the one that found the
    // counter at zero.
    fn schedule(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let Some(me) = self.self_ref.upgrade() else {
            return;
        };
        if self.executor.execute(Box::new(move || me.run())).is_err() {
            self.cancelled.store(true, Ordering::Release);
            self.upstream.cancel();
            while self.queue.pop().is_some() {}
            crate::error!("executor rejected the emit-on drain task");
            self.downstream.on_failure(RivuletError::rejected_execution(
                "emit-on executor refused the drain task",
            ));
        }
    }

    // The drain task body, running on the executor.
    fn run(&self) {
        let mut missed = 1;
        loop {
            loop {
                if self.cancelled.load(Ordering::Acquire) {
                    while self.queue.pop().is_some() {}
                    return;
                }
                // Demand not yet consumed by an unsubtracted batch.
                let pending = self.produced.load(Ordering::Acquire);
                let outstanding = self.requested.load(Ordering::Acquire);
                if outstanding != UNBOUNDED && outstanding <= pending {
                    break;
                }
                let Some(item) = self.queue.pop() else {
                    break;
                };
                self.downstream.on_next(item);
                let produced = pending + 1;
                if produced == LIMIT {
                    self.produced.store(0, Ordering::Release);
                    subtract_produced(&self.requested, LIMIT);
                    if !self.done.load(Ordering::Acquire) {
                        self.upstream.request(LIMIT);
                    }
                } else {
                    self.produced.store(produced, Ordering::Release);
                }
            }
            if self.done.load(Ordering::Acquire) && self.queue.is_empty() {
                match self.failure.lock().take() {
                    Some(failure) => self.downstream.on_failure(failure),
                    None => self.downstream.on_complete(),
                }
                return;
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            if previous == missed {
                return;
            }
            missed = previous - missed;
        }
    }
}

impl<T, E> Subscriber<T> for EmitOnProcessor<T, E>
where
    T: Send + 'static,
    E: Executor + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(LIMIT);
        }
    }

    fn on_next(&self, item: T) {
        if self.is_halted() {
            return;
        }
        if self.queue.push(item).is_err() {
            // The source ignored the replenish discipline.
            self.upstream.cancel();
            *self.failure.lock() = Some(RivuletError::back_pressure(format!(
                "emit-on hand-off queue of {QUEUE_CAPACITY} items saturated"
            )));
            self.done.store(true, Ordering::Release);
        }
        self.schedule();
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.is_halted() {
            crate::debug!("dropping upstream failure, emit-on already terminal");
            return;
        }
        *self.failure.lock() = Some(failure);
        self.done.store(true, Ordering::Release);
        self.schedule();
    }

    fn on_complete(&self) {
        if self.is_halted() {
            return;
        }
        self.done.store(true, Ordering::Release);
        self.schedule();
    }
}

impl<T, E> Subscription for EmitOnProcessor<T, E>
where
    T: Send + 'static,
    E: Executor + 'static,
{
    fn request(&self, n: u64) {
        if n == 0 {
            self.cancel();
            self.downstream.on_failure(RivuletError::zero_request());
            return;
        }
        add_request(&self.requested, n);
        self.schedule();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.upstream.cancel();
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            while self.queue.pop().is_some() {}
        }
    }
}
