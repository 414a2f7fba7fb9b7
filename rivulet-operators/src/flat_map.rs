// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Flat-map / merge engine.
//!
//! Every upstream item is mapped to an inner source; up to
//! `max_concurrency` inners are subscribed at once and their outputs are
//! serialized downstream through one drain loop. Emission takes a fast path
//! when the drain is idle and demand is available; otherwise items park in
//! per-inner bounded queues (or, for scalar results, a shared main queue)
//! until the drain moves them. Failures surface immediately or, with
//! `postpone_failure`, only after every live inner has drained.
//!
//! The drain is serialized by a work-in-progress counter: the thread that
//! moves it 0→1 owns the loop, every other signal just increments it and
//! the owner re-runs until the count returns to zero. Delivering a terminal
//! exits the loop without the final decrement, which permanently parks the
//! counter above zero and turns every later entry attempt into a no-op.

use crate::failures::Failures;
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use rivulet_core::demand::{add_request, clamp_to_demand, subtract_produced};
use rivulet_core::{
    Publisher, Result, RivuletError, SerializedSubscriber, Subscriber, Subscription,
    UpstreamSlot,
};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// What the mapper hands back for one upstream item.
pub enum Mapped<O: Send + 'static> {
    /// A full inner source, subscribed with bounded prefetch.
    Publisher(Arc<dyn Publisher<O>>),
    /// An immediate item that skips inner subscription entirely and goes
    /// through the main queue instead.
    Scalar(O),
}

/// Tuning knobs of the merge engine.
#[derive(Clone, Copy)]
pub struct FlatMapConfig {
    /// Upper bound on simultaneously subscribed inner sources. Doubles as
    /// the inner prefetch amount.
    pub max_concurrency: usize,
    /// Accumulate failures and surface them only after all inners drained.
    pub postpone_failure: bool,
    /// Capacity of the lazily-created queue for scalar results.
    pub main_queue_capacity: usize,
    /// Capacity of each lazily-created per-inner queue.
    pub inner_queue_capacity: usize,
}

impl FlatMapConfig {
    /// Default configuration with the given concurrency bound.
    #[must_use]
    pub fn concurrency(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn postpone_failure(mut self, postpone: bool) -> Self {
        self.postpone_failure = postpone;
        self
    }
}

impl Default for FlatMapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 128,
            postpone_failure: false,
            main_queue_capacity: 128,
            inner_queue_capacity: 128,
        }
    }
}

/// The merge operator itself.
pub struct FlatMapOp<I, O, F>
where
    O: Send + 'static,
{
    source: Arc<dyn Publisher<I>>,
    mapper: Arc<F>,
    config: FlatMapConfig,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FlatMapOp<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn Publisher<I>>, mapper: F, config: FlatMapConfig) -> Self {
        assert!(
            config.max_concurrency > 0,
            "max_concurrency must be strictly positive"
        );
        assert!(
            config.main_queue_capacity > 0 && config.inner_queue_capacity > 0,
            "queue capacities must be strictly positive"
        );
        Self {
            source,
            mapper: Arc::new(mapper),
            config,
            _marker: PhantomData,
        }
    }
}

impl<I, O, F> Publisher<O> for FlatMapOp<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<O>>) {
        let prefetch = self.config.max_concurrency;
        let main = Arc::new_cyclic(|weak: &Weak<FlatMapMain<I, O, F>>| FlatMapMain {
            downstream: SerializedSubscriber::new(subscriber),
            mapper: Arc::clone(&self.mapper),
            max_concurrency: self.config.max_concurrency,
            postpone_failure: self.config.postpone_failure,
            prefetch,
            inner_queue_capacity: self.config.inner_queue_capacity,
            main_queue_capacity: self.config.main_queue_capacity,
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            upstream: UpstreamSlot::new(),
            inners: InnerRegistry::new(),
            main_queue: OnceLock::new(),
            failures: Failures::new(),
            last_index: AtomicUsize::new(0),
            self_ref: weak.clone(),
            _marker: PhantomData,
        });
        self.source.subscribe(main);
    }
}

// Callbacks an inner uses to reach its parent without owning it.
trait InnerParent<O: Send + 'static>: Send + Sync {
    fn try_emit(&self, inner: &FlatMapInner<O>, item: O);
    fn inner_failure(&self, inner: &FlatMapInner<O>, failure: RivuletError);
    fn inner_complete(&self, inner: &FlatMapInner<O>);
}

struct FlatMapMain<I, O, F>
where
    O: Send + 'static,
{
    downstream: Arc<SerializedSubscriber<O>>,
    mapper: Arc<F>,
    max_concurrency: usize,
    postpone_failure: bool,
    prefetch: usize,
    inner_queue_capacity: usize,
    main_queue_capacity: usize,
    requested: AtomicU64,
    wip: AtomicUsize,
    done: AtomicBool,
    cancelled: AtomicBool,
    upstream: UpstreamSlot,
    inners: InnerRegistry<O>,
    main_queue: OnceLock<ArrayQueue<O>>,
    failures: Failures,
    last_index: AtomicUsize,
    self_ref: Weak<Self>,
    _marker: PhantomData<fn(I)>,
}

impl<I, O, F> FlatMapMain<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
{
    fn main_queue(&self) -> &ArrayQueue<O> {
        self.main_queue
            .get_or_init(|| ArrayQueue::new(self.main_queue_capacity))
    }

    fn main_queue_is_empty(&self) -> bool {
        self.main_queue.get().map_or(true, ArrayQueue::is_empty)
    }

    // A mapper failure terminates the whole merge through the drain.
    fn map_failure(&self, failure: RivuletError) {
        if !self.failures.add(failure) {
            crate::debug!("dropping mapper failure, terminal already delivered");
        }
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
        self.drain();
    }

    fn try_emit_scalar(&self, item: O) {
        if self
            .wip
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let outstanding = self.requested.load(Ordering::Acquire);
            let mut overflowed = false;
            if outstanding > 0 && self.main_queue_is_empty() {
                self.downstream.on_next(item);
                subtract_produced(&self.requested, 1);
                // The scalar freed one upstream slot.
                if !self.done.load(Ordering::Acquire) {
                    self.upstream.request(1);
                }
            } else if self.main_queue().push(item).is_err() {
                self.main_overflow();
                overflowed = true;
            }
            if !overflowed && self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
            self.drain_loop();
        } else {
            if self.main_queue().push(item).is_err() {
                self.main_overflow();
            }
            self.drain();
        }
    }

    fn main_overflow(&self) {
        self.failures.add(RivuletError::back_pressure(
            "scalar queue saturated despite bounded upstream demand",
        ));
        self.done.store(true, Ordering::Release);
        self.upstream.cancel();
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.drain_loop();
        }
    }

    // Owner-only cleanup: clear the main queue, cancel the upstream and
    // every live inner.
    fn release(&self) {
        if let Some(queue) = self.main_queue.get() {
            while queue.pop().is_some() {}
        }
        self.upstream.cancel();
        for inner in self.inners.terminate() {
            inner.terminate(true);
        }
    }

    // Returns true when the subscription is over; the caller then leaves
    // the drain without the final WIP decrement.
    fn check_terminated(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            self.release();
            return true;
        }
        if !self.postpone_failure && self.failures.has_pending() {
            if let Some(failure) = self.failures.take() {
                self.release();
                self.downstream.on_failure(failure);
            }
            return true;
        }
        if self.done.load(Ordering::Acquire)
            && self.main_queue_is_empty()
            && self.inners.live() == 0
        {
            match self.failures.take() {
                Some(failure) => self.downstream.on_failure(failure),
                None => self.downstream.on_complete(),
            }
            return true;
        }
        false
    }

    fn drain_loop(&self) {
        let mut missed = 1;
        loop {
            if self.check_terminated() {
                return;
            }

            let mut replenish = 0u64;
            let mut outstanding = self.requested.load(Ordering::Acquire);

            // Scalar results queued in the main queue go first.
            if let Some(queue) = self.main_queue.get() {
                while outstanding > 0 && !self.cancelled.load(Ordering::Acquire) {
                    let Some(item) = queue.pop() else {
                        break;
                    };
                    self.downstream.on_next(item);
                    outstanding = subtract_produced(&self.requested, 1);
                    replenish += 1;
                }
            }

            // One round-robin cycle over the inner registry, resuming at
            // the saved cursor.
            let slots = self.inners.snapshot();
            let slot_count = slots.len();
            if slot_count > 0 {
                let mut index = self.last_index.load(Ordering::Acquire);
                if index >= slot_count {
                    index = 0;
                }
                for _ in 0..slot_count {
                    if outstanding == 0 || self.cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    if let Some(inner) = &slots[index] {
                        let mut consumed = 0u64;
                        while outstanding > 0 && !self.cancelled.load(Ordering::Acquire) {
                            let Some(item) = inner.poll() else {
                                break;
                            };
                            self.downstream.on_next(item);
                            outstanding = subtract_produced(&self.requested, 1);
                            consumed += 1;
                        }
                        if consumed > 0 {
                            inner.request_more(consumed);
                        }
                        if inner.is_done() && inner.queue_is_empty() {
                            self.inners.remove(inner.slot_index());
                            replenish += 1;
                        }
                    }
                    index = (index + 1) % slot_count;
                }
                self.last_index.store(index, Ordering::Release);
            }

            // Demand ran out before the cycle finished: sweep out inners
            // the cycle could not visit.
            if outstanding == 0 {
                for slot in self.inners.snapshot() {
                    if let Some(inner) = slot {
                        if inner.is_done() && inner.queue_is_empty() {
                            self.inners.remove(inner.slot_index());
                            replenish += 1;
                        }
                    }
                }
            }

            // One freed inner slot is one more upstream item.
            if replenish > 0
                && !self.done.load(Ordering::Acquire)
                && !self.cancelled.load(Ordering::Acquire)
            {
                self.upstream.request(replenish);
            }

            // The pass may have emptied the last inner; re-check before
            // parking.
            if self.check_terminated() {
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

impl<I, O, F> Subscriber<I> for FlatMapMain<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            if let Some(me) = self.self_ref.upgrade() {
                self.downstream.on_subscribe(me);
            }
            subscription.request(clamp_to_demand(self.max_concurrency));
        }
    }

    fn on_next(&self, item: I) {
        if self.done.load(Ordering::Acquire) || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let mapped = match (self.mapper)(item) {
            Ok(Some(mapped)) => mapped,
            Ok(None) => {
                self.map_failure(RivuletError::protocol_violation(
                    "mapper returned no inner source",
                ));
                return;
            }
            Err(failure) => {
                self.map_failure(failure);
                return;
            }
        };
        match mapped {
            Mapped::Scalar(item) => self.try_emit_scalar(item),
            Mapped::Publisher(publisher) => {
                let parent: Weak<dyn InnerParent<O>> = self.self_ref.clone();
                let inner = FlatMapInner::new(parent, self.prefetch, self.inner_queue_capacity);
                if self.inners.add(&inner) {
                    publisher.subscribe(inner);
                }
            }
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if !self.failures.add(failure) {
            crate::debug!("dropping upstream failure, terminal already delivered");
            return;
        }
        self.done.store(true, Ordering::Release);
        self.drain();
    }

    fn on_complete(&self) {
        self.done.store(true, Ordering::Release);
        self.drain();
    }
}

impl<I, O, F> InnerParent<O> for FlatMapMain<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
{
    fn try_emit(&self, inner: &FlatMapInner<O>, item: O) {
        if self
            .wip
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // Fast path: the drain is idle, demand is available and no
            // earlier item of this inner is parked.
            let outstanding = self.requested.load(Ordering::Acquire);
            let mut overflowed = false;
            if outstanding > 0 && inner.queue_is_empty() {
                self.downstream.on_next(item);
                subtract_produced(&self.requested, 1);
                inner.request_more(1);
            } else if !inner.offer(item) {
                self.failures.add(RivuletError::back_pressure(
                    "inner queue saturated despite bounded prefetch",
                ));
                inner.mark_done();
                overflowed = true;
            }
            if !overflowed && self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
            self.drain_loop();
        } else {
            if !inner.offer(item) {
                self.failures.add(RivuletError::back_pressure(
                    "inner queue saturated despite bounded prefetch",
                ));
                inner.mark_done();
            }
            self.drain();
        }
    }

    fn inner_failure(&self, inner: &FlatMapInner<O>, failure: RivuletError) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if !self.failures.add(failure) {
            crate::debug!("dropping inner failure, terminal already delivered");
            return;
        }
        inner.mark_done();
        if !self.postpone_failure {
            // First failure tears the whole merge down.
            self.upstream.cancel();
            self.done.store(true, Ordering::Release);
        }
        self.drain();
    }

    fn inner_complete(&self, inner: &FlatMapInner<O>) {
        inner.mark_done();
        self.drain();
    }
}

impl<I, O, F> Subscription for FlatMapMain<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
{
    fn request(&self, n: u64) {
        if n == 0 {
            self.cancel();
            self.downstream.on_failure(RivuletError::zero_request());
            return;
        }
        add_request(&self.requested, n);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            self.release();
        }
    }
}

struct FlatMapInner<O: Send + 'static> {
    parent: Weak<dyn InnerParent<O>>,
    index: AtomicUsize,
    prefetch: usize,
    // Replenish threshold: request more once 75% of the prefetch was
    // consumed.
    limit: u64,
    consumed: AtomicU64,
    queue_capacity: usize,
    queue: OnceLock<ArrayQueue<O>>,
    upstream: UpstreamSlot,
    done: AtomicBool,
}

impl<O: Send + 'static> FlatMapInner<O> {
    fn new(parent: Weak<dyn InnerParent<O>>, prefetch: usize, queue_capacity: usize) -> Arc<Self> {
        let limit = clamp_to_demand(prefetch - prefetch / 4);
        Arc::new(Self {
            parent,
            index: AtomicUsize::new(0),
            prefetch,
            limit,
            consumed: AtomicU64::new(0),
            queue_capacity,
            queue: OnceLock::new(),
            upstream: UpstreamSlot::new(),
            done: AtomicBool::new(false),
        })
    }

    fn queue(&self) -> &ArrayQueue<O> {
        self.queue
            .get_or_init(|| ArrayQueue::new(self.queue_capacity))
    }

    fn queue_is_empty(&self) -> bool {
        self.queue.get().map_or(true, ArrayQueue::is_empty)
    }

    fn offer(&self, item: O) -> bool {
        self.queue().push(item).is_ok()
    }

    fn poll(&self) -> Option<O> {
        self.queue.get().and_then(ArrayQueue::pop)
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    fn slot_index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    // Accumulates drained items and replenishes the inner upstream in
    // batches once the threshold is crossed. Only called under the parent's
    // drain serialization.
    fn request_more(&self, n: u64) {
        let consumed = self.consumed.fetch_add(n, Ordering::AcqRel) + n;
        if consumed >= self.limit {
            self.consumed.fetch_sub(consumed, Ordering::AcqRel);
            self.upstream.request(consumed);
        }
    }

    /// Stops this inner. `cancel_upstream` distinguishes a forced teardown
    /// (live upstream that must be cancelled) from the removal of an inner
    /// whose upstream already terminated.
    fn terminate(&self, cancel_upstream: bool) {
        self.mark_done();
        if cancel_upstream {
            self.upstream.cancel();
        } else {
            self.upstream.mark_terminated();
        }
        if let Some(queue) = self.queue.get() {
            while queue.pop().is_some() {}
        }
    }
}

impl<O: Send + 'static> Subscriber<O> for FlatMapInner<O> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)) {
            subscription.request(clamp_to_demand(self.prefetch));
        }
    }

    fn on_next(&self, item: O) {
        if self.is_done() {
            return;
        }
        if let Some(parent) = self.parent.upgrade() {
            parent.try_emit(self, item);
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        if self.is_done() {
            crate::debug!("dropping inner failure received after termination");
            return;
        }
        self.upstream.mark_terminated();
        if let Some(parent) = self.parent.upgrade() {
            parent.inner_failure(self, failure);
        }
    }

    fn on_complete(&self) {
        if self.is_done() {
            return;
        }
        self.upstream.mark_terminated();
        if let Some(parent) = self.parent.upgrade() {
            parent.inner_complete(self);
        }
    }
}

struct RegistryState<O: Send + 'static> {
    slots: Vec<Option<Arc<FlatMapInner<O>>>>,
    live: usize,
    terminated: bool,
}

// Array-backed set of live inners with slot reuse. The lock covers only
// membership changes and snapshots; queue traffic never goes through it.
struct InnerRegistry<O: Send + 'static> {
    state: Mutex<RegistryState<O>>,
}

impl<O: Send + 'static> InnerRegistry<O> {
    fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                slots: Vec::new(),
                live: 0,
                terminated: false,
            }),
        }
    }

    fn add(&self, inner: &Arc<FlatMapInner<O>>) -> bool {
        let mut state = self.state.lock();
        if state.terminated {
            return false;
        }
        let index = match state.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                state.slots.push(None);
                state.slots.len() - 1
            }
        };
        inner.index.store(index, Ordering::Release);
        state.slots[index] = Some(Arc::clone(inner));
        state.live += 1;
        true
    }

    fn remove(&self, index: usize) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        if let Some(slot) = state.slots.get_mut(index) {
            if slot.take().is_some() {
                state.live -= 1;
            }
        }
    }

    fn snapshot(&self) -> Vec<Option<Arc<FlatMapInner<O>>>> {
        self.state.lock().slots.clone()
    }

    fn live(&self) -> usize {
        self.state.lock().live
    }

    fn terminate(&self) -> Vec<Arc<FlatMapInner<O>>> {
        let mut state = self.state.lock();
        state.terminated = true;
        state.live = 0;
        state.slots.drain(..).flatten().collect()
    }
}
