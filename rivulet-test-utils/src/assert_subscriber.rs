// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A recording subscriber for protocol-level assertions.

use event_listener::Event;
use parking_lot::Mutex;
use rivulet_core::{RivuletError, Subscriber, Subscription, UpstreamSlot, UNBOUNDED};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Recorded<T> {
    items: Vec<T>,
    failure: Option<RivuletError>,
    completed: bool,
    subscribe_count: usize,
}

/// Subscriber that records every signal it receives and lets tests await
/// signal arrival.
///
/// The subscriber requests `initial_request` items as soon as it is
/// subscribed; further demand is signalled through [`request`].
///
/// [`request`]: AssertSubscriber::request
///
/// # Example
///
/// ```
/// use rivulet_test_utils::AssertSubscriber;
///
/// let subscriber = AssertSubscriber::<i32>::unbounded();
/// // publisher.subscribe(subscriber.clone());
/// subscriber.assert_not_terminated();
/// ```
pub struct AssertSubscriber<T: Send + 'static> {
    state: Mutex<Recorded<T>>,
    upstream: UpstreamSlot,
    initial_request: u64,
    event: Event,
}

impl<T: Send + 'static> AssertSubscriber<T> {
    /// Creates a subscriber that requests `initial_request` on subscription.
    #[must_use]
    pub fn new(initial_request: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Recorded {
                items: Vec::new(),
                failure: None,
                completed: false,
                subscribe_count: 0,
            }),
            upstream: UpstreamSlot::new(),
            initial_request,
            event: Event::new(),
        })
    }

    /// Creates a subscriber with unbounded upfront demand.
    #[must_use]
    pub fn unbounded() -> Arc<Self> {
        Self::new(UNBOUNDED)
    }

    /// Requests `n` more items from the upstream.
    pub fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    /// Cancels the upstream subscription.
    pub fn cancel(&self) {
        self.upstream.cancel();
    }

    /// Number of `on_subscribe` signals received.
    pub fn subscribe_count(&self) -> usize {
        self.state.lock().subscribe_count
    }

    pub fn item_count(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn is_terminated(&self) -> bool {
        let state = self.state.lock();
        state.completed || state.failure.is_some()
    }

    pub fn failure(&self) -> Option<RivuletError> {
        self.state.lock().failure.clone()
    }

    fn notify(&self) {
        self.event.notify(usize::MAX);
    }

    /// Waits until at least `n` items have arrived, panicking after
    /// `timeout_ms` milliseconds.
    pub async fn await_item_count(&self, n: usize, timeout_ms: u64) {
        self.await_condition(timeout_ms, &format!("{n} items"), |s| s.items.len() >= n)
            .await;
    }

    /// Waits for a terminal signal, panicking after `timeout_ms`
    /// milliseconds.
    pub async fn await_terminal(&self, timeout_ms: u64) {
        self.await_condition(timeout_ms, "a terminal signal", |s| {
            s.completed || s.failure.is_some()
        })
        .await;
    }

    async fn await_condition(
        &self,
        timeout_ms: u64,
        what: &str,
        condition: impl Fn(&Recorded<T>) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if condition(&self.state.lock()) {
                return;
            }
            let listener = self.event.listen();
            // Re-check after registering to close the notify race.
            if condition(&self.state.lock()) {
                return;
            }
            let now = Instant::now();
            if now >= deadline
                || tokio::time::timeout(deadline - now, listener).await.is_err()
            {
                panic!("timed out after {timeout_ms}ms waiting for {what}");
            }
        }
    }
}

impl<T: Send + Clone + 'static> AssertSubscriber<T> {
    /// Snapshot of the items received so far.
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }
}

impl<T: Send + Clone + PartialEq + std::fmt::Debug + 'static> AssertSubscriber<T> {
    /// Asserts the exact item sequence received so far.
    pub fn assert_items(&self, expected: &[T]) {
        assert_eq!(self.state.lock().items.as_slice(), expected);
    }
}

impl<T: Send + 'static> AssertSubscriber<T> {
    /// Asserts a clean completion with no failure.
    pub fn assert_completed(&self) {
        let state = self.state.lock();
        assert!(
            state.completed,
            "expected completion, failure = {:?}",
            state.failure
        );
    }

    /// Asserts that a failure terminal arrived, returning it.
    pub fn assert_failure(&self) -> RivuletError {
        let state = self.state.lock();
        assert!(!state.completed, "expected a failure but stream completed");
        state
            .failure
            .clone()
            .expect("expected a failure but none arrived")
    }

    /// Asserts that no terminal signal has arrived.
    pub fn assert_not_terminated(&self) {
        let state = self.state.lock();
        assert!(!state.completed, "unexpected completion");
        assert!(state.failure.is_none(), "unexpected failure: {:?}", state.failure);
    }
}

impl<T: Send + 'static> Subscriber<T> for AssertSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.state.lock().subscribe_count += 1;
        let first = self.upstream.set(Arc::clone(&subscription));
        if first && self.initial_request > 0 {
            subscription.request(self.initial_request);
        }
        self.notify();
    }

    fn on_next(&self, item: T) {
        self.state.lock().items.push(item);
        self.notify();
    }

    fn on_failure(&self, failure: RivuletError) {
        self.state.lock().failure = Some(failure);
        self.notify();
    }

    fn on_complete(&self) {
        self.state.lock().completed = true;
        self.notify();
    }
}
