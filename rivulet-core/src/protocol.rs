// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The subscription protocol: publishers, subscribers and subscriptions.
//!
//! A [`Publisher`] is a lazy factory of subscriptions: nothing happens until a
//! [`Subscriber`] is handed to [`Publisher::subscribe`], and every call
//! produces an independent subscription. The subscriber then receives signals
//! in strict order:
//!
//! 1. `on_subscribe` — exactly once, first, carrying the [`Subscription`]
//!    handle used to signal demand and cancellation back upstream.
//! 2. `on_next` — zero or more items, each covered by previously requested
//!    demand.
//! 3. `on_complete` *or* `on_failure` — at most one, terminal.
//!
//! All trait methods take `&self`: processor objects are shared through
//! `Arc` and play the subscriber and subscription roles at the same time,
//! carrying their mutable state in atomics and short-lived locks.

use crate::error::RivuletError;
use std::sync::Arc;

/// The demand-and-cancellation handle held by a subscriber.
pub trait Subscription: Send + Sync {
    /// Authorizes the upstream to deliver `n` more items.
    ///
    /// `n` must be strictly positive; `request(0)` is a protocol violation
    /// and results in a failure delivered to the subscriber. Demand
    /// accumulates with saturating arithmetic up to
    /// [`UNBOUNDED`](crate::demand::UNBOUNDED), which is sticky.
    fn request(&self, n: u64);

    /// Stops the subscription.
    ///
    /// Idempotent and safe to invoke from any thread at any time. After
    /// cancellation no further `on_next`, `on_complete` or `on_failure`
    /// reaches the subscriber; in-flight emissions may still complete.
    fn cancel(&self);
}

/// A sink for the signals of one subscription.
pub trait Subscriber<T: Send + 'static>: Send + Sync {
    /// Delivers the subscription handle. Called exactly once, before any
    /// other signal.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Delivers one item. Only called under previously requested demand.
    fn on_next(&self, item: T);

    /// Terminal failure. Mutually exclusive with `on_complete`.
    fn on_failure(&self, failure: RivuletError);

    /// Terminal completion. Mutually exclusive with `on_failure`.
    fn on_complete(&self);
}

/// A lazy source of items.
///
/// Implementations must deliver `on_subscribe` to the given subscriber
/// before any other signal, and must treat every `subscribe` call as an
/// independent subscription.
pub trait Publisher<T: Send + 'static>: Send + Sync {
    /// Binds `subscriber` to a fresh subscription of this source.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// The cancellation-only handle of a single-value subscription.
///
/// A `Uni` pipeline carries no demand (the one result is implicitly
/// requested), so its subscriber receives this reduced handle instead of a
/// full [`Subscription`].
pub trait Cancellable: Send + Sync {
    /// Abandons interest in the result. Idempotent.
    fn cancel(&self);
}

/// A sink for the outcome of a single-value pipeline.
///
/// Exactly one of `on_item` / `on_failure` is delivered, after
/// `on_subscribe`. An empty upstream is reported as `on_item(None)`.
pub trait UniSubscriber<T: Send + 'static>: Send + Sync {
    /// Delivers the cancellation handle. Called exactly once, first.
    fn on_subscribe(&self, cancellation: Arc<dyn Cancellable>);

    /// Terminal result: the item, or `None` when the upstream completed
    /// empty.
    fn on_item(&self, item: Option<T>);

    /// Terminal failure.
    fn on_failure(&self, failure: RivuletError);
}
