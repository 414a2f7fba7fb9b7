// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The fluent `Multi` handle.

use crate::into_stream::{into_stream, MultiStream};
use crate::uni::Uni;
use parking_lot::Mutex;
use rivulet_core::{Publisher, Result, RivuletError, Subscriber, Subscription, UNBOUNDED};
use rivulet_exec::{EmitOnOp, Executor};
use rivulet_operators::{
    CollectItemsOp, ConcatOp, EmptyPublisher, FailurePublisher, FilterOp, FlatMapConfig,
    FlatMapOp, FromIterPublisher, IgnoreOp, MapOp, Mapped, NeverPublisher, OnFailureResumeOp,
    OnOverflowBufferOp, OnOverflowDropOp, OnOverflowKeepLastOp, SkipOp, TakeLastOp, TakeOp,
    TakeWhileOp, TapCallbacks, TapOp, UniFromPublisherOp,
};
use std::sync::Arc;

/// A lazy, back-pressured stream of items.
///
/// A `Multi` is a thin handle over a publisher: nothing runs until
/// [`subscribe`](Multi::subscribe) is called, every subscription is
/// independent, and items only flow against downstream demand. Combinators
/// consume the handle and return a new one wrapping the composed publisher.
///
/// # Example
///
/// ```
/// use rivulet::Multi;
///
/// let doubled = Multi::from_iter(1..=3).map(|x| x * 2);
/// let collected = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
/// let sink = collected.clone();
/// doubled.subscribe_with(
///     move |item| sink.lock().push(item),
///     |failure| panic!("unexpected failure: {failure}"),
///     || {},
/// );
/// assert_eq!(*collected.lock(), vec![2, 4, 6]);
/// ```
pub struct Multi<T: Send + 'static> {
    publisher: Arc<dyn Publisher<T>>,
}

impl<T: Send + 'static> Clone for Multi<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<T: Send + 'static> Multi<T> {
    /// Wraps an existing publisher.
    pub fn from_publisher(publisher: Arc<dyn Publisher<T>>) -> Self {
        Self { publisher }
    }

    /// The underlying publisher.
    #[must_use]
    pub fn publisher(&self) -> Arc<dyn Publisher<T>> {
        Arc::clone(&self.publisher)
    }

    /// Stream over a cloneable collection; each subscription replays it.
    pub fn from_iter<C>(items: C) -> Self
    where
        C: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        C::IntoIter: Send + 'static,
    {
        Self::from_publisher(Arc::new(FromIterPublisher::new(items)))
    }

    /// Stream over the given items.
    pub fn from_items(items: Vec<T>) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iter(items)
    }

    /// Stream of exactly one item.
    pub fn item(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iter(vec![value])
    }

    /// Stream that completes immediately.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_publisher(Arc::new(EmptyPublisher::new()))
    }

    /// Stream that never emits and never terminates.
    #[must_use]
    pub fn never() -> Self {
        Self::from_publisher(Arc::new(NeverPublisher::new()))
    }

    /// Stream that fails immediately.
    pub fn failure(failure: RivuletError) -> Self {
        Self::from_publisher(Arc::new(FailurePublisher::new(failure)))
    }

    /// Transforms every item.
    pub fn map<O, F>(self, mapper: F) -> Multi<O>
    where
        O: Send + 'static,
        F: Fn(T) -> O + Send + Sync + 'static,
    {
        self.try_map(move |item| Ok(mapper(item)))
    }

    /// Transforms every item with a fallible mapper; an `Err` terminates
    /// the stream.
    pub fn try_map<O, F>(self, mapper: F) -> Multi<O>
    where
        O: Send + 'static,
        F: Fn(T) -> Result<O> + Send + Sync + 'static,
    {
        Multi::from_publisher(Arc::new(MapOp::new(self.publisher, mapper)))
    }

    /// Keeps only items matching the predicate.
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |item| Ok(predicate(item)))
    }

    /// Keeps only items matching a fallible predicate.
    pub fn try_filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Self::from_publisher(Arc::new(FilterOp::new(self.publisher, predicate)))
    }

    /// Limits the stream to its first `count` items.
    #[must_use]
    pub fn take(self, count: u64) -> Self {
        Self::from_publisher(Arc::new(TakeOp::new(self.publisher, count)))
    }

    /// Forwards items while the predicate holds.
    pub fn take_while<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_publisher(Arc::new(TakeWhileOp::new(self.publisher, move |item: &T| {
            Ok(predicate(item))
        })))
    }

    /// Retains only the last `count` items, replayed on completion.
    #[must_use]
    pub fn take_last(self, count: usize) -> Self {
        Self::from_publisher(Arc::new(TakeLastOp::new(self.publisher, count)))
    }

    /// Drops the first `count` items.
    #[must_use]
    pub fn skip(self, count: u64) -> Self {
        Self::from_publisher(Arc::new(SkipOp::new(self.publisher, count)))
    }

    /// Discards all items, forwarding only the terminal signal.
    #[must_use]
    pub fn ignore(self) -> Self {
        Self::from_publisher(Arc::new(IgnoreOp::new(self.publisher)))
    }

    /// Merges the streams produced for each item, with the default
    /// concurrency bound.
    pub fn flat_map<O, F>(self, mapper: F) -> Multi<O>
    where
        O: Send + 'static,
        F: Fn(T) -> Multi<O> + Send + Sync + 'static,
    {
        self.flat_map_with(FlatMapConfig::default(), move |item| {
            Ok(Some(Mapped::Publisher(mapper(item).publisher)))
        })
    }

    /// Merges with full control: configuration, fallible mapper, scalar
    /// short-circuit.
    pub fn flat_map_with<O, F>(self, config: FlatMapConfig, mapper: F) -> Multi<O>
    where
        O: Send + 'static,
        F: Fn(T) -> Result<Option<Mapped<O>>> + Send + Sync + 'static,
    {
        Multi::from_publisher(Arc::new(FlatMapOp::new(self.publisher, mapper, config)))
    }

    /// Subscribes to each source in turn, preserving order.
    pub fn concat(sources: Vec<Multi<T>>) -> Self {
        Self::from_publisher(Arc::new(ConcatOp::new(
            sources.into_iter().map(|multi| multi.publisher).collect(),
            false,
        )))
    }

    /// Like [`concat`](Multi::concat), but failing members do not stop the
    /// sequence; their failures surface after the last member.
    pub fn concat_collect_failures(sources: Vec<Multi<T>>) -> Self {
        Self::from_publisher(Arc::new(ConcatOp::new(
            sources.into_iter().map(|multi| multi.publisher).collect(),
            true,
        )))
    }

    /// Continues with `other` after this stream completes.
    #[must_use]
    pub fn concat_with(self, other: Multi<T>) -> Self {
        Self::concat(vec![self, other])
    }

    /// Moves downstream delivery onto `executor`.
    pub fn emit_on<E>(self, executor: E) -> Self
    where
        E: Executor + 'static,
    {
        Self::from_publisher(Arc::new(EmitOnOp::new(self.publisher, executor)))
    }

    /// Observes every signal of the subscription.
    pub fn tap(self, callbacks: TapCallbacks<T>) -> Self {
        Self::from_publisher(Arc::new(TapOp::new(self.publisher, callbacks)))
    }

    /// Switches to the stream chosen by `fallback` when this one fails.
    pub fn on_failure_resume<F>(self, fallback: F) -> Self
    where
        F: Fn(RivuletError) -> Multi<T> + Send + Sync + 'static,
    {
        Self::from_publisher(Arc::new(OnFailureResumeOp::new(
            self.publisher,
            move |failure| Ok(fallback(failure).publisher),
        )))
    }

    /// Buffers up to `capacity` undemanded items; overflow is a
    /// back-pressure failure.
    #[must_use]
    pub fn on_overflow_buffer(self, capacity: usize) -> Self {
        Self::from_publisher(Arc::new(OnOverflowBufferOp::new(self.publisher, capacity)))
    }

    /// Discards undemanded items.
    #[must_use]
    pub fn on_overflow_drop(self) -> Self {
        Self::from_publisher(Arc::new(OnOverflowDropOp::new(self.publisher)))
    }

    /// Discards undemanded items, handing each to `on_drop` first.
    pub fn on_overflow_drop_with<F>(self, on_drop: F) -> Self
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        Self::from_publisher(Arc::new(OnOverflowDropOp::with_callback(
            self.publisher,
            on_drop,
        )))
    }

    /// Keeps only the most recent undemanded item.
    #[must_use]
    pub fn on_overflow_keep_last(self) -> Self {
        Self::from_publisher(Arc::new(OnOverflowKeepLastOp::new(self.publisher)))
    }

    /// Binds `subscriber` to a fresh subscription.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.publisher.subscribe(subscriber);
    }

    /// Subscribes with callbacks and unbounded demand.
    pub fn subscribe_with<I, F, C>(&self, on_item: I, on_failure: F, on_complete: C)
    where
        I: Fn(T) + Send + Sync + 'static,
        F: Fn(RivuletError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(CallbackSubscriber {
            on_item,
            on_failure,
            on_complete,
            done: Mutex::new(false),
            _marker: std::marker::PhantomData,
        }));
    }

    /// Resolves to the first item of this stream.
    #[must_use]
    pub fn to_uni(self) -> Uni<T> {
        Uni::from_source(Arc::new(UniFromPublisherOp::new(self.publisher)))
    }

    /// Resolves to every item of this stream, collected in order.
    #[must_use]
    pub fn collect_items(self) -> Uni<Vec<T>> {
        Uni::from_source(Arc::new(CollectItemsOp::new(self.publisher)))
    }

    /// Bridges into a [`futures::Stream`](futures::Stream) of results.
    ///
    /// `capacity` bounds the in-flight items between the subscription and
    /// the stream consumer; one `request(1)` goes upstream per item pulled.
    #[must_use]
    pub fn into_stream(self, capacity: usize) -> MultiStream<T> {
        into_stream(&self, capacity)
    }
}

struct CallbackSubscriber<T, I, F, C> {
    on_item: I,
    on_failure: F,
    on_complete: C,
    done: Mutex<bool>,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, I, F, C> Subscriber<T> for CallbackSubscriber<T, I, F, C>
where
    T: Send + 'static,
    I: Fn(T) + Send + Sync + 'static,
    F: Fn(RivuletError) + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.request(UNBOUNDED);
    }

    fn on_next(&self, item: T) {
        if !*self.done.lock() {
            (self.on_item)(item);
        }
    }

    fn on_failure(&self, failure: RivuletError) {
        let mut done = self.done.lock();
        if !*done {
            *done = true;
            drop(done);
            (self.on_failure)(failure);
        }
    }

    fn on_complete(&self) {
        let mut done = self.done.lock();
        if !*done {
            *done = true;
            drop(done);
            (self.on_complete)();
        }
    }
}
