// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The fluent `Uni` handle.

use parking_lot::Mutex;
use rivulet_core::{Cancellable, RivuletError, UniSubscriber};
use rivulet_operators::UniSource;
use std::sync::Arc;

/// A lazy, single-value pipeline: it resolves to one optional item or one
/// failure.
///
/// Like [`Multi`](crate::Multi), a `Uni` does nothing until subscribed and
/// every subscription is an independent resolution. There is no demand —
/// subscribing implies interest in the one result — so the subscriber only
/// receives a cancellation handle.
pub struct Uni<T: Send + 'static> {
    source: Arc<dyn UniSource<T>>,
}

impl<T: Send + 'static> Clone for Uni<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Send + 'static> Uni<T> {
    /// Wraps an existing single-value source.
    pub fn from_source(source: Arc<dyn UniSource<T>>) -> Self {
        Self { source }
    }

    /// Binds `subscriber` to a fresh resolution.
    pub fn subscribe(&self, subscriber: Arc<dyn UniSubscriber<T>>) {
        self.source.subscribe_uni(subscriber);
    }

    /// Subscribes with callbacks for the two terminal outcomes.
    pub fn subscribe_with<I, F>(&self, on_item: I, on_failure: F)
    where
        I: Fn(Option<T>) + Send + Sync + 'static,
        F: Fn(RivuletError) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(CallbackUniSubscriber {
            on_item,
            on_failure,
            done: Mutex::new(false),
            _marker: std::marker::PhantomData,
        }));
    }
}

struct CallbackUniSubscriber<T, I, F> {
    on_item: I,
    on_failure: F,
    done: Mutex<bool>,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, I, F> UniSubscriber<T> for CallbackUniSubscriber<T, I, F>
where
    T: Send + 'static,
    I: Fn(Option<T>) + Send + Sync + 'static,
    F: Fn(RivuletError) + Send + Sync + 'static,
{
    fn on_subscribe(&self, _cancellation: Arc<dyn Cancellable>) {}

    fn on_item(&self, item: Option<T>) {
        let mut done = self.done.lock();
        if !*done {
            *done = true;
            drop(done);
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
}
