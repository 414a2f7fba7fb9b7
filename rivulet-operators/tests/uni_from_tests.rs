// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use parking_lot::Mutex;
use rivulet_core::{Cancellable, RivuletError, UniSubscriber};
use rivulet_operators::{CollectItemsOp, FromIterPublisher, UniFromPublisherOp};
use rivulet_test_utils::{ControlledPublisher, TestError};
use std::sync::Arc;

struct RecordingUniSubscriber<T: Send + 'static> {
    outcome: Mutex<Option<Result<Option<T>, RivuletError>>>,
    cancellation: Mutex<Option<Arc<dyn Cancellable>>>,
}

impl<T: Send + 'static> RecordingUniSubscriber<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            cancellation: Mutex::new(None),
        })
    }

    fn cancel(&self) {
        if let Some(cancellation) = self.cancellation.lock().clone() {
            cancellation.cancel();
        }
    }
}

impl<T: Send + 'static> UniSubscriber<T> for RecordingUniSubscriber<T> {
    fn on_subscribe(&self, cancellation: Arc<dyn Cancellable>) {
        *self.cancellation.lock() = Some(cancellation);
    }

    fn on_item(&self, item: Option<T>) {
        let mut outcome = self.outcome.lock();
        assert!(outcome.is_none(), "second terminal delivered");
        *outcome = Some(Ok(item));
    }

    fn on_failure(&self, failure: RivuletError) {
        let mut outcome = self.outcome.lock();
        assert!(outcome.is_none(), "second terminal delivered");
        *outcome = Some(Err(failure));
    }
}

#[test]
fn test_first_item_resolves_and_cancels_upstream() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = UniFromPublisherOp::new(Arc::new(source.clone()));
    let subscriber = RecordingUniSubscriber::<i32>::new();
    operator.subscribe(subscriber.clone());

    // Assert - the adapter asked for exactly one item
    assert_eq!(source.requests(), vec![1]);

    // Act
    source.emit(42);
    source.emit(43);

    // Assert
    assert!(matches!(*subscriber.outcome.lock(), Some(Ok(Some(42)))));
    assert!(source.is_cancelled());
}

#[test]
fn test_empty_completion_resolves_to_no_item() {
    let source = ControlledPublisher::<i32>::new();
    let operator = UniFromPublisherOp::new(Arc::new(source.clone()));
    let subscriber = RecordingUniSubscriber::<i32>::new();
    operator.subscribe(subscriber.clone());

    source.complete();

    assert!(matches!(*subscriber.outcome.lock(), Some(Ok(None))));
}

#[test]
fn test_failure_resolves_to_failure() {
    let source = ControlledPublisher::<i32>::new();
    let operator = UniFromPublisherOp::new(Arc::new(source.clone()));
    let subscriber = RecordingUniSubscriber::<i32>::new();
    operator.subscribe(subscriber.clone());

    source.fail(TestError::failure("source broke"));

    assert!(matches!(*subscriber.outcome.lock(), Some(Err(_))));
}

#[test]
fn test_cancellation_stops_the_resolution() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = UniFromPublisherOp::new(Arc::new(source.clone()));
    let subscriber = RecordingUniSubscriber::<i32>::new();
    operator.subscribe(subscriber.clone());

    // Act
    subscriber.cancel();
    source.emit(1);
    source.complete();

    // Assert - nothing resolved after the cancellation
    assert!(subscriber.outcome.lock().is_none());
    assert!(source.is_cancelled());
}

#[test]
fn test_collect_items_gathers_the_whole_stream() {
    // Arrange
    let operator = CollectItemsOp::new(Arc::new(FromIterPublisher::new(1..=5)));
    let subscriber = RecordingUniSubscriber::<Vec<i32>>::new();

    // Act
    operator.subscribe(subscriber.clone());

    // Assert
    match &*subscriber.outcome.lock() {
        Some(Ok(Some(items))) => assert_eq!(items, &vec![1, 2, 3, 4, 5]),
        other => panic!("expected collected items, got {other:?}"),
    };
}

#[test]
fn test_collect_items_forwards_failure() {
    let source = ControlledPublisher::<i32>::new();
    let operator = CollectItemsOp::new(Arc::new(source.clone()));
    let subscriber = RecordingUniSubscriber::<Vec<i32>>::new();
    operator.subscribe(subscriber.clone());

    source.emit(1);
    source.fail(TestError::failure("midway"));

    assert!(matches!(*subscriber.outcome.lock(), Some(Err(_))));
}
