// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::Publisher;
use rivulet_operators::{FromIterPublisher, IgnoreOp, SkipOp, TakeLastOp, TakeOp, TakeWhileOp};
use rivulet_test_utils::{AssertSubscriber, ControlledPublisher};
use std::sync::Arc;

#[test]
fn test_take_limits_and_cancels() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = TakeOp::new(Arc::new(source.clone()), 3);
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    for item in 1..=5 {
        source.emit(item);
    }

    // Assert - three items, early completion, upstream cancelled
    subscriber.assert_items(&[1, 2, 3]);
    subscriber.assert_completed();
    assert!(source.is_cancelled());
}

#[test]
fn test_take_zero_completes_immediately() {
    let source = ControlledPublisher::<i32>::new();
    let operator = TakeOp::new(Arc::new(source.clone()), 0);
    let subscriber = AssertSubscriber::<i32>::unbounded();

    operator.subscribe(subscriber.clone());

    assert_eq!(subscriber.item_count(), 0);
    subscriber.assert_completed();
    assert!(source.is_cancelled());
}

#[test]
fn test_take_while_stops_on_first_rejection() {
    let source = Arc::new(FromIterPublisher::new(vec![1, 2, 3, 10, 4]));
    let operator = TakeWhileOp::new(source, |x: &i32| Ok(*x < 5));
    let subscriber = AssertSubscriber::<i32>::unbounded();

    operator.subscribe(subscriber.clone());

    // The rejecting item itself is dropped.
    subscriber.assert_items(&[1, 2, 3]);
    subscriber.assert_completed();
}

#[test]
fn test_skip_drops_prefix_and_replenishes() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = SkipOp::new(Arc::new(source.clone()), 2);
    let subscriber = AssertSubscriber::<i32>::new(2);
    operator.subscribe(subscriber.clone());

    // Act
    for item in 1..=4 {
        source.emit(item);
    }

    // Assert - skipped items were re-requested upstream
    subscriber.assert_items(&[3, 4]);
    assert_eq!(source.total_requested(), 4);
}

#[test]
fn test_take_last_replays_tail_on_demand() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = TakeLastOp::new(Arc::new(source.clone()), 3);
    let subscriber = AssertSubscriber::<i32>::new(0);
    operator.subscribe(subscriber.clone());

    // Act
    for item in 1..=6 {
        source.emit(item);
    }
    source.complete();

    // Assert - nothing moves until the downstream asks
    assert_eq!(subscriber.item_count(), 0);
    subscriber.assert_not_terminated();

    subscriber.request(2);
    subscriber.assert_items(&[4, 5]);

    subscriber.request(1);
    subscriber.assert_items(&[4, 5, 6]);
    subscriber.assert_completed();
}

#[test]
fn test_take_last_failure_discards_buffer() {
    let source = ControlledPublisher::<i32>::new();
    let operator = TakeLastOp::new(Arc::new(source.clone()), 2);
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    source.emit(1);
    source.emit(2);
    source.fail(rivulet_core::RivuletError::protocol_violation("boom"));

    assert_eq!(subscriber.item_count(), 0);
    subscriber.assert_failure();
}

#[test]
fn test_ignore_discards_items_and_forwards_terminal() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = IgnoreOp::new(Arc::new(source.clone()));
    let subscriber = AssertSubscriber::<i32>::new(0);
    operator.subscribe(subscriber.clone());

    // Act
    source.emit(1);
    source.emit(2);
    source.complete();

    // Assert - the upstream was drained without downstream demand
    assert_eq!(source.total_requested(), rivulet_core::UNBOUNDED);
    assert_eq!(subscriber.item_count(), 0);
    subscriber.assert_completed();
}
