// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::{Publisher, RivuletError};
use rivulet_operators::{FailurePublisher, FlatMapConfig, FlatMapOp, FromIterPublisher, Mapped};
use rivulet_test_utils::{AssertSubscriber, ControlledPublisher, TestError};
use std::sync::Arc;

fn publisher_of(items: Vec<i32>) -> Arc<dyn Publisher<i32>> {
    Arc::new(FromIterPublisher::new(items))
}

#[test]
fn test_flat_map_merges_all_inner_items() {
    // Arrange
    let source = Arc::new(FromIterPublisher::new(vec![1, 2, 3]));
    let operator = FlatMapOp::new(
        source,
        |x: i32| Ok(Some(Mapped::Publisher(publisher_of(vec![x * 10, x * 10 + 1])))),
        FlatMapConfig::default(),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();

    // Act
    operator.subscribe(subscriber.clone());

    // Assert - synchronous inners drain in subscription order
    subscriber.assert_items(&[10, 11, 20, 21, 30, 31]);
    subscriber.assert_completed();
}

#[test]
fn test_flat_map_respects_downstream_demand() {
    // Arrange
    let source = Arc::new(FromIterPublisher::new(vec![1, 2]));
    let operator = FlatMapOp::new(
        source,
        |x: i32| Ok(Some(Mapped::Publisher(publisher_of(vec![x, x + 100])))),
        FlatMapConfig::default(),
    );
    let subscriber = AssertSubscriber::<i32>::new(3);

    // Act
    operator.subscribe(subscriber.clone());

    // Assert - exactly the requested amount was emitted
    assert_eq!(subscriber.item_count(), 3);
    subscriber.assert_not_terminated();

    subscriber.request(10);
    assert_eq!(subscriber.item_count(), 4);
    subscriber.assert_completed();
}

#[test]
fn test_flat_map_caps_concurrent_inners() {
    // Arrange - a controlled upstream and controlled inners
    let upstream = ControlledPublisher::<usize>::new();
    let inners: Vec<ControlledPublisher<i32>> =
        (0..4).map(|_| ControlledPublisher::new()).collect();
    let inners_for_mapper = inners.clone();

    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        move |index: usize| {
            Ok(Some(Mapped::Publisher(
                Arc::new(inners_for_mapper[index].clone()) as Arc<dyn Publisher<i32>>,
            )))
        },
        FlatMapConfig::concurrency(2),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Assert - the upstream saw exactly the concurrency bound
    assert_eq!(upstream.total_requested(), 2);

    // Act - saturate the bound
    upstream.emit(0);
    upstream.emit(1);
    assert!(inners[0].has_subscriber());
    assert!(inners[1].has_subscriber());
    assert!(!inners[2].has_subscriber());

    // An inner finishing frees one upstream slot.
    inners[0].emit(42);
    inners[0].complete();
    assert_eq!(upstream.total_requested(), 3);

    upstream.emit(2);
    assert!(inners[2].has_subscriber());
    assert!(!inners[3].has_subscriber());

    // Wind down the rest.
    inners[1].complete();
    inners[2].emit(7);
    inners[2].complete();
    upstream.emit(3);
    inners[3].complete();
    upstream.complete();

    subscriber.assert_items(&[42, 7]);
    subscriber.assert_completed();
}

#[test]
fn test_flat_map_eager_failure_cancels_everything() {
    // Arrange
    let upstream = ControlledPublisher::<usize>::new();
    let healthy = ControlledPublisher::<i32>::new();
    let healthy_for_mapper = healthy.clone();

    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        move |index: usize| {
            if index == 0 {
                Ok(Some(Mapped::Publisher(
                    Arc::new(healthy_for_mapper.clone()) as Arc<dyn Publisher<i32>>,
                )))
            } else {
                Ok(Some(Mapped::Publisher(Arc::new(FailurePublisher::new(
                    TestError::failure("inner blew up"),
                )))))
            }
        },
        FlatMapConfig::concurrency(4),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    upstream.emit(0);
    healthy.emit(1);
    upstream.emit(1);

    // Assert - the failure surfaced immediately and tore everything down
    subscriber.assert_items(&[1]);
    subscriber.assert_failure();
    assert!(upstream.is_cancelled());
    assert!(healthy.is_cancelled());
}

#[test]
fn test_flat_map_postponed_failure_waits_for_live_inners() {
    // Arrange
    let upstream = ControlledPublisher::<usize>::new();
    let healthy = ControlledPublisher::<i32>::new();
    let healthy_for_mapper = healthy.clone();

    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        move |index: usize| {
            if index == 0 {
                Ok(Some(Mapped::Publisher(
                    Arc::new(healthy_for_mapper.clone()) as Arc<dyn Publisher<i32>>,
                )))
            } else {
                Ok(Some(Mapped::Publisher(Arc::new(FailurePublisher::new(
                    TestError::failure("inner blew up"),
                )))))
            }
        },
        FlatMapConfig::concurrency(4).postpone_failure(true),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act - the failing inner arrives while a healthy one is still live
    upstream.emit(0);
    upstream.emit(1);
    healthy.emit(5);

    // Assert - the healthy inner keeps delivering
    subscriber.assert_items(&[5]);
    subscriber.assert_not_terminated();
    assert!(!healthy.is_cancelled());

    // Act - everything drains
    healthy.emit(6);
    healthy.complete();
    upstream.complete();

    // Assert - only now the accumulated failure surfaces
    subscriber.assert_items(&[5, 6]);
    subscriber.assert_failure();
}

#[test]
fn test_flat_map_scalar_results_flow_through_main_queue() {
    // Arrange
    let upstream = ControlledPublisher::<i32>::new();
    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        |x: i32| Ok(Some(Mapped::Scalar(x * 2))),
        FlatMapConfig::concurrency(8),
    );
    let subscriber = AssertSubscriber::<i32>::new(1);
    operator.subscribe(subscriber.clone());

    // Act - one scalar emits on the fast path, the next one parks
    upstream.emit(1);
    upstream.emit(2);

    // Assert
    subscriber.assert_items(&[2]);

    subscriber.request(1);
    subscriber.assert_items(&[2, 4]);

    upstream.complete();
    subscriber.assert_completed();
}

#[test]
fn test_flat_map_scalar_replenishes_upstream() {
    let upstream = ControlledPublisher::<i32>::new();
    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        |x: i32| Ok(Some(Mapped::Scalar(x))),
        FlatMapConfig::concurrency(2),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    assert_eq!(upstream.total_requested(), 2);
    upstream.emit(1);
    upstream.emit(2);
    upstream.emit(3);

    // Every consumed scalar frees one upstream slot.
    assert_eq!(upstream.total_requested(), 5);
    subscriber.assert_items(&[1, 2, 3]);
}

#[test]
fn test_flat_map_absent_mapper_result_is_protocol_violation() {
    // Arrange
    let upstream = ControlledPublisher::<i32>::new();
    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        |_: i32| Ok(None),
        FlatMapConfig::default(),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    upstream.emit(1);

    // Assert
    assert!(subscriber.assert_failure().is_protocol_violation());
    assert!(upstream.is_cancelled());
}

#[test]
fn test_flat_map_mapper_failure_terminates() {
    let upstream = ControlledPublisher::<i32>::new();
    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        |_: i32| -> rivulet_core::Result<Option<Mapped<i32>>> {
            Err(TestError::failure("mapper refused"))
        },
        FlatMapConfig::default(),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    upstream.emit(1);

    assert!(matches!(
        subscriber.assert_failure(),
        RivuletError::UserCallback(_)
    ));
    assert!(upstream.is_cancelled());
}

#[test]
fn test_flat_map_inner_queue_overflow_is_back_pressure() {
    // Arrange - an inner that ignores its prefetch allowance
    let upstream = ControlledPublisher::<usize>::new();
    let rogue = ControlledPublisher::<i32>::new();
    let rogue_for_mapper = rogue.clone();

    let mut config = FlatMapConfig::concurrency(2);
    config.inner_queue_capacity = 2;
    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        move |_: usize| {
            Ok(Some(Mapped::Publisher(
                Arc::new(rogue_for_mapper.clone()) as Arc<dyn Publisher<i32>>,
            )))
        },
        config,
    );
    // No downstream demand: everything the inner pushes must be queued.
    let subscriber = AssertSubscriber::<i32>::new(0);
    operator.subscribe(subscriber.clone());

    // Act
    upstream.emit(0);
    rogue.emit(1);
    rogue.emit(2);
    rogue.emit(3);

    // Assert
    assert!(subscriber.assert_failure().is_back_pressure());
    assert!(upstream.is_cancelled());
}

#[test]
fn test_flat_map_cancel_stops_inners_and_upstream() {
    // Arrange
    let upstream = ControlledPublisher::<usize>::new();
    let inner = ControlledPublisher::<i32>::new();
    let inner_for_mapper = inner.clone();

    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        move |_: usize| {
            Ok(Some(Mapped::Publisher(
                Arc::new(inner_for_mapper.clone()) as Arc<dyn Publisher<i32>>,
            )))
        },
        FlatMapConfig::concurrency(2),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    upstream.emit(0);
    inner.emit(1);

    // Act
    subscriber.cancel();
    inner.emit(2);
    upstream.complete();

    // Assert - nothing after the cancel reached the subscriber
    subscriber.assert_items(&[1]);
    subscriber.assert_not_terminated();
    assert!(upstream.is_cancelled());
    assert!(inner.is_cancelled());
}

#[test]
fn test_flat_map_round_robin_interleaves_queued_inners() {
    // Arrange - two inners queue items while the downstream has no demand
    let upstream = ControlledPublisher::<usize>::new();
    let inners: Vec<ControlledPublisher<i32>> =
        (0..2).map(|_| ControlledPublisher::new()).collect();
    let inners_for_mapper = inners.clone();

    let operator = FlatMapOp::new(
        Arc::new(upstream.clone()),
        move |index: usize| {
            Ok(Some(Mapped::Publisher(
                Arc::new(inners_for_mapper[index].clone()) as Arc<dyn Publisher<i32>>,
            )))
        },
        FlatMapConfig::concurrency(2),
    );
    let subscriber = AssertSubscriber::<i32>::new(0);
    operator.subscribe(subscriber.clone());

    upstream.emit(0);
    upstream.emit(1);
    inners[0].emit(10);
    inners[0].emit(11);
    inners[1].emit(20);
    inners[1].emit(21);

    // Act - demand arrives one item at a time; the cursor alternates
    for _ in 0..4 {
        subscriber.request(1);
    }

    // Assert - both inners made progress before either was exhausted
    let items = subscriber.items();
    assert_eq!(items.len(), 4);
    let first_two: Vec<i32> = items[..2].to_vec();
    assert!(
        first_two.contains(&10) && first_two.contains(&20),
        "expected round-robin across inners, got {items:?}"
    );
}

#[test]
fn test_flat_map_with_empty_upstream_completes() {
    let source = Arc::new(FromIterPublisher::new(Vec::<i32>::new()));
    let operator = FlatMapOp::new(
        source,
        |x: i32| Ok(Some(Mapped::Scalar(x))),
        FlatMapConfig::default(),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();

    operator.subscribe(subscriber.clone());

    assert_eq!(subscriber.item_count(), 0);
    subscriber.assert_completed();
}
