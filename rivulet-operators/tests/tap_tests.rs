// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use parking_lot::Mutex;
use rivulet_core::{Publisher, RivuletError};
use rivulet_operators::{FromIterPublisher, TapCallbacks, TapOp};
use rivulet_test_utils::{AssertSubscriber, ControlledPublisher, TestError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_tap_observes_signals_in_order() {
    // Arrange
    let trace = Arc::new(Mutex::new(Vec::<String>::new()));
    let callbacks = TapCallbacks::new()
        .on_subscribe({
            let trace = trace.clone();
            move || trace.lock().push("subscribe".into())
        })
        .on_item({
            let trace = trace.clone();
            move |item: &i32| {
                trace.lock().push(format!("item {item}"));
                Ok(())
            }
        })
        .on_request({
            let trace = trace.clone();
            move |n| trace.lock().push(format!("request {n}"))
        })
        .on_complete({
            let trace = trace.clone();
            move || {
                trace.lock().push("complete".into());
                Ok(())
            }
        })
        .on_termination({
            let trace = trace.clone();
            move |failure, cancelled| {
                trace
                    .lock()
                    .push(format!("termination {} {cancelled}", failure.is_some()));
            }
        });
    let operator = TapOp::new(Arc::new(FromIterPublisher::new(vec![1, 2])), callbacks);
    let subscriber = AssertSubscriber::<i32>::new(5);

    // Act
    operator.subscribe(subscriber.clone());

    // Assert - each callback fired before its downstream signal
    subscriber.assert_items(&[1, 2]);
    subscriber.assert_completed();
    assert_eq!(
        *trace.lock(),
        vec![
            "subscribe",
            "request 5",
            "item 1",
            "item 2",
            "complete",
            "termination false false",
        ]
    );
}

#[test]
fn test_tap_item_callback_failure_fails_the_stream() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let callbacks = TapCallbacks::new().on_item(|item: &i32| {
        if *item == 2 {
            Err(TestError::failure("observer rejected item"))
        } else {
            Ok(())
        }
    });
    let operator = TapOp::new(Arc::new(source.clone()), callbacks);
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    source.emit(1);
    source.emit(2);
    source.emit(3);

    // Assert
    subscriber.assert_items(&[1]);
    subscriber.assert_failure();
    assert!(source.is_cancelled());
}

#[test]
fn test_tap_failure_callback_failure_composes() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let callbacks = TapCallbacks::new()
        .on_failure(|_failure| Err(TestError::failure("observer broke too")));
    let operator = TapOp::new(Arc::new(source.clone()), callbacks);
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    source.fail(TestError::failure("original"));

    // Assert - both failures travel together
    match subscriber.assert_failure() {
        RivuletError::Composite { count, .. } => assert_eq!(count, 2),
        other => panic!("expected a composite failure, got {other:?}"),
    }
}

#[test]
fn test_tap_completion_callback_failure_becomes_failure() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let callbacks =
        TapCallbacks::new().on_complete(|| Err(TestError::failure("completion hook broke")));
    let operator = TapOp::new(Arc::new(source.clone()), callbacks);
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    source.complete();

    // Assert - the downstream observes a failure, not the completion
    assert!(!subscriber.is_completed());
    subscriber.assert_failure();
}

#[test]
fn test_tap_termination_fires_once_on_cancel() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let terminations = Arc::new(AtomicUsize::new(0));
    let cancels = Arc::new(AtomicUsize::new(0));
    let callbacks = TapCallbacks::<i32>::new()
        .on_cancel({
            let cancels = cancels.clone();
            move || {
                cancels.fetch_add(1, Ordering::AcqRel);
            }
        })
        .on_termination({
            let terminations = terminations.clone();
            move |failure, cancelled| {
                assert!(failure.is_none());
                assert!(cancelled);
                terminations.fetch_add(1, Ordering::AcqRel);
            }
        });
    let operator = TapOp::new(Arc::new(source.clone()), callbacks);
    let subscriber = AssertSubscriber::<i32>::new(1);
    operator.subscribe(subscriber.clone());

    // Act - cancellation is idempotent, the hooks are not re-fired
    subscriber.cancel();
    subscriber.cancel();

    // Assert
    assert_eq!(cancels.load(Ordering::Acquire), 1);
    assert_eq!(terminations.load(Ordering::Acquire), 1);
    assert!(source.is_cancelled());
}
