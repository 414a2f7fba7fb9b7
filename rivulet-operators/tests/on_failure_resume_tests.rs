// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::{Publisher, RivuletError};
use rivulet_operators::{FailurePublisher, FromIterPublisher, OnFailureResumeOp};
use rivulet_test_utils::{AssertSubscriber, ControlledPublisher, TestError};
use std::sync::Arc;

fn publisher_of(items: Vec<i32>) -> Arc<dyn Publisher<i32>> {
    Arc::new(FromIterPublisher::new(items))
}

#[test]
fn test_resume_switches_to_fallback_on_failure() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let operator = OnFailureResumeOp::new(Arc::new(source.clone()), |_failure| {
        Ok(publisher_of(vec![10, 11]))
    });
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    source.emit(1);
    source.fail(TestError::failure("primary broke"));

    // Assert
    subscriber.assert_items(&[1, 10, 11]);
    subscriber.assert_completed();
}

#[test]
fn test_resume_without_failure_is_transparent() {
    let operator =
        OnFailureResumeOp::new(publisher_of(vec![1, 2, 3]), |_failure| {
            Ok(publisher_of(vec![99]))
        });
    let subscriber = AssertSubscriber::<i32>::unbounded();

    operator.subscribe(subscriber.clone());

    subscriber.assert_items(&[1, 2, 3]);
    subscriber.assert_completed();
}

#[test]
fn test_resume_preserves_outstanding_demand() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let fallback = ControlledPublisher::<i32>::new();
    let fallback_for_chooser = fallback.clone();
    let operator = OnFailureResumeOp::new(Arc::new(source.clone()), move |_failure| {
        Ok(Arc::new(fallback_for_chooser.clone()) as Arc<dyn Publisher<i32>>)
    });
    let subscriber = AssertSubscriber::<i32>::new(5);
    operator.subscribe(subscriber.clone());

    // Act - two of five requested items are consumed before the failure
    source.emit(1);
    source.emit(2);
    source.fail(TestError::failure("primary broke"));

    // Assert
    assert_eq!(fallback.total_requested(), 3);
}

#[test]
fn test_resume_fallback_failure_is_forwarded() {
    // Arrange - the fallback itself fails; no second resume happens
    let operator = OnFailureResumeOp::new(
        Arc::new(FailurePublisher::<i32>::new(TestError::failure("first"))),
        |_failure| {
            Ok(Arc::new(FailurePublisher::<i32>::new(TestError::failure(
                "second",
            ))) as Arc<dyn Publisher<i32>>)
        },
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();

    // Act
    operator.subscribe(subscriber.clone());

    // Assert
    let failure = subscriber.assert_failure();
    assert!(failure.to_string().contains("second"));
}

#[test]
fn test_resume_chooser_failure_composes_both() {
    // Arrange
    let operator = OnFailureResumeOp::new(
        Arc::new(FailurePublisher::<i32>::new(TestError::failure("original"))),
        |_failure| -> rivulet_core::Result<Arc<dyn Publisher<i32>>> {
            Err(TestError::failure("chooser broke"))
        },
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();

    // Act
    operator.subscribe(subscriber.clone());

    // Assert
    match subscriber.assert_failure() {
        RivuletError::Composite { count, .. } => assert_eq!(count, 2),
        other => panic!("expected a composite failure, got {other:?}"),
    }
}
