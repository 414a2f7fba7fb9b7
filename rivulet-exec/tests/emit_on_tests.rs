// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use parking_lot::Mutex;
use rivulet_core::Publisher;
use rivulet_exec::{EmitOnOp, Executor, RejectedExecution, Task, TokioExecutor};
use rivulet_operators::FromIterPublisher;
use rivulet_test_utils::{AssertSubscriber, ControlledPublisher};
use std::sync::Arc;

/// Executor that parks every task until the test pumps it.
#[derive(Clone, Default)]
struct DeferredExecutor {
    tasks: Arc<Mutex<Vec<Task>>>,
    rejecting: bool,
}

impl DeferredExecutor {
    fn new() -> Self {
        Self::default()
    }

    fn rejecting() -> Self {
        Self {
            tasks: Arc::default(),
            rejecting: true,
        }
    }

    /// Runs every parked task on the caller's thread.
    fn pump(&self) {
        loop {
            let Some(task) = self.tasks.lock().pop() else {
                return;
            };
            task();
        }
    }

    fn parked_tasks(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Executor for DeferredExecutor {
    fn execute(&self, task: Task) -> Result<(), RejectedExecution> {
        if self.rejecting {
            return Err(RejectedExecution);
        }
        self.tasks.lock().push(task);
        Ok(())
    }
}

#[test]
fn test_emit_on_delivers_only_on_executor() {
    // Arrange
    let executor = DeferredExecutor::new();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor.clone());
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act - items arrive but the executor has not run yet
    source.emit(1);
    source.emit(2);

    // Assert
    assert_eq!(subscriber.item_count(), 0);
    assert_eq!(executor.parked_tasks(), 1);

    executor.pump();
    subscriber.assert_items(&[1, 2]);
}

#[test]
fn test_emit_on_preserves_item_sequence() {
    // Arrange
    let executor = DeferredExecutor::new();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor.clone());
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act - interleave emission and draining
    for item in 0..8 {
        source.emit(item);
        if item % 3 == 0 {
            executor.pump();
        }
    }
    source.complete();
    executor.pump();

    // Assert
    subscriber.assert_items(&[0, 1, 2, 3, 4, 5, 6, 7]);
    subscriber.assert_completed();
}

#[test]
fn test_emit_on_initial_prefetch_and_batched_replenish() {
    // Arrange
    let executor = DeferredExecutor::new();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor.clone());
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Assert - the hand-off queue capacity is requested up front
    assert_eq!(source.requests(), vec![16]);

    // Act - a full batch is consumed
    for item in 0..16 {
        source.emit(item);
    }
    executor.pump();

    // Assert - exactly one replenish batch went upstream
    assert_eq!(source.requests(), vec![16, 16]);
    assert_eq!(subscriber.item_count(), 16);
}

#[test]
fn test_emit_on_overflow_cancels_and_fails() {
    // Arrange - the executor never runs while the source floods the queue
    let executor = DeferredExecutor::new();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor.clone());
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act - the source ignores demand and pushes 32 items
    for item in 0..32 {
        source.emit(item);
    }

    // Assert - the 17th item overflowed: upstream cancelled on the spot
    assert!(source.is_cancelled());

    executor.pump();
    assert_eq!(subscriber.item_count(), 16);
    assert!(subscriber.assert_failure().is_back_pressure());
}

#[test]
fn test_emit_on_respects_downstream_demand() {
    // Arrange
    let executor = DeferredExecutor::new();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor.clone());
    let subscriber = AssertSubscriber::<i32>::new(2);
    operator.subscribe(subscriber.clone());

    // Act
    for item in 0..5 {
        source.emit(item);
    }
    executor.pump();

    // Assert - only the requested two items crossed the boundary
    subscriber.assert_items(&[0, 1]);

    subscriber.request(2);
    executor.pump();
    subscriber.assert_items(&[0, 1, 2, 3]);
}

#[test]
fn test_emit_on_rejection_surfaces_and_cancels() {
    // Arrange
    let executor = DeferredExecutor::rejecting();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor);
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    source.emit(1);

    // Assert
    assert!(matches!(
        subscriber.assert_failure(),
        rivulet_core::RivuletError::RejectedExecution { .. }
    ));
    assert!(source.is_cancelled());
}

#[test]
fn test_emit_on_cancel_discards_parked_items() {
    // Arrange
    let executor = DeferredExecutor::new();
    let source = ControlledPublisher::<i32>::new();
    let operator = EmitOnOp::new(Arc::new(source.clone()), executor.clone());
    let subscriber = AssertSubscriber::<i32>::unbounded();
    operator.subscribe(subscriber.clone());

    // Act
    source.emit(1);
    source.emit(2);
    subscriber.cancel();
    executor.pump();

    // Assert
    assert_eq!(subscriber.item_count(), 0);
    subscriber.assert_not_terminated();
    assert!(source.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_emit_on_tokio_executor_end_to_end() -> anyhow::Result<()> {
    // Arrange
    let source = Arc::new(FromIterPublisher::new(1..=50));
    let operator = EmitOnOp::new(
        source as Arc<dyn Publisher<i32>>,
        TokioExecutor::current(),
    );
    let subscriber = AssertSubscriber::<i32>::unbounded();

    // Act
    operator.subscribe(subscriber.clone());
    subscriber.await_terminal(2_000).await;

    // Assert - the sequence crossed the thread boundary intact
    subscriber.assert_items(&(1..=50).collect::<Vec<_>>());
    subscriber.assert_completed();
    Ok(())
}
