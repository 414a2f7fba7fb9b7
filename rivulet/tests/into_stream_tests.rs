// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use futures::StreamExt;
use rivulet::Multi;
use rivulet_test_utils::{ControlledPublisher, TestError};
use std::sync::Arc;

#[tokio::test]
async fn test_stream_yields_all_items_then_ends() -> anyhow::Result<()> {
    // Arrange
    let mut stream = Multi::from_iter(1..=5).map(|x| x * 2).into_stream(4);

    // Act
    let mut received = Vec::new();
    while let Some(item) = stream.next().await {
        received.push(item?);
    }

    // Assert
    assert_eq!(received, vec![2, 4, 6, 8, 10]);
    Ok(())
}

#[tokio::test]
async fn test_stream_surfaces_failure_as_final_err() {
    // Arrange
    let pipeline = Multi::from_iter(vec![1, 2])
        .concat_with(Multi::failure(TestError::failure("midway")));
    let mut stream = pipeline.into_stream(4);

    // Act & Assert
    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    assert_eq!(stream.next().await.unwrap().unwrap(), 2);
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_capacity_bounds_upstream_demand() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let mut stream = Multi::from_publisher(Arc::new(source.clone())).into_stream(3);

    // Assert - only the bridge capacity was requested up front
    assert_eq!(source.requests(), vec![3]);

    // Act - consuming one item replays one request
    source.emit(1);
    assert_eq!(stream.next().await.unwrap().unwrap(), 1);

    // Assert
    assert_eq!(source.requests(), vec![3, 1]);
}

#[tokio::test]
async fn test_dropping_the_stream_cancels_upstream() {
    // Arrange
    let source = ControlledPublisher::<i32>::new();
    let stream = Multi::from_publisher(Arc::new(source.clone())).into_stream(2);

    // Act
    drop(stream);

    // Assert
    assert!(source.is_cancelled());
}
