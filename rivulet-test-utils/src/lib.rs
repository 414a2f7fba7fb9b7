// Copyright 2025 Umberto Gotti
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
pub mod assert_subscriber;
pub mod controlled;
pub mod test_error;

// Re-export commonly used test utilities
pub use assert_subscriber::AssertSubscriber;
pub use controlled::ControlledPublisher;
pub use test_error::TestError;
