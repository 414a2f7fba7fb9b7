// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::RivuletError;

/// Simple labelled error for injecting failures in tests.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Test error: {0}")]
pub struct TestError(pub String);

impl TestError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Wraps the test error as a user-callback failure.
    pub fn failure(msg: impl Into<String>) -> RivuletError {
        RivuletError::user_error(Self::new(msg))
    }
}
