// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Executor abstraction for handing drain work off the caller's thread.

use std::sync::Arc;

/// A unit of drain work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Error returned when an executor refuses a task.
#[derive(Debug)]
pub struct RejectedExecution;

/// Something that can run a task on another thread.
///
/// The emit-on operator only needs fire-and-forget submission plus a
/// rejection signal; anything richer (shutdown, metrics) stays with the
/// executor's owner.
pub trait Executor: Send + Sync {
    /// Submits `task`. An `Err` means the task was not and will never be
    /// run.
    fn execute(&self, task: Task) -> Result<(), RejectedExecution>;
}

/// Executor backed by a tokio runtime handle.
///
/// Each task becomes one spawned tokio task. The handle keeps the runtime
/// reachable from non-async code, so pipelines can be assembled anywhere
/// and still drain on the runtime's workers.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Captures the handle of the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like
    /// [`tokio::runtime::Handle::current`].
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<(), RejectedExecution> {
        self.handle.spawn(async move { task() });
        Ok(())
    }
}

impl Executor for Arc<dyn Executor> {
    fn execute(&self, task: Task) -> Result<(), RejectedExecution> {
        self.as_ref().execute(task)
    }
}
