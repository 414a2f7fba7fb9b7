// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Executor hand-off for demand-driven streams.
//!
//! [`EmitOnOp`] moves downstream delivery onto an [`Executor`], keeping the
//! producer and consumer sides on different threads while preserving the
//! item sequence and the demand discipline. [`TokioExecutor`] adapts a
//! tokio runtime handle.

#![allow(clippy::multiple_crate_versions)]

mod logging;

pub mod emit_on;
pub mod executor;

// Re-export commonly used types
pub use emit_on::EmitOnOp;
pub use executor::{Executor, RejectedExecution, Task, TokioExecutor};
