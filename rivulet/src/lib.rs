// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! # Rivulet
//!
//! A lazy, back-pressured stream composition library built around an
//! explicit demand protocol.
//!
//! ## Overview
//!
//! Rivulet couples producers to consumers through subscriptions: a
//! downstream requests the number of items it can absorb, an upstream
//! never delivers more, and cancellation travels the same channel. Two
//! pipeline shapes exist — [`Multi`] for item sequences and [`Uni`] for a
//! single optional result — and both are lazy: nothing runs until a
//! subscriber attaches, and every subscription is independent.
//!
//! ## Quick Start
//!
//! ```rust
//! use rivulet::Multi;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let sink = received.clone();
//!
//! Multi::from_iter(1..=10)
//!     .filter(|x| x % 2 == 0)
//!     .map(|x| x * 10)
//!     .subscribe_with(
//!         move |item| sink.lock().push(item),
//!         |failure| panic!("unexpected failure: {failure}"),
//!         || {},
//!     );
//!
//! assert_eq!(*received.lock(), vec![20, 40, 60, 80, 100]);
//! ```
//!
//! Operators with their own state machines — the flat-map merge engine,
//! the executor hand-off, the overflow policies — live in
//! `rivulet-operators` and `rivulet-exec`; this crate wires them into the
//! fluent surface.

pub mod into_stream;
pub mod multi;
pub mod uni;

// Re-export core types
pub use rivulet_core::{
    Cancellable, Publisher, Result, RivuletError, Subscriber, Subscription, UniSubscriber,
    UNBOUNDED,
};

// Re-export the operator configuration surface
pub use rivulet_exec::{Executor, RejectedExecution, TokioExecutor};
pub use rivulet_operators::{FlatMapConfig, Mapped, TapCallbacks};

pub use into_stream::MultiStream;
pub use multi::Multi;
pub use uni::Uni;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{Multi, MultiStream, Uni};
    pub use rivulet_core::{Publisher, Result, RivuletError, Subscriber, Subscription};
    pub use rivulet_exec::{Executor, TokioExecutor};
    pub use rivulet_operators::{FlatMapConfig, Mapped, TapCallbacks};
}
