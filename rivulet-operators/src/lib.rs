// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Operator processors for demand-driven stream pipelines.
//!
//! Single-state operators (map, filter, take, skip, ...) compose a shared
//! processor base; the multi-state ones — the [`flat_map`] merge engine,
//! [`concat`], [`on_failure_resume`], the [`overflow`] policies — run
//! serialized drain loops over atomic counters. [`builders`] provides the
//! source publishers, [`uni_from`] the bridges into the single-value
//! contract.

#![allow(clippy::multiple_crate_versions)]

mod arbiter;
mod failures;
mod logging;
mod processor;

pub mod builders;
pub mod concat;
pub mod filter;
pub mod flat_map;
pub mod ignore;
pub mod map;
pub mod on_failure_resume;
pub mod overflow;
pub mod skip;
pub mod take;
pub mod take_last;
pub mod take_while;
pub mod tap;
pub mod uni_from;

// Re-export commonly used types
pub use builders::{EmptyPublisher, FailurePublisher, FromIterPublisher, NeverPublisher};
pub use concat::ConcatOp;
pub use filter::FilterOp;
pub use flat_map::{FlatMapConfig, FlatMapOp, Mapped};
pub use ignore::IgnoreOp;
pub use map::MapOp;
pub use on_failure_resume::OnFailureResumeOp;
pub use overflow::{OnOverflowBufferOp, OnOverflowDropOp, OnOverflowKeepLastOp};
pub use skip::SkipOp;
pub use take::TakeOp;
pub use take_last::TakeLastOp;
pub use take_while::TakeWhileOp;
pub use tap::{TapCallbacks, TapOp};
pub use uni_from::{CollectItemsOp, UniFromPublisherOp, UniSource};
