// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Core traits and primitives for demand-driven stream pipelines.
//!
//! This crate defines the subscription protocol ([`Publisher`],
//! [`Subscriber`], [`Subscription`]) and the building blocks every operator
//! shares: saturating demand arithmetic ([`demand`]), the upstream
//! subscription slot ([`UpstreamSlot`]), the terminal-once boundary wrapper
//! ([`SerializedSubscriber`]) and the root error type ([`RivuletError`]).

pub mod demand;
pub mod error;
pub mod protocol;
pub mod serialized;
pub mod upstream;

// Re-export commonly used types
pub use demand::UNBOUNDED;
pub use error::{Result, RivuletError};
pub use protocol::{Cancellable, Publisher, Subscriber, Subscription, UniSubscriber};
pub use serialized::SerializedSubscriber;
pub use upstream::UpstreamSlot;
