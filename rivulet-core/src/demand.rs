// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Saturating demand arithmetic over atomic request counters.
//!
//! Demand is a cumulative `u64`: requests add into it, emissions subtract
//! from it. Addition saturates at [`UNBOUNDED`], which is sticky — once a
//! counter reaches the sentinel it never leaves it, and decrements against
//! it are skipped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel request value meaning "no demand limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Adds `n` to `requested`, saturating at [`UNBOUNDED`].
///
/// Returns the value the counter held *before* the addition; callers use a
/// prior value of zero to detect that they are responsible for starting a
/// drain.
pub fn add_request(requested: &AtomicU64, n: u64) -> u64 {
    let mut current = requested.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = current.saturating_add(n);
        match requested.compare_exchange_weak(
            current,
            next,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(previous) => return previous,
            Err(actual) => current = actual,
        }
    }
}

/// Subtracts `n` already-emitted items from `requested`.
///
/// Returns the new value. The counter must cover `n` (emissions only ever
/// consume previously granted demand); an unbounded counter stays unbounded.
pub fn subtract_produced(requested: &AtomicU64, n: u64) -> u64 {
    let mut current = requested.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        debug_assert!(current >= n, "produced more items than were requested");
        let next = current.saturating_sub(n);
        match requested.compare_exchange_weak(
            current,
            next,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

/// Clamps a `usize` count (e.g. a concurrency limit) into the demand domain.
#[must_use]
pub fn clamp_to_demand(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(UNBOUNDED)
}
