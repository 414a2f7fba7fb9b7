// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Demand arbiter for operators that switch between consecutive upstreams.
//!
//! Concat and resume-on-failure replace their upstream mid-subscription.
//! Outstanding downstream demand must survive the switch: the items the
//! finished upstream produced are deducted, and the remainder is replayed
//! to the next upstream when it attaches. Request bookkeeping and the
//! switch run under one short lock so a request landing during a switch is
//! counted exactly once.

use parking_lot::Mutex;
use rivulet_core::{Subscription, UNBOUNDED};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct ArbiterState {
    current: Option<Arc<dyn Subscription>>,
    requested: u64,
}

pub(crate) struct Arbiter {
    state: Mutex<ArbiterState>,
    produced: AtomicU64,
    cancelled: AtomicBool,
}

impl Arbiter {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                current: None,
                requested: 0,
            }),
            produced: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Adds downstream demand and forwards it to the current upstream.
    pub(crate) fn request(&self, n: u64) {
        let target = {
            let mut state = self.state.lock();
            if state.requested != UNBOUNDED {
                state.requested = state.requested.saturating_add(n);
            }
            state.current.clone()
        };
        if let Some(subscription) = target {
            subscription.request(n);
        }
    }

    /// Notes one item delivered by the current upstream.
    pub(crate) fn note_produced(&self) {
        self.produced.fetch_add(1, Ordering::AcqRel);
    }

    /// Installs the next upstream and replays the outstanding demand.
    ///
    /// Returns `false` (cancelling the incoming subscription) when the
    /// arbiter was cancelled.
    pub(crate) fn switch_to(&self, subscription: Arc<dyn Subscription>) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            subscription.cancel();
            return false;
        }
        let produced = self.produced.swap(0, Ordering::AcqRel);
        let outstanding = {
            let mut state = self.state.lock();
            if state.requested != UNBOUNDED {
                state.requested = state.requested.saturating_sub(produced);
            }
            state.current = Some(Arc::clone(&subscription));
            state.requested
        };
        if self.cancelled.load(Ordering::Acquire) {
            // A cancel raced the switch; it already took or will take the
            // slot, so just make sure this upstream stops too.
            subscription.cancel();
            return false;
        }
        if outstanding > 0 {
            subscription.request(outstanding);
        }
        true
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let current = self.state.lock().current.take();
        if let Some(subscription) = current {
            subscription.cancel();
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
