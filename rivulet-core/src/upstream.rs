// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The upstream-subscription slot.
//!
//! Every operator holds the subscription it received from its upstream in a
//! small three-state machine: `Empty` before `on_subscribe`, `Active` while
//! the subscription is live, and a sticky `Cancelled` sentinel afterwards.
//! Termination and cancellation both go through the same swap-to-sentinel,
//! which is what makes their races benign.

use crate::protocol::Subscription;
use parking_lot::Mutex;
use std::sync::Arc;

enum Slot {
    Empty,
    Active(Arc<dyn Subscription>),
    Cancelled,
}

/// Holder for an operator's upstream subscription.
///
/// `set` is compare-and-set (a second subscription is rejected so the caller
/// can cancel the extra one), `cancel` swaps in the sentinel and cancels any
/// live subscription it displaced. The lock is only ever held for the state
/// transition itself; upstream calls happen outside it.
pub struct UpstreamSlot {
    slot: Mutex<Slot>,
}

impl UpstreamSlot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Installs the upstream subscription.
    ///
    /// Returns `true` on the first call. On a repeated call, or after the
    /// slot was cancelled, the incoming subscription is cancelled and
    /// `false` is returned.
    pub fn set(&self, subscription: Arc<dyn Subscription>) -> bool {
        {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Empty) {
                *slot = Slot::Active(subscription);
                return true;
            }
        }
        subscription.cancel();
        false
    }

    /// Replaces the current subscription, for operators that switch between
    /// consecutive upstreams (concat, resume-on-failure).
    ///
    /// Returns `true` if the new subscription was installed; after
    /// cancellation the incoming subscription is cancelled instead. The
    /// displaced subscription is dropped without being cancelled — it has
    /// already terminated when a switch happens.
    pub fn replace(&self, subscription: Arc<dyn Subscription>) -> bool {
        {
            let mut slot = self.slot.lock();
            if !matches!(*slot, Slot::Cancelled) {
                *slot = Slot::Active(subscription);
                return true;
            }
        }
        subscription.cancel();
        false
    }

    /// Returns the live subscription, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn Subscription>> {
        match &*self.slot.lock() {
            Slot::Active(subscription) => Some(Arc::clone(subscription)),
            _ => None,
        }
    }

    /// Forwards a request to the live subscription, if any.
    pub fn request(&self, n: u64) {
        if let Some(subscription) = self.get() {
            subscription.request(n);
        }
    }

    /// Swaps in the `Cancelled` sentinel and cancels the displaced
    /// subscription, if it was live. Idempotent.
    pub fn cancel(&self) {
        let previous = {
            let mut slot = self.slot.lock();
            std::mem::replace(&mut *slot, Slot::Cancelled)
        };
        if let Slot::Active(subscription) = previous {
            subscription.cancel();
        }
    }

    /// Marks the slot terminated without cancelling the upstream.
    ///
    /// Used when the upstream itself delivered the terminal signal: the
    /// sentinel must still become sticky, but there is nothing left to
    /// cancel.
    pub fn mark_terminated(&self) {
        let mut slot = self.slot.lock();
        *slot = Slot::Cancelled;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Cancelled)
    }
}

impl Default for UpstreamSlot {
    fn default() -> Self {
        Self::new()
    }
}
