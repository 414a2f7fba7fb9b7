// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Failure accumulator for operators with postponed propagation.

use parking_lot::Mutex;
use rivulet_core::RivuletError;

enum FailureState {
    None,
    Single(RivuletError),
    Composite(Vec<RivuletError>),
    /// The accumulated failure has already been surfaced downstream; later
    /// additions are dropped.
    Terminated,
}

/// Collects failures until the owning operator surfaces them as one
/// terminal signal.
pub(crate) struct Failures {
    state: Mutex<FailureState>,
}

impl Failures {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FailureState::None),
        }
    }

    /// Records a failure. Returns `false` when the accumulator has already
    /// been surfaced, in which case the failure is dropped by the caller.
    pub(crate) fn add(&self, failure: RivuletError) -> bool {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, FailureState::Terminated);
        *state = match previous {
            FailureState::None => FailureState::Single(failure),
            FailureState::Single(first) => FailureState::Composite(vec![first, failure]),
            FailureState::Composite(mut all) => {
                all.push(failure);
                FailureState::Composite(all)
            }
            FailureState::Terminated => return false,
        };
        true
    }

    /// Swaps the accumulator to its terminated state and returns the
    /// combined failure, if any was recorded.
    pub(crate) fn take(&self) -> Option<RivuletError> {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, FailureState::Terminated)
        };
        match previous {
            FailureState::None | FailureState::Terminated => None,
            FailureState::Single(failure) => Some(failure),
            FailureState::Composite(all) => Some(RivuletError::composite(all)),
        }
    }

    /// True while at least one failure is recorded and not yet surfaced.
    pub(crate) fn has_pending(&self) -> bool {
        matches!(
            *self.state.lock(),
            FailureState::Single(_) | FailureState::Composite(_)
        )
    }
}
