// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Error types for the Rivulet subscription protocol
//!
//! This module provides the error handling system for all Rivulet operations.
//! It defines a root [`RivuletError`] type with specific variants for the
//! failure kinds the protocol distinguishes, allowing library users to react
//! to each kind appropriately.
//!
//! # Examples
//!
//! ```
//! use rivulet_core::{RivuletError, Result};
//!
//! fn transform(input: i64) -> Result<i64> {
//!     input
//!         .checked_mul(2)
//!         .ok_or_else(|| RivuletError::protocol_violation("item out of range"))
//! }
//! ```

/// Root error type for all Rivulet operations
///
/// This enum encompasses all terminal failure conditions that can travel
/// through a subscription: user-code failures, protocol violations,
/// back-pressure overflows, executor rejections and composites of several
/// failures.
#[derive(Debug, thiserror::Error)]
pub enum RivuletError {
    /// Custom error from user code
    ///
    /// This wraps errors produced by user-provided mappers, predicates and
    /// callbacks, allowing them to be propagated through the subscription as
    /// a terminal failure.
    #[error("User callback failed: {0}")]
    UserCallback(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The subscription protocol was violated
    ///
    /// Raised for illegal demand (`request(0)`), an absent mapper result, or
    /// a second subscription delivered to an already-subscribed operator.
    #[error("Subscription protocol violated: {context}")]
    ProtocolViolation {
        /// Canonical description of the violated rule
        context: String,
    },

    /// A bounded queue overflowed despite the request discipline
    ///
    /// Back-pressure failures are kept distinct from user errors so that a
    /// saturated buffer can be told apart from a failing callback.
    #[error("Back-pressure overflow: {context}")]
    BackPressure {
        /// Which buffer overflowed and under what conditions
        context: String,
    },

    /// The executor refused a drain task
    #[error("Executor rejected task: {context}")]
    RejectedExecution {
        /// Context about the rejected hand-off
        context: String,
    },

    /// Multiple failures collided
    ///
    /// When several failures are collected before surfacing (postponed
    /// propagation, or a callback failing while a failure is being
    /// delivered), this variant aggregates them.
    #[error("Multiple failures occurred: {count} failures")]
    Composite {
        /// Number of failures that occurred
        count: usize,
        /// The individual failures
        failures: Vec<RivuletError>,
    },
}

impl RivuletError {
    /// Wrap a user error
    pub fn user_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UserCallback(Box::new(error))
    }

    /// Create a protocol-violation failure with the given context
    pub fn protocol_violation(context: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            context: context.into(),
        }
    }

    /// Create a back-pressure failure with the given context
    pub fn back_pressure(context: impl Into<String>) -> Self {
        Self::BackPressure {
            context: context.into(),
        }
    }

    /// Create a rejected-execution failure with the given context
    pub fn rejected_execution(context: impl Into<String>) -> Self {
        Self::RejectedExecution {
            context: context.into(),
        }
    }

    /// The canonical failure for `request(0)`
    ///
    /// Zero is the only representable illegal demand; it is surfaced to the
    /// downstream subscriber as a protocol violation.
    pub fn zero_request() -> Self {
        Self::protocol_violation("request amount must be strictly positive")
    }

    /// Aggregate several failures into a `Composite`
    ///
    /// A single failure is returned unchanged rather than wrapped.
    ///
    /// # Examples
    ///
    /// ```
    /// use rivulet_core::RivuletError;
    ///
    /// let combined = RivuletError::composite(vec![
    ///     RivuletError::protocol_violation("first"),
    ///     RivuletError::back_pressure("second"),
    /// ]);
    /// assert!(matches!(combined, RivuletError::Composite { count: 2, .. }));
    /// ```
    pub fn composite(mut failures: Vec<RivuletError>) -> Self {
        if failures.len() == 1 {
            return failures.remove(0);
        }
        Self::Composite {
            count: failures.len(),
            failures,
        }
    }

    /// Check if this failure came from a saturated buffer
    #[must_use]
    pub const fn is_back_pressure(&self) -> bool {
        matches!(self, Self::BackPressure { .. })
    }

    /// Check if this failure is a protocol violation
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}

/// Specialized Result type for Rivulet operations
///
/// This is a type alias for `std::result::Result<T, RivuletError>`, providing
/// a convenient shorthand for user functions handed to operators.
pub type Result<T> = std::result::Result<T, RivuletError>;

impl Clone for RivuletError {
    fn clone(&self) -> Self {
        match self {
            // The boxed error cannot be cloned, so convert to a string
            Self::UserCallback(e) => Self::UserCallback(e.to_string().into()),
            Self::ProtocolViolation { context } => Self::ProtocolViolation {
                context: context.clone(),
            },
            Self::BackPressure { context } => Self::BackPressure {
                context: context.clone(),
            },
            Self::RejectedExecution { context } => Self::RejectedExecution {
                context: context.clone(),
            },
            Self::Composite { count, failures } => Self::Composite {
                count: *count,
                failures: failures.clone(),
            },
        }
    }
}
