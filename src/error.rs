//! Error types produced by chain execution.
//!
//! A chain resolves with at most one [`ChainError`]. There are two sources:
//!
//! - [`ChainError::Fail`] - a step signalled or returned a business-logic
//!   failure.
//! - [`ChainError::Timeout`] - the chain's timeout guard fired before any
//!   result existed.
//!
//! Downstream the two are indistinguishable except by variant: both halt
//! remaining steps and are delivered to error observers. Early termination
//! without a failure is not an error at all; steps request it by returning
//! [`Control::Exit`](crate::Control). Panics inside a step are never captured
//! as a chain result; they unwind to the runtime like any other programmer
//! fault.

use std::time::Duration;
use thiserror::Error;

/// Failure a chain can resolve with.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// A step failed with a business-logic error.
    #[error("step failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// No result existed when the timeout guard fired.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The armed timeout duration.
        timeout: Duration,
    },
}

impl ChainError {
    /// Shorthand for a [`ChainError::Fail`] with the given message.
    pub fn fail(error: impl Into<String>) -> Self {
        ChainError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use flowseq::ChainError;
    ///
    /// assert_eq!(ChainError::fail("boom").as_label(), "chain_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ChainError::Fail { .. } => "chain_failed",
            ChainError::Timeout { .. } => "chain_timeout",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ChainError::Fail { error } => format!("error: {error}"),
            ChainError::Timeout { timeout } => format!("timeout: {timeout:?}"),
        }
    }

    /// True if this failure was synthesized by the timeout guard.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainError::Timeout { .. })
    }
}
