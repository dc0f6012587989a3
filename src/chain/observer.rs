//! Observer kinds and their dispatch.
//!
//! Observers are callbacks attached to a chain handle. They run after
//! resolution, each on its own spawned task so no observer shares a call
//! stack with the resolver or with another observer. A panicking observer is
//! isolated and logged; it never poisons the chain or its siblings.
//!
//! Dispatch tasks are spawned in attachment order. A current-thread runtime
//! runs them in that order too; a multi-thread runtime may interleave them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::error;

use crate::chain::core::Outcome;
use crate::error::ChainError;
use crate::value::Value;

pub(crate) enum Observer {
    /// Runs on both success and failure.
    Complete(Box<dyn Fn(Option<Arc<ChainError>>, Vec<Value>) + Send + Sync>),
    /// Runs only on success.
    Success(Box<dyn Fn(Vec<Value>) + Send + Sync>),
    /// Runs only on failure.
    Error(Box<dyn Fn(Arc<ChainError>) + Send + Sync>),
}

impl Observer {
    /// True if this observer counts as handling a failure.
    pub(crate) fn observes_error(&self) -> bool {
        matches!(self, Observer::Complete(_) | Observer::Error(_))
    }

    fn deliver(&self, outcome: &Outcome) {
        match self {
            Observer::Complete(f) => f(outcome.error.clone(), outcome.values.clone()),
            Observer::Success(f) => {
                if outcome.error.is_none() {
                    f(outcome.values.clone());
                }
            }
            Observer::Error(f) => {
                if let Some(err) = &outcome.error {
                    f(Arc::clone(err));
                }
            }
        }
    }
}

/// Delivers `outcome` to one observer on a fresh task.
pub(crate) fn dispatch(outcome: Arc<Outcome>, obs: Observer) {
    tokio::spawn(async move {
        if catch_unwind(AssertUnwindSafe(|| obs.deliver(&outcome))).is_err() {
            error!("chain observer panicked");
        }
    });
}
