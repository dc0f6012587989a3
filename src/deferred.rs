//! # Deferred chains: externally started and resolvable.
//!
//! A [`Deferred`] wraps a chain whose driver parks until someone calls it.
//! It doubles as a callable completion: handed out as "the continuation",
//! the first [`Deferred::call`] supplies the chain's initial arguments, and
//! later calls while a step is active forward values into it.
//!
//! ## Rules
//! - Before the first call the chain runs nothing; steps may still be
//!   appended.
//! - [`Deferred::succeed`] / [`Deferred::fail`] settle it without ever
//!   running the steps; observers see the result retroactively, like any
//!   chain.
//! - A deferred with **no** steps resolves directly with the values of its
//!   first call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::trace;

use crate::chain::{Chain, FulfillFn, Outcome, RejectFn};
use crate::error::ChainError;
use crate::group::SlotHandle;
use crate::steps::StepRef;
use crate::value::Value;

/// Externally resolvable chain handle.
///
/// Clones share the same underlying chain.
#[derive(Clone)]
pub struct Deferred {
    chain: Chain,
}

impl Deferred {
    /// Creates a deferred with no steps: the first call (or
    /// [`Deferred::succeed`]) settles it directly.
    pub fn new() -> Deferred {
        Deferred {
            chain: Chain::start_external(VecDeque::new()),
        }
    }

    /// Creates a deferred whose steps run once it is first called.
    pub fn with_steps(steps: Vec<StepRef>) -> Deferred {
        Deferred {
            chain: Chain::start_external(steps.into()),
        }
    }

    /// The underlying chain handle.
    pub fn as_chain(&self) -> Chain {
        self.chain.clone()
    }

    /// Invokes the deferred.
    ///
    /// - First call: starts the chain with `values` as the first step's
    ///   arguments and returns `None`.
    /// - While a step is active, an empty `values` reserves and returns a
    ///   slot on that step's group; non-empty `values` are forwarded to the
    ///   next step.
    /// - After resolution every call is inert.
    pub fn call(&self, values: Vec<Value>) -> Option<SlotHandle> {
        let kick = {
            let mut st = crate::chain::core::lock(self.chain.core());
            if st.resolved {
                trace!("deferred called after resolution, ignored");
                return None;
            }
            match st.kick.take() {
                Some(tx) => {
                    st.started = true;
                    Some(tx)
                }
                None => None,
            }
        };
        if let Some(tx) = kick {
            // Receiver gone means the chain resolved in between; inert.
            let _ = tx.send(values);
            return None;
        }
        if values.is_empty() {
            self.chain.slot()
        } else {
            self.chain.pass_all(values);
            None
        }
    }

    /// Appends a step. No-op once resolved.
    pub fn next(&self, step: StepRef) -> Deferred {
        self.chain.next(step);
        self.clone()
    }

    /// Settles the deferred successfully with `values`, without running any
    /// remaining steps. Idempotent.
    pub fn succeed(&self, values: Vec<Value>) {
        self.chain.succeed(values);
    }

    /// Settles the deferred with a failure. Idempotent.
    pub fn fail(&self, err: ChainError) {
        self.chain.fail(err);
    }

    pub(crate) fn fail_shared(&self, err: Arc<ChainError>) {
        self.chain.fail_shared(err);
    }

    /// See [`Chain::on_complete`].
    pub fn on_complete(
        &self,
        f: impl Fn(Option<Arc<ChainError>>, Vec<Value>) + Send + Sync + 'static,
    ) -> Deferred {
        self.chain.on_complete(f);
        self.clone()
    }

    /// See [`Chain::on_success`].
    pub fn on_success(&self, f: impl Fn(Vec<Value>) + Send + Sync + 'static) -> Deferred {
        self.chain.on_success(f);
        self.clone()
    }

    /// See [`Chain::on_error`].
    pub fn on_error(&self, f: impl Fn(Arc<ChainError>) + Send + Sync + 'static) -> Deferred {
        self.chain.on_error(f);
        self.clone()
    }

    /// See [`Chain::timeout`].
    pub fn timeout(&self, timeout: Duration) -> Deferred {
        self.chain.timeout(timeout);
        self.clone()
    }

    /// See [`Chain::then`].
    pub fn then(&self, on_fulfilled: Option<FulfillFn>, on_rejected: Option<RejectFn>) -> Deferred {
        self.chain.then(on_fulfilled, on_rejected)
    }

    /// True once the first call has started the steps.
    pub fn is_started(&self) -> bool {
        self.chain.is_started()
    }

    /// True once settled (or quietly exited).
    pub fn is_resolved(&self) -> bool {
        self.chain.is_resolved()
    }

    /// The recorded result, if any.
    pub fn outcome(&self) -> Option<Arc<Outcome>> {
        self.chain.outcome()
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Deferred::new()
    }
}

/// Settles `target` from `value`, adopting it when it is itself a chain.
///
/// A [`Chain`] or [`Deferred`] payload defers settlement to that chain's
/// own result (success and failure both forward). Anything else settles
/// `target` successfully with the value.
pub(crate) fn adopt(target: &Deferred, value: Value) {
    if let Some(source) = value.downcast_ref::<Chain>() {
        chain_into(source, target);
        return;
    }
    if let Some(source) = value.downcast_ref::<Deferred>() {
        chain_into(&source.as_chain(), target);
        return;
    }
    target.succeed(vec![value]);
}

/// Forwards `source`'s eventual result into `target`.
fn chain_into(source: &Chain, target: &Deferred) {
    let target = target.clone();
    source.on_complete(move |error, values| match error {
        Some(err) => target.fail_shared(err),
        None => target.succeed(values),
    });
}
