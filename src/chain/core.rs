//! Shared chain state and the single resolution path.
//!
//! Every handle clone, the driver task, and each active group point at one
//! [`Shared`]. All terminal transitions funnel through [`resolve`] (or
//! [`resolve_silent`] for the quiet-exit path); the `resolved` flag makes the
//! first caller win and every later one a no-op.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::chain::observer::{self, Observer};
use crate::error::ChainError;
use crate::group::Group;
use crate::report;
use crate::steps::StepRef;
use crate::value::Value;

/// Final result of a chain: either an error, or the last step's buffered
/// values in registration order.
pub struct Outcome {
    /// The failure the chain resolved with, if any.
    pub error: Option<Arc<ChainError>>,
    /// The success values. Empty when `error` is set.
    pub values: Vec<Value>,
}

pub(crate) struct ChainState {
    /// Steps not yet taken by the driver.
    pub(crate) steps: VecDeque<StepRef>,
    /// The group of the step currently running, if any.
    pub(crate) active: Option<Group>,
    /// Write-once result; `Some` implies `resolved`.
    pub(crate) outcome: Option<Arc<Outcome>>,
    /// Set when the driver takes its first step or external args arrive.
    pub(crate) started: bool,
    /// Terminal flag. Quiet exit sets this with `outcome` left `None`.
    pub(crate) resolved: bool,
    /// Handlers awaiting resolution.
    pub(crate) observers: Vec<Observer>,
    /// True once any error-observing handler was ever attached.
    pub(crate) has_error_observer: bool,
    /// Guards the unhandled-failure escalation; at most one report.
    pub(crate) reported: bool,
    /// Cancels the armed timeout guard, if one exists.
    pub(crate) timeout: Option<CancellationToken>,
    /// Wakes an externally-started driver with its initial arguments.
    pub(crate) kick: Option<oneshot::Sender<Vec<Value>>>,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<ChainState>,
}

impl Shared {
    pub(crate) fn new(
        steps: VecDeque<StepRef>,
        kick: Option<oneshot::Sender<Vec<Value>>>,
    ) -> Arc<Shared> {
        Arc::new(Shared {
            state: Mutex::new(ChainState {
                steps,
                active: None,
                outcome: None,
                started: false,
                resolved: false,
                observers: Vec::new(),
                has_error_observer: false,
                reported: false,
                timeout: None,
                kick,
            }),
        })
    }
}

pub(crate) fn lock(shared: &Shared) -> MutexGuard<'_, ChainState> {
    shared.state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resolves the chain with a result. First caller wins; later calls are
/// no-ops. Observers attached so far are dispatched, the active group is
/// detached, the timeout guard is cancelled, and a pending external kick is
/// dropped so the driver unblocks.
pub(crate) fn resolve(shared: &Arc<Shared>, error: Option<Arc<ChainError>>, values: Vec<Value>) {
    let outcome = Arc::new(Outcome { error, values });
    let (observers, active, timeout) = {
        let mut st = lock(shared);
        if st.resolved {
            return;
        }
        st.resolved = true;
        st.outcome = Some(Arc::clone(&outcome));
        st.steps.clear();
        st.kick = None;
        (
            std::mem::take(&mut st.observers),
            st.active.take(),
            st.timeout.take(),
        )
    };
    if let Some(token) = timeout {
        token.cancel();
    }
    if let Some(group) = active {
        group.close();
    }
    match &outcome.error {
        Some(e) => debug!("chain resolved with failure: {e}"),
        None => debug!("chain resolved: {} value(s)", outcome.values.len()),
    }
    for obs in observers {
        observer::dispatch(Arc::clone(&outcome), obs);
    }
    if outcome.error.is_some() {
        schedule_unhandled_check(Arc::clone(shared));
    }
}

/// Quiet-exit path: marks the chain resolved with **no** outcome. Remaining
/// steps are dropped and observers are discarded without being called.
pub(crate) fn resolve_silent(shared: &Arc<Shared>) {
    let (active, timeout) = {
        let mut st = lock(shared);
        if st.resolved {
            return;
        }
        st.resolved = true;
        st.steps.clear();
        st.kick = None;
        st.observers.clear();
        (st.active.take(), st.timeout.take())
    };
    if let Some(token) = timeout {
        token.cancel();
    }
    if let Some(group) = active {
        group.close();
    }
    debug!("chain exited without a result");
}

/// Escalates a failure nobody observes. Deferred one scheduler turn so
/// handlers attached in the same turn as resolution still count.
fn schedule_unhandled_check(shared: Arc<Shared>) {
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        let err = {
            let mut st = lock(&shared);
            if st.has_error_observer || st.reported {
                return;
            }
            st.reported = true;
            match st.outcome.as_ref().and_then(|o| o.error.clone()) {
                Some(err) => err,
                None => return,
            }
        };
        report::report_unhandled(&err);
    });
}
