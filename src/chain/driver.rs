//! The driver task: runs a chain's steps in order.
//!
//! One driver task per chain. Each iteration pops the next step, builds a
//! fresh [`Group`] wired back to itself through a oneshot channel, runs the
//! step body while holding one phantom count unit on the group, and then
//! parks on the channel until the group fires. Steps never overlap within a
//! chain.

use std::mem;
use std::sync::Arc;

use log::trace;
use tokio::sync::oneshot;

use crate::chain::core::{self, Shared};
use crate::group::{Advance, Group};
use crate::steps::Control;

/// How the driver obtains its initial arguments.
pub(crate) enum Start {
    /// Run immediately with these arguments.
    Now(Vec<crate::value::Value>),
    /// Park until an external caller supplies the arguments. A dropped
    /// sender means the chain resolved (or was abandoned) before starting.
    External(oneshot::Receiver<Vec<crate::value::Value>>),
}

pub(crate) fn spawn(shared: Arc<Shared>, start: Start) {
    tokio::spawn(drive(shared, start));
}

async fn drive(shared: Arc<Shared>, start: Start) {
    let mut args = match start {
        Start::Now(args) => args,
        Start::External(rx) => match rx.await {
            Ok(args) => args,
            Err(_) => return,
        },
    };

    loop {
        let step = {
            let mut st = core::lock(&shared);
            if st.resolved {
                return;
            }
            st.started = true;
            st.steps.pop_front()
        };
        let step = match step {
            Some(step) => step,
            None => {
                // Out of steps: the carried values are the chain's result.
                core::resolve(&shared, None, args);
                return;
            }
        };

        let (tx, rx) = oneshot::channel();
        let group = Group::for_driver(Arc::clone(&shared), tx);
        {
            let mut st = core::lock(&shared);
            if st.resolved {
                return;
            }
            st.active = Some(group.clone());
        }

        trace!("running step: {}", step.name());
        // Phantom unit: the group cannot fire while the body still runs.
        group.hold();
        let verdict = step.run(group.clone(), mem::take(&mut args)).await;
        match verdict {
            Ok(Control::Continue) => group.release(),
            Ok(Control::Exit) => {
                trace!("step requested exit: {}", step.name());
                core::resolve_silent(&shared);
                return;
            }
            Err(e) => group.error(e),
        }

        match rx.await {
            Ok(Advance::Done(values)) => args = values,
            Ok(Advance::Error(err)) => {
                core::resolve(&shared, Some(err), Vec::new());
                return;
            }
            // Sender dropped: the chain resolved externally and closed the
            // group out from under us.
            Err(_) => return,
        }
    }
}
