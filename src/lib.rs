//! # flowseq
//!
//! A sequencing engine for asynchronous work on tokio. An ordered list of
//! steps runs one at a time; a step registers any number of pending
//! completions on its join group, and the chain advances only after all of
//! them resolve. Values buffered by one step become the next step's
//! arguments, in registration order.
//!
//! ```text
//!             +--------- Chain (driver task) ----------+
//!   args ---> | step 0 | --> | step 1 | --> | step 2 | | --> Outcome
//!             +---|----------------------------|-------+
//!                 |  Group: slot() slot() ...  |
//!                 |  fires when all resolve    |
//!              error / succeed / timeout ------+--> Outcome (short-circuit)
//! ```
//!
//! ## Semantics
//! - **Ordering**: buffered values follow registration order, never
//!   completion order; nested groups collect fan-out results into one
//!   ordered list.
//! - **Fire-once**: a chain resolves at most once; later resolutions,
//!   late slot fires and repeated failures are inert.
//! - **Retroactive observers**: handlers attached after resolution still
//!   see the result, each on its own task.
//! - **Unhandled failures**: a chain that fails with no error handler by
//!   the next scheduler turn escalates to the process-wide reporter.
//!
//! ## Example
//! ```rust
//! use flowseq::{chain, Control, Group, StepFn, StepRef, Value};
//! use std::sync::Mutex;
//! use tokio::sync::oneshot;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let fetch: StepRef = StepFn::arc("fetch", |ctl: Group, _args: Vec<Value>| async move {
//!         let slot = ctl.slot();
//!         tokio::spawn(async move {
//!             slot.fulfill(Value::new(21u32));
//!         });
//!         Ok(Control::Continue)
//!     });
//!     let double: StepRef = StepFn::arc("double", |ctl: Group, args: Vec<Value>| async move {
//!         let n = args[0].downcast_ref::<u32>().copied().unwrap_or(0);
//!         ctl.pass(Value::new(n * 2));
//!         Ok(Control::Continue)
//!     });
//!
//!     let (tx, rx) = oneshot::channel();
//!     let tx = Mutex::new(Some(tx));
//!     chain(vec![fetch, double]).on_success(move |values| {
//!         let n = values[0].downcast_ref::<u32>().copied().unwrap_or(0);
//!         if let Some(tx) = tx.lock().unwrap().take() {
//!             let _ = tx.send(n);
//!         }
//!     });
//!
//!     assert_eq!(rx.await.unwrap(), 42);
//! }
//! ```

pub mod chain;
pub mod deferred;
pub mod error;
pub mod group;
pub mod promise;
pub mod report;
pub mod steps;
pub mod value;

pub use crate::chain::{Chain, FulfillFn, Outcome, RejectFn};
pub use crate::deferred::Deferred;
pub use crate::error::ChainError;
pub use crate::group::{Group, SlotHandle};
pub use crate::promise::{pending, PromiseParts, Settle};
pub use crate::report::{report_unhandled, reset_unhandled_reporter, set_unhandled_reporter};
pub use crate::steps::{Control, Step, StepFn, StepRef, StepResult};
pub use crate::value::Value;

/// Starts a chain over `steps` with no initial arguments.
///
/// The driver runs on its own spawned task: the first step cannot execute
/// before the constructing task yields, so observers and extra steps
/// attached immediately after construction are honored.
pub fn chain(steps: Vec<StepRef>) -> Chain {
    Chain::start(steps.into(), Vec::new())
}

/// Starts a chain over `steps`, handing `args` to the first step.
pub fn chain_with(steps: Vec<StepRef>, args: Vec<Value>) -> Chain {
    Chain::start(steps.into(), args)
}

/// Creates an externally resolvable chain with no steps.
pub fn deferred() -> Deferred {
    Deferred::new()
}

/// Creates an externally resolvable chain whose steps run on first call.
pub fn deferred_with(steps: Vec<StepRef>) -> Deferred {
    Deferred::with_steps(steps)
}
