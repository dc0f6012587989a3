//! # Step trait and verdict types.
//!
//! A [`Step`] is one unit of ordered work in a chain. The driver invokes
//! steps one at a time, passing the values buffered by the previous step and
//! an explicit control handle (the active [`Group`]) used to register
//! completions, forward values, or terminate the chain.
//!
//! A step finishes by returning a [`StepResult`]:
//! - `Ok(Control::Continue)` - normal completion; the chain advances once
//!   every registration on the group resolves.
//! - `Ok(Control::Exit)` - early termination without a result; remaining
//!   steps and observers are never invoked.
//! - `Err(e)` - business-logic failure; captured as the chain's result.
//!
//! Returning from the step body does **not** advance the chain by itself:
//! the driver holds one unit of the group's outstanding count for the
//! duration of the body, so registrations made anywhere in the body are
//! honored even if a completion fires mid-registration.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ChainError;
use crate::group::Group;
use crate::value::Value;

/// A step's verdict when it finishes without a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep going: advance once all registrations resolve.
    Continue,
    /// Unwind quietly: discard remaining steps, produce no result.
    Exit,
}

/// What a step body resolves to.
pub type StepResult = Result<Control, ChainError>;

/// Shared handle to a step.
pub type StepRef = Arc<dyn Step>;

/// # One unit of ordered work in a chain.
///
/// A `Step` has a stable [`name`](Step::name) and an async
/// [`run`](Step::run) method that receives the active [`Group`] and the
/// values forwarded from the previous step.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use flowseq::{Control, Group, Step, StepResult, Value};
///
/// struct Demo;
///
/// #[async_trait]
/// impl Step for Demo {
///     fn name(&self) -> &str { "demo" }
///
///     async fn run(&self, ctl: Group, _args: Vec<Value>) -> StepResult {
///         ctl.pass(Value::new("forwarded"));
///         Ok(Control::Continue)
///     }
/// }
/// ```
#[async_trait]
pub trait Step: Send + Sync + 'static {
    /// Returns a stable, human-readable step name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Executes the step body.
    ///
    /// `ctl` is the step's join group; registrations made on it gate the
    /// advance to the next step. `args` are the previous step's buffered
    /// values, in registration order.
    async fn run(&self, ctl: Group, args: Vec<Value>) -> StepResult;
}
