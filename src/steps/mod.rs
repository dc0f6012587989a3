//! # Step abstractions.
//!
//! This module provides the step-related types:
//! - [`Step`] - trait for one unit of ordered work in a chain
//! - [`StepFn`] - closure-backed step implementation
//! - [`StepRef`] - shared reference to a step (`Arc<dyn Step>`)
//! - [`Control`] - a step's non-error verdict (continue or exit early)

mod step;
mod step_fn;

pub use step::{Control, Step, StepRef, StepResult};
pub use step_fn::StepFn;
