//! # Closure-backed step (`StepFn`)
//!
//! [`StepFn`] wraps a closure `F: Fn(Group, Vec<Value>) -> Fut`, producing a
//! fresh future per invocation. Chains may run a step at most once, but the
//! same `StepRef` can be appended to several chains; the `Fn` bound keeps
//! that sharing free of hidden mutable state.
//!
//! ## Example
//! ```rust
//! use flowseq::{Control, Group, Step, StepFn, StepRef, Value};
//!
//! let s: StepRef = StepFn::arc("double", |ctl: Group, args: Vec<Value>| async move {
//!     let n = args
//!         .first()
//!         .and_then(|v| v.downcast_ref::<u32>().copied())
//!         .unwrap_or(0);
//!     ctl.pass(Value::new(n * 2));
//!     Ok(Control::Continue)
//! });
//!
//! assert_eq!(s.name(), "double");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::group::Group;
use crate::steps::step::{Step, StepResult};
use crate::value::Value;

/// Closure-backed step implementation.
///
/// Wraps a closure that *creates* a new future per invocation.
pub struct StepFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> StepFn<F> {
    /// Creates a new closure-backed step.
    ///
    /// Prefer [`StepFn::arc`] when you immediately need a
    /// [`StepRef`](crate::StepRef).
    pub fn new<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Group, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the step and returns it as a shared handle.
    pub fn arc<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self>
    where
        F: Fn(Group, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Step for StepFn<F>
where
    F: Fn(Group, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctl: Group, args: Vec<Value>) -> StepResult {
        (self.f)(ctl, args).await
    }
}
