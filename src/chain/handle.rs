//! The public chain handle.
//!
//! [`Chain`] is a cheap clone over the shared chain state. It appends steps,
//! attaches observers, arms the timeout guard, resolves the chain from
//! outside, and proxies group operations to whichever step is currently
//! active.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::trace;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::chain::core::{self, Outcome, Shared};
use crate::chain::driver::{self, Start};
use crate::chain::observer::{self, Observer};
use crate::deferred::{self, Deferred};
use crate::error::ChainError;
use crate::group::{Group, SlotHandle};
use crate::steps::StepRef;
use crate::value::Value;

/// Maps a success result to the next value in a [`Chain::then`] link.
pub type FulfillFn = Box<dyn Fn(Vec<Value>) -> Value + Send + Sync>;
/// Maps a failure to a recovery value in a [`Chain::then`] link.
pub type RejectFn = Box<dyn Fn(Arc<ChainError>) -> Value + Send + Sync>;

/// Handle to a running (or resolved) chain of steps.
///
/// Clones share the same chain. The handle stays useful after resolution:
/// observers attached late are dispatched retroactively with the recorded
/// result.
#[derive(Clone)]
pub struct Chain {
    core: Arc<Shared>,
}

impl Chain {
    /// Starts a chain that runs immediately with `args` as the first step's
    /// input.
    pub(crate) fn start(steps: VecDeque<StepRef>, args: Vec<Value>) -> Chain {
        let core = Shared::new(steps, None);
        driver::spawn(Arc::clone(&core), Start::Now(args));
        Chain { core }
    }

    /// Starts a chain whose driver parks until external arguments arrive
    /// (the deferred form).
    pub(crate) fn start_external(steps: VecDeque<StepRef>) -> Chain {
        let (tx, rx) = oneshot::channel();
        let core = Shared::new(steps, Some(tx));
        driver::spawn(Arc::clone(&core), Start::External(rx));
        Chain { core }
    }

    pub(crate) fn core(&self) -> &Arc<Shared> {
        &self.core
    }

    /// Appends a step to the end of the chain.
    ///
    /// No-op once the chain is resolved. Returns a clone of the handle so
    /// calls can be stacked.
    pub fn next(&self, step: StepRef) -> Chain {
        let mut st = core::lock(&self.core);
        if !st.resolved {
            st.steps.push_back(step);
        }
        self.clone()
    }

    /// Attaches a handler invoked on either outcome, with the failure (if
    /// any) and the success values.
    ///
    /// Counts as handling failures for unhandled-failure reporting. If the
    /// chain is already resolved the handler fires retroactively with the
    /// recorded result; a chain that exited quietly never calls it.
    ///
    /// Handlers are dispatched in attachment order under a current-thread
    /// runtime; a multi-thread runtime may run them concurrently.
    pub fn on_complete(
        &self,
        f: impl Fn(Option<Arc<ChainError>>, Vec<Value>) + Send + Sync + 'static,
    ) -> Chain {
        self.attach(Observer::Complete(Box::new(f)))
    }

    /// Alias for [`Chain::on_complete`].
    pub fn cb(
        &self,
        f: impl Fn(Option<Arc<ChainError>>, Vec<Value>) + Send + Sync + 'static,
    ) -> Chain {
        self.on_complete(f)
    }

    /// Attaches a handler invoked only on success, with the final values.
    pub fn on_success(&self, f: impl Fn(Vec<Value>) + Send + Sync + 'static) -> Chain {
        self.attach(Observer::Success(Box::new(f)))
    }

    /// Attaches a handler invoked only on failure.
    ///
    /// Counts as handling failures for unhandled-failure reporting.
    pub fn on_error(&self, f: impl Fn(Arc<ChainError>) + Send + Sync + 'static) -> Chain {
        self.attach(Observer::Error(Box::new(f)))
    }

    /// Alias for [`Chain::on_error`].
    pub fn on_failure(&self, f: impl Fn(Arc<ChainError>) + Send + Sync + 'static) -> Chain {
        self.on_error(f)
    }

    fn attach(&self, obs: Observer) -> Chain {
        let retro = {
            let mut st = core::lock(&self.core);
            if obs.observes_error() {
                st.has_error_observer = true;
            }
            if st.resolved {
                st.outcome.clone()
            } else {
                st.observers.push(obs);
                return self.clone();
            }
        };
        // Already resolved: dispatch with the recorded outcome. A quiet
        // exit recorded nothing, so the observer is simply dropped.
        match retro {
            Some(outcome) => observer::dispatch(outcome, obs),
            None => trace!("observer attached after quiet exit, dropped"),
        }
        self.clone()
    }

    /// Resolves the chain successfully with `values`, skipping remaining
    /// steps. Idempotent.
    pub fn succeed(&self, values: Vec<Value>) {
        core::resolve(&self.core, None, values);
    }

    /// Resolves the chain with a failure, skipping remaining steps.
    /// Idempotent.
    pub fn fail(&self, err: ChainError) {
        core::resolve(&self.core, Some(Arc::new(err)), Vec::new());
    }

    pub(crate) fn fail_shared(&self, err: Arc<ChainError>) {
        core::resolve(&self.core, Some(err), Vec::new());
    }

    /// Arms (or re-arms) the timeout guard.
    ///
    /// If the chain has no result when `timeout` elapses, it resolves with
    /// [`ChainError::Timeout`]. Re-arming replaces the previous guard.
    pub fn timeout(&self, timeout: Duration) -> Chain {
        let token = CancellationToken::new();
        let previous = {
            let mut st = core::lock(&self.core);
            if st.resolved {
                return self.clone();
            }
            st.timeout.replace(token.clone())
        };
        if let Some(prev) = previous {
            prev.cancel();
        }
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    core::resolve(
                        &core,
                        Some(Arc::new(ChainError::Timeout { timeout })),
                        Vec::new(),
                    );
                }
                _ = token.cancelled() => {}
            }
        });
        self.clone()
    }

    fn active(&self) -> Option<Group> {
        let group = {
            let st = core::lock(&self.core);
            if st.resolved {
                return None;
            }
            st.active.clone()
        };
        // A fired group would take registrations but never honor them.
        group.filter(Group::is_open)
    }

    /// Forwards a value to the next step through the active group.
    ///
    /// No-op when no step is currently running.
    pub fn pass(&self, value: Value) {
        if let Some(group) = self.active() {
            group.pass(value);
        }
    }

    /// Forwards several values to the next step through the active group.
    pub fn pass_all(&self, values: impl IntoIterator<Item = Value>) {
        if let Some(group) = self.active() {
            group.pass_all(values);
        }
    }

    /// Reserves a slot on the active group.
    ///
    /// Returns `None` when no step is running or the running step's group
    /// has already fired.
    pub fn slot(&self) -> Option<SlotHandle> {
        self.active().map(|g| g.slot())
    }

    /// Registers a value-less completion on the active group, if a step is
    /// running.
    pub fn wait(&self) -> Option<SlotHandle> {
        self.active().map(|g| g.wait())
    }

    /// Creates a nested group on the active group, if a step is running.
    pub fn make_group(&self) -> Option<Group> {
        self.active().map(|g| g.group())
    }

    /// True once the driver has begun stepping (or, for an externally
    /// started chain, once its arguments arrived).
    pub fn is_started(&self) -> bool {
        core::lock(&self.core).started
    }

    /// True once the chain has a result or exited quietly.
    pub fn is_resolved(&self) -> bool {
        core::lock(&self.core).resolved
    }

    /// The recorded result. `None` while running and after a quiet exit.
    pub fn outcome(&self) -> Option<Arc<Outcome>> {
        core::lock(&self.core).outcome.clone()
    }

    /// Promise-style linking: returns a deferred chain settled from this
    /// chain's result.
    ///
    /// On success, `on_fulfilled` (if given) maps the values to one value
    /// that settles the link; a value that is itself a [`Chain`] or
    /// [`Deferred`] is adopted, deferring settlement to *its* result. On
    /// failure, `on_rejected` (if given) maps the error to a recovery value
    /// and the link succeeds with it; without a handler the failure
    /// propagates to the link.
    pub fn then(&self, on_fulfilled: Option<FulfillFn>, on_rejected: Option<RejectFn>) -> Deferred {
        let target = Deferred::new();
        let link = target.clone();
        self.on_complete(move |error, values| match error {
            Some(err) => match &on_rejected {
                Some(f) => link.succeed(vec![f(err)]),
                None => link.fail_shared(err),
            },
            None => match &on_fulfilled {
                Some(f) => deferred::adopt(&link, f(values)),
                None => link.succeed(values),
            },
        });
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{Control, StepFn};
    use crate::{chain, chain_with};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    async fn settled(c: &Chain) -> Option<Arc<Outcome>> {
        while !c.is_resolved() {
            tokio::task::yield_now().await;
        }
        c.outcome()
    }

    fn nums(values: &[Value]) -> Vec<Option<u32>> {
        values
            .iter()
            .map(|v| v.downcast_ref::<u32>().copied())
            .collect()
    }

    fn boom() -> StepRef {
        StepFn::arc("boom", |_ctl: Group, _: Vec<Value>| async move {
            Err(ChainError::fail("boom"))
        })
    }

    #[tokio::test]
    async fn out_of_order_fulfillment_preserves_registration_order() {
        let scatter: StepRef = StepFn::arc("scatter", |ctl: Group, _: Vec<Value>| async move {
            let a = ctl.slot();
            let b = ctl.slot();
            tokio::spawn(async move {
                b.fulfill(Value::new(2u32));
                a.fulfill(Value::new(1u32));
            });
            Ok(Control::Continue)
        });

        let c = chain(vec![scatter]);
        let out = settled(&c).await.unwrap();
        assert!(out.error.is_none());
        assert_eq!(nums(&out.values), vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn passed_values_become_the_next_step_arguments() {
        let sum: StepRef = StepFn::arc("sum", |ctl: Group, args: Vec<Value>| async move {
            let total: u32 = args
                .iter()
                .filter_map(|v| v.downcast_ref::<u32>().copied())
                .sum();
            ctl.pass(Value::new(total));
            Ok(Control::Continue)
        });

        let c = chain_with(vec![sum], vec![Value::new(2u32), Value::new(3u32)]);
        let out = settled(&c).await.unwrap();
        assert_eq!(nums(&out.values), vec![Some(5)]);
    }

    #[tokio::test]
    async fn step_failure_skips_remaining_steps() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let never: StepRef = StepFn::arc("never", move |_ctl: Group, _: Vec<Value>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Control::Continue)
            }
        });

        let c = chain(vec![boom(), never]).on_error(|_| {});
        let out = settled(&c).await.unwrap();
        assert_eq!(out.error.as_deref(), Some(&ChainError::fail("boom")));
        assert!(out.values.is_empty());
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn succeed_before_start_skips_the_steps() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let step: StepRef = StepFn::arc("step", move |_ctl: Group, _: Vec<Value>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Control::Continue)
            }
        });

        let c = chain(vec![step]);
        c.succeed(vec![Value::new(2u32), Value::new(3u32)]);

        let out = settled(&c).await.unwrap();
        assert!(out.error.is_none());
        assert_eq!(nums(&out.values), vec![Some(2), Some(3)]);
        tokio::task::yield_now().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn group_succeed_short_circuits_the_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let finish: StepRef = StepFn::arc("finish", |ctl: Group, _: Vec<Value>| async move {
            ctl.succeed(vec![Value::new(9u32)]);
            Ok(Control::Continue)
        });
        let never: StepRef = StepFn::arc("never", move |_ctl: Group, _: Vec<Value>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Control::Continue)
            }
        });

        let c = chain(vec![finish, never]);
        let out = settled(&c).await.unwrap();
        assert_eq!(nums(&out.values), vec![Some(9)]);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exit_resolves_quietly_without_observers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&calls);
        let c2 = Arc::clone(&calls);
        let quit: StepRef = StepFn::arc("quit", |_ctl: Group, _: Vec<Value>| async move {
            Ok(Control::Exit)
        });

        let c = chain(vec![quit])
            .on_complete(move |_, _| {
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
            });

        while !c.is_resolved() {
            tokio::task::yield_now().await;
        }
        assert!(c.outcome().is_none());

        // even late observers stay silent after a quiet exit
        let c3 = Arc::clone(&calls);
        c.on_success(move |_| {
            c3.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_handlers_fire_in_attachment_order() {
        let order = Arc::new(StdMutex::new(Vec::new()));
        let c = chain(vec![boom()]);
        for i in 0..3u32 {
            let order = Arc::clone(&order);
            c.on_error(move |_| order.lock().unwrap().push(i));
        }

        settled(&c).await;
        while order.lock().unwrap().len() < 3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn observers_attached_after_resolution_fire_retroactively() {
        let c = chain_with(vec![], vec![Value::new(4u32)]);
        settled(&c).await;

        let (tx, rx) = oneshot::channel();
        let tx = StdMutex::new(Some(tx));
        c.on_success(move |values| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(nums(&values));
            }
        });
        assert_eq!(rx.await.unwrap(), vec![Some(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_over_a_slower_registration() {
        let successes = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&successes);
        let slow: StepRef = StepFn::arc("slow", |ctl: Group, _: Vec<Value>| async move {
            let slot = ctl.slot();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                slot.fulfill(Value::new(1u32));
            });
            Ok(Control::Continue)
        });

        let (tx, rx) = oneshot::channel();
        let tx = StdMutex::new(Some(tx));
        let c = chain(vec![slow])
            .timeout(Duration::from_millis(20))
            .on_error(move |err| {
                assert!(err.is_timeout());
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            })
            .on_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            });

        rx.await.unwrap();
        assert!(c.outcome().unwrap().error.as_ref().unwrap().is_timeout());

        // let the late fulfillment come and go
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert!(c.outcome().unwrap().error.as_ref().unwrap().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_disarms_the_timeout_guard() {
        let c = chain_with(vec![], vec![Value::new(1u32)]).timeout(Duration::from_millis(50));
        let out = settled(&c).await.unwrap();
        assert!(out.error.is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(c.outcome().unwrap().error.is_none());
    }

    #[tokio::test]
    async fn next_appends_steps_before_the_driver_runs() {
        let c = chain_with(vec![], vec![Value::new(1u32)]);
        c.next(StepFn::arc("inc", |ctl: Group, args: Vec<Value>| async move {
            let n = args[0].downcast_ref::<u32>().copied().unwrap_or(0);
            ctl.pass(Value::new(n + 1));
            Ok(Control::Continue)
        }));

        let out = settled(&c).await.unwrap();
        assert_eq!(nums(&out.values), vec![Some(2)]);
    }

    #[tokio::test]
    async fn handle_proxies_group_operations_while_a_step_runs() {
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let plumbing = StdMutex::new(Some((ready_tx, gate_rx)));
        let park: StepRef = StepFn::arc("park", move |_ctl: Group, _: Vec<Value>| {
            let io = plumbing.lock().unwrap().take();
            async move {
                if let Some((ready, gate)) = io {
                    let _ = ready.send(());
                    let _ = gate.await;
                }
                Ok(Control::Continue)
            }
        });

        let c = chain(vec![park]);
        ready_rx.await.unwrap();

        c.pass(Value::new(1u32));
        let slot = c.slot().expect("a step is active");
        slot.fulfill(Value::new(2u32));
        let _ = gate_tx.send(());

        let out = settled(&c).await.unwrap();
        assert_eq!(nums(&out.values), vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn then_maps_success_to_a_plain_value() {
        let c = chain_with(vec![], vec![Value::new(20u32)]);
        let link = c.then(
            Some(Box::new(|values: Vec<Value>| {
                let n = values[0].downcast_ref::<u32>().copied().unwrap_or(0);
                Value::new(n + 1)
            })),
            None,
        );

        let out = settled(&link.as_chain()).await.unwrap();
        assert_eq!(nums(&out.values), vec![Some(21)]);
    }

    #[tokio::test]
    async fn then_adopts_a_returned_deferred() {
        let inner = Deferred::new();
        let adopted = inner.clone();
        let c = chain(vec![]);
        let link = c.then(Some(Box::new(move |_| Value::new(adopted.clone()))), None);

        tokio::task::yield_now().await;
        assert!(!link.is_resolved());

        inner.succeed(vec![Value::new(9u32)]);
        let out = settled(&link.as_chain()).await.unwrap();
        assert_eq!(nums(&out.values), vec![Some(9)]);
    }

    #[tokio::test]
    async fn then_recovers_with_the_rejection_handler() {
        let c = chain(vec![boom()]);
        let link = c.then(
            None,
            Some(Box::new(|err: Arc<ChainError>| {
                Value::new(err.as_label().to_string())
            })),
        );

        let out = settled(&link.as_chain()).await.unwrap();
        assert!(out.error.is_none());
        assert_eq!(
            out.values[0].downcast_ref::<String>().map(String::as_str),
            Some("chain_failed")
        );
    }

    #[tokio::test]
    async fn then_propagates_failure_without_a_rejection_handler() {
        let c = chain(vec![boom()]);
        let link = c.then(None, None).on_error(|_| {});

        let out = settled(&link.as_chain()).await.unwrap();
        assert_eq!(out.error.as_deref(), Some(&ChainError::fail("boom")));
    }
}
