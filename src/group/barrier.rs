//! # Group: the per-step join barrier.
//!
//! A [`Group`] tracks how many registered completions are still outstanding
//! for the current step and buffers their results positionally. When the
//! outstanding count reaches zero the group fires exactly once into its
//! sink: the chain driver for a top-level group, or one reserved slot of the
//! parent for a nested group.
//!
//! ## Ordering
//! ```text
//! let a = ctl.slot();   // reserves buffer index 0
//! let b = ctl.slot();   // reserves buffer index 1
//! // b may resolve first; the next step still sees [a, b]
//! ```
//!
//! ## Rules
//! - The buffer is filled by **registration order**, never completion order.
//! - A group fires **at most once**; error and completion race safely.
//! - Once a group is done, every operation on it is an inert no-op.
//! - The driver holds one phantom count unit while the step body runs, so a
//!   step that registers nothing cannot fire the group mid-registration.
//! - A nested group holds the same phantom as an RAII registration window:
//!   it closes when the last user clone of the handle drops. Zero
//!   registrations therefore still produce an empty list in the parent.

use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;
use tokio::sync::oneshot;

use crate::chain::core::{self, Shared};
use crate::error::ChainError;
use crate::group::slot::SlotHandle;
use crate::value::Value;

/// Message a top-level group sends to the chain driver when it fires.
pub(crate) enum Advance {
    /// All registrations resolved; buffered values in registration order.
    Done(Vec<Value>),
    /// A registration or the step body failed.
    Error(Arc<ChainError>),
}

/// Where a group delivers its one-shot completion.
enum Sink {
    /// Top-level group: wake the chain driver.
    Driver(oneshot::Sender<Advance>),
    /// Nested group: fill one reserved slot of the parent.
    Parent { parent: Group, index: usize },
    /// Already fired, or detached by early chain resolution.
    Detached,
}

struct GroupState {
    /// Result buffer, ordered by registration.
    buffer: Vec<Value>,
    /// Outstanding count: registrations plus any phantom units.
    left: usize,
    /// Set once the group has fired (or been detached); guards re-entry.
    done: bool,
    sink: Sink,
}

/// Deferred effect computed under the state lock, executed after release.
enum Fired {
    None,
    Driver(oneshot::Sender<Advance>, Advance),
    FillParent {
        parent: Group,
        index: usize,
        value: Value,
    },
    EscalateParent {
        parent: Group,
        err: Arc<ChainError>,
    },
}

/// Per-step join barrier and control handle.
///
/// Handed to every step as its explicit control argument; also reachable
/// through the chain handle while a step is active. Clones share the same
/// barrier.
#[derive(Clone)]
pub struct Group {
    state: Arc<Mutex<GroupState>>,
    chain: Arc<Shared>,
    /// Registration window for nested groups; `None` for top-level groups
    /// and internal clones.
    window: Option<Arc<Window>>,
}

/// RAII registration window of a nested group.
///
/// Holds the phantom count unit added at creation; dropping the last user
/// clone of the nested handle removes it, letting a zero-registration
/// nested group complete with an empty list.
struct Window {
    state: Arc<Mutex<GroupState>>,
}

impl Drop for Window {
    fn drop(&mut self) {
        decrement(&self.state);
    }
}

fn lock(state: &Mutex<GroupState>) -> MutexGuard<'_, GroupState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs the effect computed under the lock. Never called while holding it.
fn fire(fired: Fired) {
    match fired {
        Fired::None => {}
        Fired::Driver(tx, msg) => {
            // The driver may already be gone (chain resolved); harmless.
            let _ = tx.send(msg);
        }
        Fired::FillParent {
            parent,
            index,
            value,
        } => parent.fill(index, 1, vec![value]),
        Fired::EscalateParent { parent, err } => parent.error_shared(err),
    }
}

/// Takes the sink and builds the completion effect. Caller holds the lock
/// and has already set `done`.
fn complete_locked(st: &mut GroupState) -> Fired {
    match std::mem::replace(&mut st.sink, Sink::Detached) {
        Sink::Driver(tx) => Fired::Driver(tx, Advance::Done(st.buffer.clone())),
        Sink::Parent { parent, index } => Fired::FillParent {
            parent,
            index,
            value: Value::list(st.buffer.clone()),
        },
        Sink::Detached => Fired::None,
    }
}

fn decrement_locked(st: &mut GroupState) -> Fired {
    if st.done {
        return Fired::None;
    }
    st.left = st.left.saturating_sub(1);
    if st.left > 0 {
        return Fired::None;
    }
    st.done = true;
    complete_locked(st)
}

/// Removes one count unit, firing the group if it reaches zero.
fn decrement(state: &Arc<Mutex<GroupState>>) {
    let fired = {
        let mut st = lock(state);
        decrement_locked(&mut st)
    };
    fire(fired);
}

impl Group {
    /// Creates the top-level group for one step invocation, wired to the
    /// chain driver.
    pub(crate) fn for_driver(chain: Arc<Shared>, tx: oneshot::Sender<Advance>) -> Group {
        Group {
            state: Arc::new(Mutex::new(GroupState {
                buffer: Vec::new(),
                left: 0,
                done: false,
                sink: Sink::Driver(tx),
            })),
            chain,
            window: None,
        }
    }

    /// Clone that never carries the registration window. Used for slot
    /// handles and parent back-references, which must not hold a nested
    /// group's window open.
    fn internal(&self) -> Group {
        Group {
            state: Arc::clone(&self.state),
            chain: Arc::clone(&self.chain),
            window: None,
        }
    }

    /// Appends a value to the buffer for the next step.
    ///
    /// Side effect only: does not touch the outstanding count.
    pub fn pass(&self, value: Value) {
        let mut st = lock(&self.state);
        if st.done {
            return;
        }
        st.buffer.push(value);
    }

    /// Appends several values to the buffer, preserving their order.
    pub fn pass_all(&self, values: impl IntoIterator<Item = Value>) {
        let mut st = lock(&self.state);
        if st.done {
            return;
        }
        st.buffer.extend(values);
    }

    /// Reserves one buffer slot and returns its completion handle.
    pub fn slot(&self) -> SlotHandle {
        self.slot_n(1)
    }

    /// Reserves `width` contiguous buffer slots filled by one handle.
    ///
    /// The handle's values are written in order; slots its fulfillment
    /// never reaches stay [`Value::absent`]. `width` is clamped to at
    /// least 1.
    pub fn slot_n(&self, width: usize) -> SlotHandle {
        let width = width.max(1);
        let index = {
            let mut st = lock(&self.state);
            let index = st.buffer.len();
            st.buffer
                .extend(std::iter::repeat_with(Value::absent).take(width));
            if !st.done {
                st.left += 1;
            }
            index
        };
        trace!("slot reserved: index={index} width={width}");
        SlotHandle::new(self.internal(), index, width)
    }

    /// Registers a completion that gates advancement but writes no value.
    pub fn wait(&self) -> SlotHandle {
        {
            let mut st = lock(&self.state);
            if !st.done {
                st.left += 1;
            }
        }
        trace!("wait registered");
        SlotHandle::new(self.internal(), 0, 0)
    }

    /// Creates a nested group collecting several completions into one
    /// ordered list.
    ///
    /// The nested group occupies a single reserved slot of this group; its
    /// sub-slots accumulate into a list placed there, ordered by sub-slot
    /// registration. The returned handle is the registration window: once
    /// the last clone drops, no further sub-slots count, and a nested
    /// group with zero registrations completes immediately with `[]`.
    pub fn group(&self) -> Group {
        let index = {
            let mut st = lock(&self.state);
            let index = st.buffer.len();
            st.buffer.push(Value::list(Vec::new()));
            if !st.done {
                st.left += 1;
            }
            index
        };
        let child = Arc::new(Mutex::new(GroupState {
            buffer: Vec::new(),
            // the registration window, released when the last handle drops
            left: 1,
            done: false,
            sink: Sink::Parent {
                parent: self.internal(),
                index,
            },
        }));
        trace!("nested group reserved: index={index}");
        Group {
            state: Arc::clone(&child),
            chain: Arc::clone(&self.chain),
            window: Some(Arc::new(Window { state: child })),
        }
    }

    /// Alias for [`Group::group`].
    pub fn make_group(&self) -> Group {
        self.group()
    }

    /// Short-circuits this step with an error.
    ///
    /// Idempotent: a no-op once the group has fired. Remaining buffer slots
    /// are bypassed and this step's unfired handles become inert.
    pub fn error(&self, err: ChainError) {
        self.error_shared(Arc::new(err));
    }

    pub(crate) fn error_shared(&self, err: Arc<ChainError>) {
        let fired = {
            let mut st = lock(&self.state);
            if st.done {
                return;
            }
            st.done = true;
            match std::mem::replace(&mut st.sink, Sink::Detached) {
                Sink::Driver(tx) => Fired::Driver(tx, Advance::Error(err)),
                Sink::Parent { parent, .. } => Fired::EscalateParent { parent, err },
                Sink::Detached => Fired::None,
            }
        };
        fire(fired);
    }

    /// Terminal shortcut: resolves the owning chain successfully with
    /// `values`, skipping any remaining steps. Idempotent.
    pub fn succeed(&self, values: Vec<Value>) {
        core::resolve(&self.chain, None, values);
    }

    /// Terminal shortcut: resolves the owning chain with a failure,
    /// skipping any remaining steps. Idempotent.
    pub fn fail(&self, err: ChainError) {
        core::resolve(&self.chain, Some(Arc::new(err)), Vec::new());
    }

    /// Writes `values` into the reserved range starting at `index` and
    /// removes one count unit. `width == 0` writes nothing (wait
    /// registration). No-op once the group is done.
    pub(crate) fn fill(&self, index: usize, width: usize, values: Vec<Value>) {
        let fired = {
            let mut st = lock(&self.state);
            if st.done {
                return;
            }
            if width > 0 {
                for (i, v) in values.into_iter().take(width).enumerate() {
                    st.buffer[index + i] = v;
                }
            }
            decrement_locked(&mut st)
        };
        fire(fired);
    }

    /// Adds the driver's phantom count unit for the duration of a step
    /// body.
    pub(crate) fn hold(&self) {
        let mut st = lock(&self.state);
        if !st.done {
            st.left += 1;
        }
    }

    /// Removes the phantom unit; fires the group if nothing is
    /// outstanding.
    pub(crate) fn release(&self) {
        decrement(&self.state);
    }

    /// True while the group can still accept registrations.
    pub(crate) fn is_open(&self) -> bool {
        !lock(&self.state).done
    }

    /// Detaches the group after chain resolution: marks it done and drops
    /// the sink, so late handle fires are inert and the driver unblocks.
    pub(crate) fn close(&self) {
        let mut st = lock(&self.state);
        st.done = true;
        st.sink = Sink::Detached;
    }
}
