//! # One-shot completion handles.
//!
//! A [`SlotHandle`] is returned by [`Group::slot`](crate::Group::slot),
//! [`Group::slot_n`](crate::Group::slot_n) and
//! [`Group::wait`](crate::Group::wait). It may be sent to any task; the
//! first invocation is authoritative and every later one is ignored
//! (first-write-wins).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::trace;

use crate::error::ChainError;
use crate::group::barrier::Group;
use crate::value::Value;

/// One-shot handle resolving a single registration on a [`Group`].
///
/// Cheap to clone; clones share the one-shot guard, so exactly one
/// invocation across all clones takes effect.
#[derive(Clone)]
pub struct SlotHandle {
    group: Group,
    index: usize,
    width: usize,
    fired: Arc<AtomicBool>,
}

impl SlotHandle {
    pub(crate) fn new(group: Group, index: usize, width: usize) -> Self {
        SlotHandle {
            group,
            index,
            width,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once this handle (or a clone) has been invoked.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Fulfills the registration with a single value.
    pub fn fulfill(&self, value: Value) {
        self.finish(vec![value]);
    }

    /// Fulfills a multi-slot registration; values land in reservation
    /// order, missing trailing slots stay absent, extras are dropped.
    pub fn fulfill_all(&self, values: Vec<Value>) {
        self.finish(values);
    }

    /// Fulfills the registration without a payload; the reserved slots
    /// stay [`Value::absent`].
    pub fn absent(&self) {
        self.finish(Vec::new());
    }

    /// Routes a failure to the group's error path, short-circuiting the
    /// step.
    pub fn fail(&self, err: ChainError) {
        if self.fired.swap(true, Ordering::SeqCst) {
            trace!("ignoring repeat fire of slot {}", self.index);
            return;
        }
        self.group.error(err);
    }

    fn finish(&self, values: Vec<Value>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            trace!("ignoring repeat fire of slot {}", self.index);
            return;
        }
        self.group.fill(self.index, self.width, values);
    }
}
