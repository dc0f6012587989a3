//! # Join groups: the per-step synchronization barrier.
//!
//! Every step invocation gets a fresh [`Group`]. Registrations on the group
//! ([`Group::slot`], [`Group::wait`], [`Group::group`]) gate the advance to
//! the next step; the buffered values are forwarded to it in registration
//! order, never completion order.
//!
//! ## Contents
//! - [`Group`] - the barrier itself, plus terminal shortcuts
//!   ([`Group::succeed`], [`Group::fail`]) and error short-circuit
//!   ([`Group::error`])
//! - [`SlotHandle`] - one-shot completion handle returned by registrations

mod barrier;
mod slot;

pub use barrier::Group;
pub use slot::SlotHandle;

pub(crate) use barrier::Advance;
