//! # Chains: ordered execution of steps.
//!
//! A chain owns a queue of steps and a single driver task that runs them one
//! at a time. Each step's advancement is gated by its join group; the values
//! the group buffers become the next step's arguments. A chain resolves
//! exactly once, with either the final values or a failure, and the result
//! is retroactively visible to observers attached later.
//!
//! ```text
//!  [step 0] --group fires--> [step 1] --group fires--> ... --> Outcome
//!      |                         |
//!      +--- error / succeed -----+-----------> Outcome (short-circuit)
//! ```

pub(crate) mod core;
mod driver;
mod handle;
pub(crate) mod observer;

pub use self::core::Outcome;
pub use handle::{Chain, FulfillFn, RejectFn};
