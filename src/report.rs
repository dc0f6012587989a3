//! Process-wide reporter for unhandled chain failures.
//!
//! When a chain resolves with an error and no error-observing handler was
//! attached by the next turn, the failure is escalated here instead of being
//! silently dropped. The hook is global, replaceable at startup, and lives
//! outside any per-chain state.
//!
//! The default reporter logs the failure and panics, surfacing the error on
//! the embedding runtime's fault channel. Embedders that want different
//! semantics (crash reporting, metrics, swallowing in tests) install their
//! own hook with [`set_unhandled_reporter`].
//!
//! ## Example
//! ```rust
//! use flowseq::{set_unhandled_reporter, ChainError};
//!
//! set_unhandled_reporter(|err: &ChainError| {
//!     eprintln!("chain failed with nobody listening: {err}");
//! });
//! ```

use std::sync::RwLock;

use crate::error::ChainError;

type Reporter = Box<dyn Fn(&ChainError) + Send + Sync>;

static REPORTER: RwLock<Option<Reporter>> = RwLock::new(None);

/// Replaces the process-wide unhandled-failure hook.
///
/// The hook is invoked at most once per chain, with the failure the chain
/// resolved with. Installation is intended to happen once at startup;
/// replacing the hook while chains are in flight is safe but the old hook
/// may still observe failures already being reported.
pub fn set_unhandled_reporter(f: impl Fn(&ChainError) + Send + Sync + 'static) {
    let mut slot = REPORTER.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(Box::new(f));
}

/// Restores the default rethrow-to-top-level behavior.
pub fn reset_unhandled_reporter() {
    let mut slot = REPORTER.write().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

/// Delivers an unhandled failure to the installed hook.
///
/// Default behavior (no hook installed): log and panic, so the failure
/// reaches the runtime's fault handling rather than vanishing.
pub fn report_unhandled(err: &ChainError) {
    let slot = REPORTER.read().unwrap_or_else(|e| e.into_inner());
    match &*slot {
        Some(f) => f(err),
        None => {
            log::error!("unhandled chain failure: {err}");
            panic!("unhandled chain failure: {err}");
        }
    }
}
