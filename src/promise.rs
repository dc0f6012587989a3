//! Promise-style construction over [`Deferred`].
//!
//! [`pending`] splits a fresh deferred into the promise half (observe,
//! chain) and the settling half (fulfill or reject exactly once). It is a
//! thin consumer of [`Deferred`]; nothing here touches chain internals.

use crate::deferred::{self, Deferred};
use crate::error::ChainError;
use crate::value::Value;

/// A pending promise: the deferred to hand to consumers plus its settler.
pub struct PromiseParts {
    /// The observable half.
    pub promise: Deferred,
    /// The resolving half.
    pub settle: Settle,
}

/// Write-once settling handle for a [`PromiseParts`] promise.
///
/// Cloneable; the first settlement across all clones wins.
#[derive(Clone)]
pub struct Settle {
    target: Deferred,
}

impl Settle {
    /// Fulfills the promise with `value`.
    ///
    /// A value that is itself a [`Chain`](crate::Chain) or [`Deferred`] is
    /// adopted: the promise settles with that chain's eventual result.
    pub fn fulfill(&self, value: Value) {
        deferred::adopt(&self.target, value);
    }

    /// Rejects the promise.
    pub fn reject(&self, err: ChainError) {
        self.target.fail(err);
    }
}

/// Creates a pending promise and its settling handle.
pub fn pending() -> PromiseParts {
    let promise = Deferred::new();
    let settle = Settle {
        target: promise.clone(),
    };
    PromiseParts { promise, settle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn first_settlement_wins() {
        let parts = pending();
        parts.settle.fulfill(Value::new(4u32));
        parts.settle.reject(ChainError::fail("late"));

        while !parts.promise.is_resolved() {
            tokio::task::yield_now().await;
        }
        let out = parts.promise.outcome().unwrap();
        assert!(out.error.is_none());
        assert_eq!(out.values[0].downcast_ref::<u32>(), Some(&4));
    }

    #[tokio::test]
    async fn rejection_reaches_error_observers() {
        let parts = pending();
        let (tx, rx) = oneshot::channel();
        let tx = StdMutex::new(Some(tx));
        parts.promise.on_error(move |err| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(err.as_label());
            }
        });

        parts.settle.reject(ChainError::fail("nope"));
        assert_eq!(rx.await.unwrap(), "chain_failed");
    }

    #[tokio::test]
    async fn fulfilling_with_a_deferred_adopts_its_result() {
        let inner = Deferred::new();
        let parts = pending();
        parts.settle.fulfill(Value::new(inner.clone()));

        tokio::task::yield_now().await;
        assert!(!parts.promise.is_resolved());

        inner.succeed(vec![Value::new(6u32)]);
        while !parts.promise.is_resolved() {
            tokio::task::yield_now().await;
        }
        let out = parts.promise.outcome().unwrap();
        assert_eq!(out.values[0].downcast_ref::<u32>(), Some(&6));
    }

    #[tokio::test]
    async fn rejection_propagates_through_adoption() {
        let inner = Deferred::new();
        let parts = pending();
        parts.promise.on_error(|_| {});
        parts.settle.fulfill(Value::new(inner.clone()));

        inner.fail(ChainError::fail("inner"));
        while !parts.promise.is_resolved() {
            tokio::task::yield_now().await;
        }
        let out = parts.promise.outcome().unwrap();
        assert_eq!(out.error.as_deref(), Some(&ChainError::fail("inner")));
    }
}
