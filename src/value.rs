//! # Dynamic values passed between steps.
//!
//! Steps in a chain exchange heterogeneous, positionally ordered results.
//! [`Value`] is the unit of that exchange: a cheaply cloneable, type-erased
//! container with an explicit *absent* state.
//!
//! ## Absent values
//! A slot that is fulfilled without a payload, or a reserved index that a
//! multi-value fulfillment never reached, holds [`Value::absent`]. Absence is
//! first-class and observable via [`Value::is_absent`]; it is never conflated
//! with a stored `Option` or a unit value.
//!
//! ## Example
//! ```rust
//! use flowseq::Value;
//!
//! let v = Value::new(42u32);
//! assert_eq!(v.downcast_ref::<u32>(), Some(&42));
//! assert!(!v.is_absent());
//!
//! let none = Value::absent();
//! assert!(none.is_absent());
//! assert_eq!(none.downcast_ref::<u32>(), None);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased, shareable value exchanged between steps.
///
/// Clones are cheap (`Arc` internally). Payload access is by downcast:
/// the consumer names the concrete type it expects.
#[derive(Clone)]
pub struct Value(Option<Arc<dyn Any + Send + Sync>>);

impl Value {
    /// Wraps a concrete value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Value(Some(Arc::new(value)))
    }

    /// Wraps an already-shared value without another allocation.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Value(Some(value))
    }

    /// The explicit absent marker.
    pub fn absent() -> Self {
        Value(None)
    }

    /// Wraps an ordered list of values (the shape produced by a nested
    /// join group).
    pub fn list(values: Vec<Value>) -> Self {
        Value::new(values)
    }

    /// True if this is the absent marker.
    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    /// Borrows the payload as `T`, if present and of that type.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns a shared handle to the payload as `T`, if present and of
    /// that type.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().and_then(|v| v.downcast::<T>().ok())
    }

    /// Borrows the payload as a list of values, if it is one.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        self.downcast_ref::<Vec<Value>>()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("Value(absent)"),
            Some(_) => f.write_str("Value(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_roundtrip() {
        let v = Value::new(String::from("hello"));
        assert_eq!(v.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(v.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn absent_is_distinct_from_unit() {
        let unit = Value::new(());
        assert!(!unit.is_absent());
        assert!(Value::absent().is_absent());
    }

    #[test]
    fn list_roundtrip_preserves_order() {
        let l = Value::list(vec![Value::new(1u8), Value::new(2u8), Value::new(3u8)]);
        let items = l.as_list().expect("list payload");
        let got: Vec<u8> = items
            .iter()
            .map(|v| *v.downcast_ref::<u8>().expect("u8"))
            .collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn downcast_arc_shares_payload() {
        let v = Value::new(7i64);
        let a = v.downcast_arc::<i64>().expect("arc");
        assert_eq!(*a, 7);
        // still accessible through the original handle
        assert_eq!(v.downcast_ref::<i64>(), Some(&7));
    }
}
