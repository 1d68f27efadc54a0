//! Equality policies used to decide whether a recomputed value changed.
//!
//! When a policy reports the old and new values as equal, the node is marked
//! clean and nothing downstream is notified. Pass any of these to
//! [`ReactiveBuilder::equals`](crate::reactive::ReactiveBuilder::equals), or
//! a closure of the same shape.

use std::rc::Rc;

/// Shared comparator: returns `true` when two values are considered equal.
pub type Equality<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Plain `PartialEq` comparison. This is the default policy.
pub fn partial_eq<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Treat every recomputation as a change.
///
/// Useful for values without a meaningful equality, at the cost of always
/// propagating.
pub fn never_equal<T>(_: &T, _: &T) -> bool {
    false
}

/// Identity comparison for shared values.
pub fn rc_ptr_eq<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}

/// Compare only `Ok` values; any `Err` counts as a change.
pub fn ok_eq<T: PartialEq, E>(a: &Result<T, E>, b: &Result<T, E>) -> bool {
    match (a, b) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
