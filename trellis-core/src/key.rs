//! Key Resolution
//!
//! A [`Key`] selects which memoized variant of a parameterized computation a
//! call refers to. Unparameterized computations always use [`Key::Unit`], so
//! every call shares one node. Parameterized computations derive a key from
//! their arguments through a [`KeyFn`].

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

/// Derives a [`Key`] from call arguments.
pub type KeyFn<A> = Rc<dyn Fn(&A) -> Key>;

/// Identity of one node within its owning computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// The single key of an unparameterized computation.
    #[default]
    Unit,
    /// An integer key.
    Int(i64),
    /// A textual key.
    Text(Arc<str>),
    /// A key derived by hashing the arguments.
    ///
    /// Two argument values with colliding hashes share a node. Use an explicit
    /// key function when that matters.
    Hash(u64),
}

impl Key {
    /// Derive a key by hashing a value.
    pub fn hashed<H: Hash + ?Sized>(value: &H) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Key::Hash(hasher.finish())
    }

    /// Returns `true` for the unparameterized key.
    pub fn is_unit(&self) -> bool {
        matches!(self, Key::Unit)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Unit => Ok(()),
            Key::Int(value) => write!(f, "{value}"),
            Key::Text(value) => write!(f, "{value:?}"),
            Key::Hash(value) => write!(f, "#{value:016x}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(Arc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(Arc::from(value))
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Key::Text(Arc::from(value.as_str()))
    }
}

impl From<()> for Key {
    fn from(_: ()) -> Self {
        Key::Unit
    }
}

macro_rules! int_keys {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Key::Int(value as i64)
                }
            }
        )*
    };
}

int_keys!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Int(i64::from(value))
    }
}

/// Resolves the key for `args`, falling back to [`Key::Unit`] when no key
/// function was configured.
pub(crate) fn resolve<A>(key_fn: Option<&KeyFn<A>>, args: &A) -> Key {
    match key_fn {
        Some(key_fn) => key_fn(args),
        None => Key::Unit,
    }
}

/// Label used for a node in logs, errors and snapshots.
pub(crate) fn label(name: &str, key: &Key) -> String {
    if key.is_unit() {
        name.to_string()
    } else {
        format!("{name}({key})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_fn_resolves_to_unit() {
        assert_eq!(resolve::<i32>(None, &7), Key::Unit);
        assert_eq!(resolve::<&str>(None, &"anything"), Key::Unit);
    }

    #[test]
    fn key_fn_selects_variant() {
        let key_fn: KeyFn<i32> = Rc::new(|x| Key::from(*x));
        assert_eq!(resolve(Some(&key_fn), &2), Key::Int(2));
        assert_ne!(resolve(Some(&key_fn), &2), resolve(Some(&key_fn), &3));
    }

    #[test]
    fn hashed_keys_are_stable_per_value() {
        assert_eq!(Key::hashed(&("foo", 1)), Key::hashed(&("foo", 1)));
        assert_ne!(Key::hashed(&("foo", 1)), Key::hashed(&("foo", 2)));
    }

    #[test]
    fn labels_omit_the_unit_key() {
        assert_eq!(label("total", &Key::Unit), "total");
        assert_eq!(label("scaled", &Key::Int(4)), "scaled(4)");
        assert_eq!(label("lookup", &Key::from("bar")), "lookup(\"bar\")");
    }
}
