//! Dependency comparison for effect and memo hooks.
//!
//! Dependencies are compared with SameValue semantics: `NaN` equals itself
//! and `+0.0` differs from `-0.0`. A missing dependency value means the hook
//! re-runs on every render.

use std::rc::Rc;

/// Pass as `deps` to re-run a hook on every render.
pub const EVERY_RENDER: Option<()> = None;

/// A value that can be used as a hook dependency.
pub trait HookInput: Clone + 'static {
    /// Whether `self` and `other` should be treated as the same input.
    fn same_value(&self, other: &Self) -> bool;
}

/// Whether a hook with `prev` dependencies must re-run for `next`.
pub fn deps_changed<D: HookInput>(prev: Option<&D>, next: Option<&D>) -> bool {
    match (prev, next) {
        (Some(prev), Some(next)) => !prev.same_value(next),
        _ => true,
    }
}

/// Adapts any `PartialEq` value into a dependency compared with `==`.
#[derive(Debug, Clone, PartialEq)]
pub struct ByEq<T>(pub T);

impl<T: PartialEq + Clone + 'static> HookInput for ByEq<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

macro_rules! eq_input {
    ($($ty:ty),* $(,)?) => {
        $(
            impl HookInput for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

eq_input!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    String,
    &'static str,
);

macro_rules! float_input {
    ($($ty:ty),*) => {
        $(
            impl HookInput for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
                }
            }
        )*
    };
}

float_input!(f32, f64);

impl<T: HookInput> HookInput for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: HookInput> HookInput for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

impl<T: HookInput, const N: usize> HookInput for [T; N] {
    fn same_value(&self, other: &Self) -> bool {
        self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

/// Shared values compare by identity, not contents.
impl<T: ?Sized + 'static> HookInput for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

macro_rules! tuple_input {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: HookInput),+> HookInput for ($($name,)+) {
            fn same_value(&self, other: &Self) -> bool {
                $(self.$idx.same_value(&other.$idx))&&+
            }
        }
    };
}

tuple_input!(A 0);
tuple_input!(A 0, B 1);
tuple_input!(A 0, B 1, C 2);
tuple_input!(A 0, B 1, C 2, D 3);
tuple_input!(A 0, B 1, C 2, D 3, E 4);
tuple_input!(A 0, B 1, C 2, D 3, E 4, F 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_same_as_nan() {
        let prev = (1, f64::NAN);
        let next = (1, f64::NAN);
        assert!(!deps_changed(Some(&prev), Some(&next)));
    }

    #[test]
    fn signed_zeroes_differ() {
        assert!(deps_changed(Some(&[0.0f64]), Some(&[-0.0f64])));
        assert!(!deps_changed(Some(&[0.0f64]), Some(&[0.0f64])));
    }

    #[test]
    fn missing_deps_always_change() {
        assert!(deps_changed(EVERY_RENDER.as_ref(), EVERY_RENDER.as_ref()));
        assert!(deps_changed(None, Some(&1)));
    }

    #[test]
    fn vec_length_is_part_of_identity() {
        assert!(deps_changed(Some(&vec![1, 2]), Some(&vec![1, 2, 3])));
        assert!(!deps_changed(Some(&vec![1, 2]), Some(&vec![1, 2])));
    }

    #[test]
    fn rc_compares_by_pointer() {
        let a = Rc::new(5);
        let b = Rc::new(5);
        assert!(a.same_value(&a.clone()));
        assert!(!a.same_value(&b));
    }

    #[test]
    fn by_eq_uses_partial_eq() {
        #[derive(Clone, PartialEq)]
        struct Point {
            x: i32,
        }
        assert!(ByEq(Point { x: 1 }).same_value(&ByEq(Point { x: 1 })));
        assert!(!ByEq(Point { x: 1 }).same_value(&ByEq(Point { x: 2 })));
    }
}
