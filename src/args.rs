//! Runtime arguments of a parametric factory call.
//!
//! Arguments cross the factory boundary type-erased: the call site turns its
//! values into [`KeySegment`]s ([`IntoArgs`]), which both become the trailing
//! part of the query key and are handed back to the factory closure, which
//! recovers the concrete types it declared ([`FromArgs`]).

use std::any::type_name;

use crate::key::{Cachable, KeySegment};
use crate::ResolveError;

/// The argument list of one factory call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Args {
    values: Vec<KeySegment>,
}

impl Args {
    /// Create an argument list.
    pub fn new(values: Vec<KeySegment>) -> Self {
        Self { values }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The arguments as key segments.
    pub fn segments(&self) -> &[KeySegment] {
        &self.values
    }

    /// Extract the argument at `index` as a `T`.
    pub fn get<T: Cachable>(&self, index: usize) -> Result<T, ResolveError> {
        let segment = self.values.get(index).ok_or(ResolveError::ArgumentCount {
            expected: index + 1,
            found: self.values.len(),
        })?;
        segment
            .downcast::<T>()
            .cloned()
            .ok_or_else(|| ResolveError::ArgumentType {
                index,
                expected: type_name::<T>(),
                found: segment.type_name(),
            })
    }

    fn expect_len(&self, expected: usize) -> Result<(), ResolveError> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(ResolveError::ArgumentCount {
                expected,
                found: self.values.len(),
            })
        }
    }
}

impl IntoIterator for Args {
    type Item = KeySegment;
    type IntoIter = std::vec::IntoIter<KeySegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Values that can be passed to a factory call.
///
/// Implemented for `()`, [`Args`], and tuples of up to six values that
/// convert into [`KeySegment`].
pub trait IntoArgs {
    /// Convert into an argument list.
    fn into_args(self) -> Args;
}

/// Argument types a factory closure can declare.
///
/// Implemented for `()`, [`Args`] (raw access), and tuples of up to six
/// [`Cachable`] values.
///
/// String arguments must be declared as `String`: call sites store every
/// `&str` as a `String` segment, so a closure taking `(&'static str,)` is
/// rejected with [`ResolveError::ArgumentType`] on every call.
pub trait FromArgs: Sized {
    /// Number of arguments expected, or `None` for variadic.
    const ARITY: Option<usize>;

    /// Recover typed arguments from an argument list.
    fn from_args(args: &Args) -> Result<Self, ResolveError>;
}

impl IntoArgs for Args {
    fn into_args(self) -> Args {
        self
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Args {
        Args::default()
    }
}

impl FromArgs for Args {
    const ARITY: Option<usize> = None;

    fn from_args(args: &Args) -> Result<Self, ResolveError> {
        Ok(args.clone())
    }
}

impl FromArgs for () {
    const ARITY: Option<usize> = Some(0);

    fn from_args(args: &Args) -> Result<Self, ResolveError> {
        args.expect_len(0)
    }
}

macro_rules! impl_args_for_tuple {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: Into<KeySegment>),+> IntoArgs for ($($name,)+) {
            fn into_args(self) -> Args {
                Args::new(vec![$(self.$idx.into()),+])
            }
        }

        impl<$($name: Cachable),+> FromArgs for ($($name,)+) {
            const ARITY: Option<usize> = Some($len);

            fn from_args(args: &Args) -> Result<Self, ResolveError> {
                args.expect_len($len)?;
                Ok(($(args.get::<$name>($idx)?,)+))
            }
        }
    };
}

impl_args_for_tuple!(1; A: 0);
impl_args_for_tuple!(2; A: 0, B: 1);
impl_args_for_tuple!(3; A: 0, B: 1, C: 2);
impl_args_for_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_args_for_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_args_for_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// Build an [`Args`] from values convertible into [`KeySegment`].
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::default()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::new(vec![$($crate::KeySegment::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_round_trip_through_segments() {
        let args = ("test", 1).into_args();
        let (name, page): (String, i32) = FromArgs::from_args(&args).unwrap();
        assert_eq!(name, "test");
        assert_eq!(page, 1);
    }

    #[test]
    fn test_arity_mismatch() {
        let args = (1, 2).into_args();
        let err = <(i32,)>::from_args(&args).unwrap_err();
        assert_eq!(
            err,
            ResolveError::ArgumentCount {
                expected: 1,
                found: 2
            }
        );
        assert!(matches!(
            <()>::from_args(&args),
            Err(ResolveError::ArgumentCount {
                expected: 0,
                found: 2
            })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let args = args![1u64];
        match <(i32,)>::from_args(&args).unwrap_err() {
            ResolveError::ArgumentType {
                index,
                expected,
                found,
            } => {
                assert_eq!(index, 0);
                assert_eq!(expected, "i32");
                assert_eq!(found, "u64");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_str_arguments_arrive_as_string() {
        let args = ("linode",).into_args();
        match <(&'static str,)>::from_args(&args).unwrap_err() {
            ResolveError::ArgumentType {
                index,
                expected,
                found,
            } => {
                assert_eq!(index, 0);
                assert_eq!(expected, "&str");
                assert!(found.ends_with("String"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let (name,): (String,) = FromArgs::from_args(&args).unwrap();
        assert_eq!(name, "linode");
    }

    #[test]
    fn test_raw_args() {
        let args = args!["a", 2, true];
        let raw = Args::from_args(&args).unwrap();
        assert_eq!(raw.len(), 3);
        assert!(raw.get::<bool>(2).unwrap());
        assert!(raw.get::<bool>(3).is_err());
    }
}
