//! Key types for query caching.

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dyn_hash::DynHash;

/// Object-safe equality comparison.
///
/// This trait enables comparing two trait objects for equality
/// by downcasting and comparing the concrete types.
pub trait DynEq: Any {
    /// Compare self with another value for equality.
    ///
    /// Returns `true` if `other` is the same concrete type and equal to `self`.
    fn dyn_eq(&self, other: &dyn Any) -> bool;
}

impl<T: Eq + 'static> DynEq for T {
    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|o| self == o)
    }
}

/// Trait for types that can appear inside a query key.
///
/// This trait combines object-safe hashing, equality, and debug formatting.
/// It is automatically implemented for all types that implement
/// `Hash + Eq + Debug + Send + Sync + 'static`.
pub trait CacheKey: DynHash + DynEq + Debug + Send + Sync {
    /// Get the key as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Get the type name for this key.
    fn type_name(&self) -> &'static str;
}

impl<T: Hash + Eq + Debug + Send + Sync + 'static> CacheKey for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

// Enable Hash for dyn CacheKey using the dyn-hash crate
dyn_hash::hash_trait_object!(CacheKey);

/// Convenience trait for types that can be used as factory arguments.
///
/// This trait combines all the bounds needed for a value to be carried in a
/// [`QueryKey`] and handed back to a factory closure:
/// `Hash + Eq + Clone + Debug + Send + Sync + 'static`.
pub trait Cachable: std::hash::Hash + Eq + Clone + std::fmt::Debug + Send + Sync + 'static {}
impl<T: std::hash::Hash + Eq + Clone + std::fmt::Debug + Send + Sync + 'static> Cachable for T {}

/// One element of a [`QueryKey`].
///
/// Stores the value type and the value itself as a type-erased `Arc<dyn CacheKey>`.
/// Path names and `&str` arguments are both stored as `String`, so the path
/// segment `"volumes"` and a string argument `"volumes"` compare equal. Values of
/// different types never do: `1i32` and `1i64` are distinct segments.
#[derive(Clone)]
pub struct KeySegment {
    value_type: TypeId,
    value: Arc<dyn CacheKey>,
}

impl KeySegment {
    /// Create a segment from any cachable value.
    pub fn new<T: CacheKey + 'static>(value: T) -> Self {
        Self {
            value_type: TypeId::of::<T>(),
            value: Arc::new(value),
        }
    }

    /// Get the debug representation of this segment.
    pub fn debug_repr(&self) -> String {
        format!("{:?}", self.value)
    }

    /// Downcast the segment to its original type.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref()
    }

    /// Get the segment as a string slice, if it holds a string.
    pub fn as_str(&self) -> Option<&str> {
        self.downcast::<String>().map(String::as_str)
    }

    /// Get the value type ID.
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    /// Get the type name of the stored value.
    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }
}

impl Debug for KeySegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

impl Hash for KeySegment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value_type.hash(state);
        self.value.hash(state);
    }
}

impl PartialEq for KeySegment {
    fn eq(&self, other: &Self) -> bool {
        self.value_type == other.value_type && self.value.dyn_eq(other.value.as_any())
    }
}

impl Eq for KeySegment {}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::new(value.to_owned())
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        KeySegment::new(value.clone())
    }
}

macro_rules! impl_segment_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for KeySegment {
                fn from(value: $ty) -> Self {
                    KeySegment::new(value)
                }
            }
        )*
    };
}

impl_segment_from!(
    String, bool, char, (), i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize,
);

/// An ordered sequence of segments identifying one query or one group of queries.
///
/// Keys are plain values: every derivation (`child`, `join`, ...) returns a
/// fresh key and never touches the receiver.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryKey {
    segments: Vec<KeySegment>,
}

impl QueryKey {
    /// Create a key from its segments.
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self { segments }
    }

    /// The empty key, the key of a tree root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` for the root key.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments of this key, in order.
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// Get the segment at `index`.
    pub fn get(&self, index: usize) -> Option<&KeySegment> {
        self.segments.get(index)
    }

    /// Return a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment.into());
        Self { segments }
    }

    /// Return a new key with all of `segments` appended.
    pub fn extend<I>(&self, segments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeySegment>,
    {
        let mut out = self.clone();
        out.segments.extend(segments.into_iter().map(Into::into));
        out
    }

    /// Return a new key made of this key followed by `suffix`.
    pub fn join(&self, suffix: &QueryKey) -> Self {
        self.extend(suffix.segments.iter().cloned())
    }

    /// Returns `true` if `self` is a (possibly equal) prefix of `other`.
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Returns `true` if `self` is a prefix of `other` and shorter than it.
    pub fn is_strict_prefix_of(&self, other: &QueryKey) -> bool {
        self.len() < other.len() && self.is_prefix_of(other)
    }

    /// Returns `true` if `prefix` is a prefix of this key.
    ///
    /// This is the match an external cache performs when invalidating every
    /// query below a branch key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.is_prefix_of(self)
    }

    /// Get the debug representation of this key.
    pub fn debug_repr(&self) -> String {
        format!("{:?}", self)
    }
}

impl Debug for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.segments.iter()).finish()
    }
}

impl From<Vec<KeySegment>> for QueryKey {
    fn from(segments: Vec<KeySegment>) -> Self {
        Self::new(segments)
    }
}

impl FromIterator<KeySegment> for QueryKey {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a QueryKey {
    type Item = &'a KeySegment;
    type IntoIter = std::slice::Iter<'a, KeySegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Build a [`QueryKey`] from values convertible into [`KeySegment`].
///
/// ```ignore
/// let key = query_key!["linodes", "linode", 1, "details"];
/// ```
#[macro_export]
macro_rules! query_key {
    () => {
        $crate::QueryKey::root()
    };
    ($($segment:expr),+ $(,)?) => {
        $crate::QueryKey::new(vec![$($crate::KeySegment::from($segment)),+])
    };
}
