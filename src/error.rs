//! Error types for key resolution and query execution.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::key::QueryKey;

/// The shape of a descriptor or resolved node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A node with a query function.
    Leaf,
    /// A parametric factory, not yet called.
    Factory,
    /// A named group of child nodes.
    Branch,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Leaf => f.write_str("leaf"),
            NodeKind::Factory => f.write_str("factory"),
            NodeKind::Branch => f.write_str("branch"),
        }
    }
}

/// Authoring errors: the descriptor tree was navigated or called in a way
/// its shape does not allow.
///
/// These are programming errors. They are reported instead of panicking so
/// callers can decide, but there is nothing to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No entry with this name exists under the branch.
    #[error("no entry named `{name}` under {parent:?}")]
    MissingEntry {
        /// Key of the branch that was searched.
        parent: QueryKey,
        /// The requested entry name.
        name: String,
    },

    /// The node exists but has a different shape.
    #[error("{key:?} is a {found}, expected a {expected}")]
    KindMismatch {
        /// Key of the offending node.
        key: QueryKey,
        /// The shape the caller asked for.
        expected: NodeKind,
        /// The shape the node actually has.
        found: NodeKind,
    },

    /// A factory was called with the wrong number of arguments.
    #[error("factory expects {expected} argument(s), got {found}")]
    ArgumentCount {
        /// Arity of the factory closure.
        expected: usize,
        /// Number of arguments supplied.
        found: usize,
    },

    /// A factory argument has a different type than the closure declares.
    #[error("factory argument {index} is a `{found}`, expected `{expected}`")]
    ArgumentType {
        /// Zero-based argument position.
        index: usize,
        /// The type the closure declares.
        expected: &'static str,
        /// The type of the supplied value.
        found: &'static str,
    },

    /// Two trees resolved under different keys cannot be merged.
    #[error("cannot merge a tree rooted at {right:?} into one rooted at {left:?}")]
    RootMismatch {
        /// Key of the receiving tree.
        left: QueryKey,
        /// Key of the merged-in tree.
        right: QueryKey,
    },

    /// A lookup was given no names.
    #[error("empty lookup path under {parent:?}")]
    EmptyPath {
        /// Key of the branch the lookup started from.
        parent: QueryKey,
    },

    /// The factory closure rejected its arguments.
    #[error("factory rejected its arguments: {message}")]
    Rejected {
        /// Explanation supplied by the factory.
        message: String,
    },
}

/// Errors produced while running a query function.
///
/// User errors can be propagated using the `?` operator, which automatically
/// converts any `Into<anyhow::Error>` type into `QueryError::UserError`.
#[derive(Debug, Clone)]
pub enum QueryError {
    /// The query produced a value of a different type than requested.
    TypeMismatch {
        /// The requested type.
        expected: &'static str,
    },

    /// User-defined error raised by the query function.
    UserError(Arc<anyhow::Error>),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::TypeMismatch { expected } => {
                write!(f, "query data is not a `{}`", expected)
            }
            QueryError::UserError(e) => write!(f, "user error: {}", e),
        }
    }
}

impl<T: Into<anyhow::Error>> From<T> for QueryError {
    fn from(err: T) -> Self {
        QueryError::UserError(Arc::new(err.into()))
    }
}

impl QueryError {
    /// Returns a reference to the inner user error if this is a `UserError` variant.
    pub fn user_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            QueryError::UserError(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts to downcast the user error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.user_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if this is a `UserError` containing an error of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

/// A typed wrapper around a user error that provides `Deref` access to the inner error type.
///
/// The `Arc` keeps the error alive for as long as the wrapper exists.
#[derive(Clone)]
pub struct TypedErr<E> {
    arc: Arc<anyhow::Error>,
    _marker: PhantomData<E>,
}

impl<E: std::error::Error + Send + Sync + 'static> TypedErr<E> {
    fn new(arc: Arc<anyhow::Error>) -> Result<Self, Arc<anyhow::Error>> {
        if arc.downcast_ref::<E>().is_some() {
            Ok(Self {
                arc,
                _marker: PhantomData,
            })
        } else {
            Err(arc)
        }
    }

    /// Returns the shared inner error.
    pub fn inner(&self) -> &Arc<anyhow::Error> {
        &self.arc
    }
}

impl<E: std::error::Error + Send + Sync + 'static> Deref for TypedErr<E> {
    type Target = E;

    fn deref(&self) -> &E {
        match self.arc.downcast_ref::<E>() {
            Some(e) => e,
            // `new` only constructs wrappers whose error downcasts to `E`.
            None => unreachable!("TypedErr holds an error of another type"),
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> fmt::Debug for TypedErr<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<E: std::error::Error + Send + Sync + 'static> fmt::Display for TypedErr<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

/// Extension trait for query results that provides ergonomic error downcasting.
///
/// ```ignore
/// use query_keys::QueryResultExt;
///
/// match leaf.fetch::<Linode>().await.downcast_err::<ApiError>()? {
///     Ok(linode) => println!("{}", linode.label),
///     Err(api) => println!("API said: {}", api.reason),
/// }
/// ```
pub trait QueryResultExt<T> {
    /// Attempts to downcast a `UserError` to a specific error type.
    ///
    /// - `Ok(Ok(value))` - The query succeeded with `value`
    /// - `Ok(Err(typed_err))` - The query failed with a `UserError` of type `E`
    /// - `Err(query_error)` - Any other failure
    fn downcast_err<E: std::error::Error + Send + Sync + 'static>(
        self,
    ) -> Result<Result<T, TypedErr<E>>, QueryError>;
}

impl<T> QueryResultExt<T> for Result<T, QueryError> {
    fn downcast_err<E: std::error::Error + Send + Sync + 'static>(
        self,
    ) -> Result<Result<T, TypedErr<E>>, QueryError> {
        match self {
            Ok(value) => Ok(Ok(value)),
            Err(QueryError::UserError(arc)) => match TypedErr::new(arc) {
                Ok(typed) => Ok(Err(typed)),
                Err(arc) => Err(QueryError::UserError(arc)),
            },
            Err(other) => Err(other),
        }
    }
}
