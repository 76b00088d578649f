//! Query leaves: the fetch function, its pass-through options and an
//! optional author-declared key.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::descriptor::FactoryDef;
use crate::key::QueryKey;
use crate::QueryError;

/// Type-erased query output, shared the way a cache would share it.
pub type QueryData = Arc<dyn Any + Send + Sync>;

/// A zero-argument, asynchronous fetch function.
///
/// The resolver never calls it. It is carried through resolution unchanged
/// so that the data-fetching layer can pair it with the derived key.
///
/// This is cheap to clone - the function is behind `Arc`.
#[derive(Clone)]
pub struct QueryFn {
    func: Arc<dyn Fn() -> BoxFuture<'static, Result<QueryData, QueryError>> + Send + Sync>,
}

impl QueryFn {
    /// Wrap an async function producing any `Send + Sync` value.
    ///
    /// ```ignore
    /// let query_fn = QueryFn::new(|| async { Ok(vec!["us-east", "eu-west"]) });
    /// ```
    pub fn new<F, Fut, T>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
        T: Send + Sync + 'static,
    {
        Self {
            func: Arc::new(move || {
                f().map(|result| result.map(|value| Arc::new(value) as QueryData))
                    .boxed()
            }),
        }
    }

    /// Invoke the original function.
    pub fn call(&self) -> BoxFuture<'static, Result<QueryData, QueryError>> {
        (self.func)()
    }

    /// Invoke the original function and downcast its output.
    pub async fn fetch<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, QueryError> {
        let data = self.call().await?;
        data.downcast::<T>().map_err(|_| QueryError::TypeMismatch {
            expected: type_name::<T>(),
        })
    }

    /// Returns `true` if both handles wrap the same function.
    pub fn ptr_eq(&self, other: &QueryFn) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for QueryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryFn(..)")
    }
}

/// Callback run by the data-fetching layer after a successful fetch.
pub type OnSuccess = Arc<dyn Fn(&QueryData) + Send + Sync>;

/// Options carried on a leaf for the data-fetching layer.
///
/// Resolution passes these through untouched, whatever the nesting depth and
/// whether or not the leaf was produced by a factory.
#[derive(Clone)]
pub struct QueryOptions {
    /// Whether the query may run automatically.
    pub enabled: bool,
    /// How long fetched data stays fresh.
    pub stale_time: Option<Duration>,
    /// How long unused data stays cached.
    pub gc_time: Option<Duration>,
    /// Poll interval, if the query should refetch periodically.
    pub refetch_interval: Option<Duration>,
    /// Keep showing the previous key's data while the new key loads.
    pub keep_previous_data: bool,
    /// Refetch when the window regains focus.
    pub refetch_on_window_focus: bool,
    /// Called with the fetched data.
    pub on_success: Option<OnSuccess>,
    /// Free-form metadata.
    pub meta: BTreeMap<String, String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
            gc_time: None,
            refetch_interval: None,
            keep_previous_data: false,
            refetch_on_window_focus: true,
            on_success: None,
            meta: BTreeMap::new(),
        }
    }
}

impl QueryOptions {
    /// Data that rarely changes: never stale, no focus refetch.
    pub fn long_lived() -> Self {
        Self {
            stale_time: Some(Duration::MAX),
            refetch_on_window_focus: false,
            ..Self::default()
        }
    }

    /// Data fetched once per session.
    pub fn one_time_fetch() -> Self {
        Self {
            stale_time: Some(Duration::MAX),
            gc_time: Some(Duration::MAX),
            refetch_on_window_focus: false,
            ..Self::default()
        }
    }

    /// Set `enabled`.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set `stale_time`.
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Set `keep_previous_data`.
    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = keep;
        self
    }

    /// Set the success callback.
    pub fn on_success(mut self, f: impl Fn(&QueryData) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Add a metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("enabled", &self.enabled)
            .field("stale_time", &self.stale_time)
            .field("gc_time", &self.gc_time)
            .field("refetch_interval", &self.refetch_interval)
            .field("keep_previous_data", &self.keep_previous_data)
            .field("refetch_on_window_focus", &self.refetch_on_window_focus)
            .field("on_success", &self.on_success.is_some())
            .field("meta", &self.meta)
            .finish()
    }
}

/// A fetchable, cacheable query.
///
/// # Example
///
/// ```ignore
/// let leaf = Leaf::new(move || async move { api.get_linode(id).await })
///     .with_key(query_key![id])
///     .with_options(QueryOptions::default().enabled(id > 0));
/// ```
#[derive(Clone, Debug)]
pub struct Leaf {
    pub(crate) query_fn: QueryFn,
    pub(crate) query_key: Option<QueryKey>,
    pub(crate) options: QueryOptions,
    pub(crate) context: Option<FactoryDef>,
}

impl Leaf {
    /// Create a leaf from an async fetch function.
    pub fn new<F, Fut, T>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
        T: Send + Sync + 'static,
    {
        Self::from_query_fn(QueryFn::new(f))
    }

    /// Create a leaf from an existing [`QueryFn`].
    pub fn from_query_fn(query_fn: QueryFn) -> Self {
        Self {
            query_fn,
            query_key: None,
            options: QueryOptions::default(),
            context: None,
        }
    }

    /// Declare the key suffix this leaf is cached under.
    ///
    /// Only honoured for leaves returned by a factory, where it replaces the
    /// call arguments as the trailing part of the key.
    pub fn with_key(mut self, key: QueryKey) -> Self {
        self.query_key = Some(key);
        self
    }

    /// Replace the pass-through options.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach queries that live under this leaf's key.
    pub fn with_context(mut self, context: FactoryDef) -> Self {
        self.context = Some(context);
        self
    }

    /// The fetch function.
    pub fn query_fn(&self) -> &QueryFn {
        &self.query_fn
    }

    /// The author-declared key suffix, if any.
    pub fn declared_key(&self) -> Option<&QueryKey> {
        self.query_key.as_ref()
    }

    /// The pass-through options.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// The context queries, if any.
    pub fn context(&self) -> Option<&FactoryDef> {
        self.context.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_downcasts() {
        let query_fn = QueryFn::new(|| async { Ok::<_, QueryError>(42u32) });
        assert_eq!(*query_fn.fetch::<u32>().await.unwrap(), 42);

        match query_fn.fetch::<String>().await {
            Err(QueryError::TypeMismatch { expected }) => {
                assert_eq!(expected, type_name::<String>())
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_is_repeatable() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let query_fn = QueryFn::new(move || {
            let counter = counter.clone();
            async move { Ok::<_, QueryError>(counter.fetch_add(1, Ordering::SeqCst)) }
        });

        assert_eq!(*query_fn.fetch::<usize>().await.unwrap(), 0);
        assert_eq!(*query_fn.fetch::<usize>().await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_presets() {
        let options = QueryOptions::long_lived().enabled(false);
        assert!(!options.enabled);
        assert_eq!(options.stale_time, Some(Duration::MAX));
        assert!(!options.refetch_on_window_focus);

        let options = QueryOptions::default();
        assert!(options.enabled);
        assert!(options.on_success.is_none());
    }
}
