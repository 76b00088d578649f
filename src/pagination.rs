//! Aggregation of paginated API endpoints.
//!
//! List endpoints return one [`ResourcePage`] at a time. [`GetAll`] requests
//! the first page, learns the page count from it, then requests the
//! remaining pages (several at a time) and concatenates them in page order.

use std::future::Future;
use std::hash::{Hash, Hasher};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::key::KeySegment;

/// Largest page size the API accepts.
pub const API_MAX_PAGE_SIZE: u32 = 500;

/// Default number of page requests in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// One page of a list endpoint, as sent by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePage<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// One-based number of this page.
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
    /// Total number of items across all pages.
    pub results: u32,
}

/// Returns the page to request after `page`, or `None` on the last page.
pub fn next_page<T>(page: &ResourcePage<T>) -> Option<u32> {
    if page.page >= page.pages {
        None
    } else {
        Some(page.page + 1)
    }
}

/// Pagination query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Params {
    /// Page to request; the API defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Items per page; the API defaults to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl Params {
    /// Parameters for one page.
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            page_size: None,
        }
    }
}

impl From<Params> for KeySegment {
    fn from(params: Params) -> Self {
        KeySegment::new(params)
    }
}

/// A filter object, sent to the API as the `X-Filter` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(pub Map<String, Value>);

impl Filter {
    /// An empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field condition.
    pub fn with(mut self, field: impl Into<String>, condition: impl Into<Value>) -> Self {
        self.0.insert(field.into(), condition.into());
        self
    }

    /// Merge `other` into this filter; fields of `other` win.
    pub fn merge(mut self, other: &Filter) -> Self {
        for (field, condition) in &other.0 {
            self.0.insert(field.clone(), condition.clone());
        }
        self
    }

    /// The header value.
    pub fn to_header(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Map is ordered, so equal filters render to the same text.
        self.to_header().hash(state);
    }
}

impl From<Filter> for KeySegment {
    fn from(filter: Filter) -> Self {
        KeySegment::new(filter)
    }
}

/// Every item of a paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Items of all pages, in page order.
    pub data: Vec<T>,
    /// Total number of items reported by the API.
    pub results: u32,
}

/// Page aggregation settings.
///
/// # Example
///
/// ```ignore
/// let all = GetAll::builder()
///     .page_size(100)
///     .concurrency(2)
///     .build()
///     .fetch(|params, filter| api.get_linodes(params, filter), Params::default(), Filter::new())
///     .await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAll {
    page_size: u32,
    concurrency: usize,
}

impl Default for GetAll {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GetAll {
    /// Start configuring a `GetAll`.
    pub fn builder() -> GetAllBuilder {
        GetAllBuilder::new()
    }

    /// Page size used for every request.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Maximum number of page requests in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Request every page from `getter` and concatenate them.
    ///
    /// `params.page` selects the first page requested; `page_size` is always
    /// overridden by this configuration. The first failed request aborts the
    /// whole aggregation.
    pub async fn fetch<T, E, G, Fut>(
        &self,
        getter: G,
        params: Params,
        filter: Filter,
    ) -> Result<Paginated<T>, E>
    where
        G: Fn(Params, Filter) -> Fut,
        Fut: Future<Output = Result<ResourcePage<T>, E>>,
    {
        let pagination = Params {
            page_size: Some(self.page_size),
            ..params
        };

        let first = getter(pagination.clone(), filter.clone()).await?;
        tracing::debug!(
            page = first.page,
            pages = first.pages,
            results = first.results,
            "fetched first page"
        );

        let ResourcePage {
            data: mut all,
            page,
            pages,
            results,
        } = first;
        if page >= pages {
            return Ok(Paginated { data: all, results });
        }

        let requests = (page + 1..=pages).map(|next| {
            tracing::debug!(page = next, pages, "requesting page");
            getter(
                Params {
                    page: Some(next),
                    ..pagination.clone()
                },
                filter.clone(),
            )
        });

        let rest: Vec<Vec<T>> = stream::iter(requests)
            .buffered(self.concurrency)
            .map_ok(|page| page.data)
            .try_collect()
            .await?;

        for data in rest {
            all.extend(data);
        }
        Ok(Paginated { data: all, results })
    }

    /// Like [`fetch`](Self::fetch), for getters that take a leading argument
    /// such as the id of the parent entity.
    pub async fn fetch_with<A, T, E, G, Fut>(
        &self,
        arg: A,
        getter: G,
        params: Params,
        filter: Filter,
    ) -> Result<Paginated<T>, E>
    where
        A: Clone,
        G: Fn(A, Params, Filter) -> Fut,
        Fut: Future<Output = Result<ResourcePage<T>, E>>,
    {
        self.fetch(|p, f| getter(arg.clone(), p, f), params, filter)
            .await
    }
}

/// Builder for [`GetAll`].
#[derive(Debug, Clone)]
pub struct GetAllBuilder {
    page_size: u32,
    concurrency: usize,
}

impl Default for GetAllBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GetAllBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            page_size: API_MAX_PAGE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the page size, clamped to `1..=API_MAX_PAGE_SIZE`.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, API_MAX_PAGE_SIZE);
        self
    }

    /// Set how many page requests may be in flight at once (at least 1).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Build the settings.
    pub fn build(self) -> GetAll {
        GetAll {
            page_size: self.page_size,
            concurrency: self.concurrency,
        }
    }
}

/// Request every page of `getter` with default settings.
pub async fn get_all<T, E, G, Fut>(getter: G) -> Result<Paginated<T>, E>
where
    G: Fn(Params, Filter) -> Fut,
    Fut: Future<Output = Result<ResourcePage<T>, E>>,
{
    GetAll::default()
        .fetch(getter, Params::default(), Filter::default())
        .await
}
