//! Query-Keys: hierarchical cache keys for a data-fetching layer.
//!
//! Describe the queries of an API once, as a tree of named [`Leaf`]s,
//! parametric [`Factory`]s and nested [`FactoryDef`] branches. [`resolve`]
//! mirrors that tree and gives every node a [`QueryKey`] derived from its
//! path and the arguments of any factory calls along it.
//!
//! # Key Features
//!
//! - **Prefix keys**: a branch key is a strict prefix of every key below it,
//!   so a prefix-matching cache can invalidate whole groups of queries
//! - **Value keys**: the same path and arguments always produce equal keys
//! - **Explicit shapes**: leaves, factories and branches are enum variants,
//!   not runtime shape probes
//! - **Page aggregation**: [`GetAll`] collects every page of a list endpoint
//!
//! # Example
//!
//! ```ignore
//! use query_keys::{query_key, scope, Factory, FactoryDef, Leaf};
//!
//! let linodes = scope("linodes", &FactoryDef::new().factory(
//!     "linode",
//!     Factory::new(|(id,): (u64,)| {
//!         Leaf::new(move || async move { api::get_linode(id).await })
//!     }),
//! ));
//!
//! let leaf = linodes.branch("linodes")?.factory("linode")?.call_leaf((1u64,))?;
//! assert_eq!(leaf.query_key(), &query_key!["linodes", "linode", 1u64]);
//! let linode = leaf.fetch::<Linode>().await?;
//! ```

mod args;
mod descriptor;
mod error;
mod key;
pub mod pagination;
mod query;
mod resolve;
pub mod sort;

pub use args::{Args, FromArgs, IntoArgs};
pub use descriptor::{Descriptor, Factory, FactoryDef, FactoryOutput};
pub use error::{NodeKind, QueryError, QueryResultExt, ResolveError, TypedErr};
pub use key::{Cachable, CacheKey, DynEq, KeySegment, QueryKey};
pub use pagination::{
    get_all, next_page, Filter, GetAll, GetAllBuilder, Paginated, Params, ResourcePage,
};
pub use query::{Leaf, OnSuccess, QueryData, QueryFn, QueryOptions};
pub use resolve::{
    lookup, resolve, resolve_at, scope, Resolved, ResolvedBranch, ResolvedFactory, ResolvedLeaf,
};
pub use sort::SortOrder;
