//! Key derivation: turning a descriptor tree into a resolved tree.
//!
//! Every node of a resolved tree carries the key of its position:
//!
//! - a branch reached by name has `prefix + [name]`,
//! - a static leaf has `prefix + [name]`,
//! - an uncalled factory has `prefix + [name]`,
//! - a factory call has `prefix + [name] + args`; a leaf returned by the call
//!   uses its declared key instead of `args` when it has one.
//!
//! Factories are resolved on each call, so every call builds a fresh subtree.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::args::IntoArgs;
use crate::descriptor::{Descriptor, Factory, FactoryDef, FactoryOutput};
use crate::error::{NodeKind, QueryResultExt, TypedErr};
use crate::key::QueryKey;
use crate::query::{Leaf, QueryData, QueryFn, QueryOptions};
use crate::{QueryError, ResolveError};

/// Resolve a descriptor tree from the root (empty key).
pub fn resolve(def: &FactoryDef) -> ResolvedBranch {
    resolve_at(def, QueryKey::root())
}

/// Resolve a descriptor tree under `prefix`.
pub fn resolve_at(def: &FactoryDef, prefix: QueryKey) -> ResolvedBranch {
    let entries = def
        .iter()
        .map(|(name, descriptor)| {
            let key = prefix.child(name);
            tracing::trace!(key = ?key, kind = %descriptor.kind(), "resolved entry");
            (name.to_owned(), resolve_entry(descriptor, key))
        })
        .collect();

    ResolvedBranch {
        query_key: prefix,
        entries,
    }
}

/// Resolve a descriptor tree as the single entry `name` of a root branch.
///
/// Equivalent to `resolve(&FactoryDef::new().branch(name, def.clone()))`.
/// Scoped trees with different names merge into one root without
/// collisions:
///
/// ```ignore
/// let queries = scope("account", &account).merge(scope("linodes", &linodes))?;
/// let info = queries.branch("account")?.leaf("info")?;
/// ```
pub fn scope(name: &str, def: &FactoryDef) -> ResolvedBranch {
    let root = QueryKey::root();
    let key = root.child(name);
    tracing::trace!(key = ?key, "resolved scope");

    let mut entries = BTreeMap::new();
    entries.insert(name.to_owned(), Resolved::Branch(resolve_at(def, key)));
    ResolvedBranch {
        query_key: root,
        entries,
    }
}

fn resolve_entry(descriptor: &Descriptor, key: QueryKey) -> Resolved {
    match descriptor {
        Descriptor::Leaf(leaf) => {
            if let Some(declared) = leaf.declared_key() {
                tracing::warn!(
                    key = ?key,
                    declared = ?declared,
                    "declared key on a static leaf is ignored"
                );
            }
            Resolved::Leaf(ResolvedLeaf::new(leaf, key))
        }
        Descriptor::Factory(factory) => Resolved::Factory(ResolvedFactory {
            query_key: key,
            factory: factory.clone(),
        }),
        Descriptor::Branch(def) => Resolved::Branch(resolve_at(def, key)),
    }
}

/// A resolved node.
#[derive(Clone, Debug)]
pub enum Resolved {
    /// A query paired with its key.
    Leaf(ResolvedLeaf),
    /// A factory waiting for its arguments.
    Factory(ResolvedFactory),
    /// Named children.
    Branch(ResolvedBranch),
}

impl Resolved {
    /// The key of this node.
    pub fn query_key(&self) -> &QueryKey {
        match self {
            Resolved::Leaf(leaf) => &leaf.query_key,
            Resolved::Factory(factory) => &factory.query_key,
            Resolved::Branch(branch) => &branch.query_key,
        }
    }

    /// The shape of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Resolved::Leaf(_) => NodeKind::Leaf,
            Resolved::Factory(_) => NodeKind::Factory,
            Resolved::Branch(_) => NodeKind::Branch,
        }
    }

    fn mismatch(&self, expected: NodeKind) -> ResolveError {
        ResolveError::KindMismatch {
            key: self.query_key().clone(),
            expected,
            found: self.kind(),
        }
    }

    /// Borrow as a leaf.
    pub fn as_leaf(&self) -> Result<&ResolvedLeaf, ResolveError> {
        match self {
            Resolved::Leaf(leaf) => Ok(leaf),
            other => Err(other.mismatch(NodeKind::Leaf)),
        }
    }

    /// Borrow as a branch.
    pub fn as_branch(&self) -> Result<&ResolvedBranch, ResolveError> {
        match self {
            Resolved::Branch(branch) => Ok(branch),
            other => Err(other.mismatch(NodeKind::Branch)),
        }
    }

    /// Borrow as a factory.
    pub fn as_factory(&self) -> Result<&ResolvedFactory, ResolveError> {
        match self {
            Resolved::Factory(factory) => Ok(factory),
            other => Err(other.mismatch(NodeKind::Factory)),
        }
    }

    /// Convert into a leaf.
    pub fn into_leaf(self) -> Result<ResolvedLeaf, ResolveError> {
        match self {
            Resolved::Leaf(leaf) => Ok(leaf),
            other => Err(other.mismatch(NodeKind::Leaf)),
        }
    }

    /// Convert into a branch.
    pub fn into_branch(self) -> Result<ResolvedBranch, ResolveError> {
        match self {
            Resolved::Branch(branch) => Ok(branch),
            other => Err(other.mismatch(NodeKind::Branch)),
        }
    }

    /// Convert into a factory.
    pub fn into_factory(self) -> Result<ResolvedFactory, ResolveError> {
        match self {
            Resolved::Factory(factory) => Ok(factory),
            other => Err(other.mismatch(NodeKind::Factory)),
        }
    }
}

/// A query function paired with the key it is cached under.
#[derive(Clone, Debug)]
pub struct ResolvedLeaf {
    query_key: QueryKey,
    query_fn: QueryFn,
    options: QueryOptions,
    context: Option<ResolvedBranch>,
}

impl ResolvedLeaf {
    fn new(leaf: &Leaf, query_key: QueryKey) -> Self {
        let context = leaf
            .context()
            .map(|def| resolve_at(def, query_key.clone()));
        Self {
            query_fn: leaf.query_fn().clone(),
            options: leaf.options().clone(),
            query_key,
            context,
        }
    }

    /// The cache key.
    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    /// The original fetch function.
    pub fn query_fn(&self) -> &QueryFn {
        &self.query_fn
    }

    /// The pass-through options.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Queries nested under this leaf's key, if it declared any.
    pub fn context(&self) -> Option<&ResolvedBranch> {
        self.context.as_ref()
    }

    /// Get a context query by name.
    pub fn ctx(&self, name: &str) -> Result<&Resolved, ResolveError> {
        match &self.context {
            Some(context) => context.get(name),
            None => Err(ResolveError::MissingEntry {
                parent: self.query_key.clone(),
                name: name.to_owned(),
            }),
        }
    }

    /// Run the fetch function.
    pub async fn fetch_data(&self) -> Result<QueryData, QueryError> {
        self.query_fn.call().await
    }

    /// Run the fetch function and downcast the output.
    pub async fn fetch<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, QueryError> {
        self.query_fn.fetch::<T>().await
    }

    /// Run the fetch function, splitting out user errors of type `E`.
    ///
    /// See [`QueryResultExt::downcast_err`] for the shape of the result.
    pub async fn try_fetch<T, E>(&self) -> Result<Result<Arc<T>, TypedErr<E>>, QueryError>
    where
        T: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.fetch::<T>().await.downcast_err::<E>()
    }
}

/// A factory paired with the key prefix of all its calls.
#[derive(Clone, Debug)]
pub struct ResolvedFactory {
    query_key: QueryKey,
    factory: Factory,
}

impl ResolvedFactory {
    /// The key shared by every call, without arguments.
    ///
    /// Invalidating this key in a prefix-matching cache invalidates every
    /// call of the factory.
    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    /// Call the factory and resolve what it returns.
    pub fn call(&self, args: impl IntoArgs) -> Result<Resolved, ResolveError> {
        let args = args.into_args();
        tracing::debug!(key = ?self.query_key, args = ?args, "calling factory");

        let output = self.factory.invoke(&args)?;
        let call_key = self.query_key.extend(args);

        Ok(match output {
            FactoryOutput::Leaf(leaf) => {
                let key = match leaf.declared_key() {
                    Some(declared) => self.query_key.join(declared),
                    None => call_key,
                };
                Resolved::Leaf(ResolvedLeaf::new(&leaf, key))
            }
            FactoryOutput::Branch(def) => Resolved::Branch(resolve_at(&def, call_key)),
        })
    }

    /// Call the factory, expecting a leaf.
    pub fn call_leaf(&self, args: impl IntoArgs) -> Result<ResolvedLeaf, ResolveError> {
        self.call(args)?.into_leaf()
    }

    /// Call the factory, expecting a branch.
    pub fn call_branch(&self, args: impl IntoArgs) -> Result<ResolvedBranch, ResolveError> {
        self.call(args)?.into_branch()
    }
}

/// Resolved named children under a common key.
#[derive(Clone, Debug, Default)]
pub struct ResolvedBranch {
    query_key: QueryKey,
    entries: BTreeMap<String, Resolved>,
}

impl ResolvedBranch {
    /// The key of this branch; a strict prefix of every descendant's key.
    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    /// Get a child by name.
    pub fn get(&self, name: &str) -> Result<&Resolved, ResolveError> {
        self.entries
            .get(name)
            .ok_or_else(|| ResolveError::MissingEntry {
                parent: self.query_key.clone(),
                name: name.to_owned(),
            })
    }

    /// Get a child leaf by name.
    pub fn leaf(&self, name: &str) -> Result<&ResolvedLeaf, ResolveError> {
        self.get(name)?.as_leaf()
    }

    /// Get a child branch by name.
    pub fn branch(&self, name: &str) -> Result<&ResolvedBranch, ResolveError> {
        self.get(name)?.as_branch()
    }

    /// Get a child factory by name.
    pub fn factory(&self, name: &str) -> Result<&ResolvedFactory, ResolveError> {
        self.get(name)?.as_factory()
    }

    /// Returns `true` if a child named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Child names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over the children, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), r))
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another resolved tree into this one.
    ///
    /// Both trees must be resolved under the same key. Entries are taken as
    /// they are, so each keeps the key it was resolved with. On a name
    /// collision the entry from `other` wins.
    pub fn merge(mut self, other: ResolvedBranch) -> Result<Self, ResolveError> {
        if self.query_key != other.query_key {
            return Err(ResolveError::RootMismatch {
                left: self.query_key,
                right: other.query_key,
            });
        }
        for (name, resolved) in other.entries {
            if self.entries.insert(name.clone(), resolved).is_some() {
                tracing::warn!(
                    key = ?self.query_key.child(&name),
                    "merged tree replaced an entry"
                );
            }
        }
        Ok(self)
    }

    /// Keys of every node reachable without calling a factory, depth first.
    ///
    /// Includes leaves, nested branches, context queries and uncalled
    /// factories, but not this branch itself.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys(&self, out: &mut Vec<QueryKey>) {
        for resolved in self.entries.values() {
            out.push(resolved.query_key().clone());
            match resolved {
                Resolved::Branch(branch) => branch.collect_keys(out),
                Resolved::Leaf(leaf) => {
                    if let Some(context) = &leaf.context {
                        context.collect_keys(out);
                    }
                }
                Resolved::Factory(_) => {}
            }
        }
    }
}

/// Walk a path of plain names from `branch`.
///
/// Each step must name a branch or a leaf with context queries; factories
/// cannot be crossed without arguments.
pub fn lookup<'a>(branch: &'a ResolvedBranch, path: &[&str]) -> Result<&'a Resolved, ResolveError> {
    let (last, init) = path.split_last().ok_or_else(|| ResolveError::EmptyPath {
        parent: branch.query_key.clone(),
    })?;

    let mut current = branch;
    for name in init {
        current = match current.get(name)? {
            Resolved::Branch(next) => next,
            Resolved::Leaf(leaf) => match &leaf.context {
                Some(context) => context,
                None => {
                    return Err(ResolveError::KindMismatch {
                        key: leaf.query_key.clone(),
                        expected: NodeKind::Branch,
                        found: NodeKind::Leaf,
                    })
                }
            },
            other => {
                return Err(ResolveError::KindMismatch {
                    key: other.query_key().clone(),
                    expected: NodeKind::Branch,
                    found: other.kind(),
                })
            }
        };
    }
    current.get(last)
}
