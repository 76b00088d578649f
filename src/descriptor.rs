//! The author-provided descriptor tree.
//!
//! A tree is built once, usually in a `static` or at startup, and then
//! resolved with [`resolve`](crate::resolve). Every node is one of three
//! explicit shapes, see [`Descriptor`].

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::args::{Args, FromArgs};
use crate::error::NodeKind;
use crate::query::Leaf;
use crate::ResolveError;

/// One node of a descriptor tree.
#[derive(Clone, Debug)]
pub enum Descriptor {
    /// A query with a fetch function.
    Leaf(Leaf),
    /// A function of runtime arguments producing a leaf or a branch.
    Factory(Factory),
    /// Named children.
    Branch(FactoryDef),
}

impl Descriptor {
    /// The shape of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Descriptor::Leaf(_) => NodeKind::Leaf,
            Descriptor::Factory(_) => NodeKind::Factory,
            Descriptor::Branch(_) => NodeKind::Branch,
        }
    }
}

impl From<Leaf> for Descriptor {
    fn from(leaf: Leaf) -> Self {
        Descriptor::Leaf(leaf)
    }
}

impl From<Factory> for Descriptor {
    fn from(factory: Factory) -> Self {
        Descriptor::Factory(factory)
    }
}

impl From<FactoryDef> for Descriptor {
    fn from(def: FactoryDef) -> Self {
        Descriptor::Branch(def)
    }
}

/// A mapping from names to child descriptors.
///
/// Entries are kept sorted by name; insertion order has no meaning.
/// Inserting a name twice replaces the earlier entry.
#[derive(Clone, Debug, Default)]
pub struct FactoryDef {
    entries: BTreeMap<String, Descriptor>,
}

impl FactoryDef {
    /// Create an empty branch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any descriptor under `name`.
    pub fn entry(mut self, name: impl Into<String>, descriptor: impl Into<Descriptor>) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Add a leaf under `name`.
    pub fn leaf(self, name: impl Into<String>, leaf: Leaf) -> Self {
        self.entry(name, leaf)
    }

    /// Add a factory under `name`.
    pub fn factory(self, name: impl Into<String>, factory: Factory) -> Self {
        self.entry(name, factory)
    }

    /// Add a nested branch under `name`.
    pub fn branch(self, name: impl Into<String>, def: FactoryDef) -> Self {
        self.entry(name, def)
    }

    /// Add any descriptor under `name`, returning the replaced one.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        descriptor: impl Into<Descriptor>,
    ) -> Option<Descriptor> {
        self.entries.insert(name.into(), descriptor.into())
    }

    /// Get the child named `name`.
    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.entries.get(name)
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the children, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Descriptor)> {
        self.entries.iter().map(|(name, d)| (name.as_str(), d))
    }
}

/// What a factory produces when called.
#[derive(Clone, Debug)]
pub enum FactoryOutput {
    /// A query.
    Leaf(Leaf),
    /// More named children, resolved under the call's key.
    Branch(FactoryDef),
}

impl From<Leaf> for FactoryOutput {
    fn from(leaf: Leaf) -> Self {
        FactoryOutput::Leaf(leaf)
    }
}

impl From<FactoryDef> for FactoryOutput {
    fn from(def: FactoryDef) -> Self {
        FactoryOutput::Branch(def)
    }
}

type FactoryFn = dyn Fn(&Args) -> Result<FactoryOutput, ResolveError> + Send + Sync;

/// A parametric factory.
///
/// The closure declares its argument types as a tuple; calls with values of
/// other types or another count fail with a [`ResolveError`].
///
/// ```ignore
/// let linode = Factory::new(|(id,): (u64,)| {
///     Leaf::new(move || async move { get_linode(id).await }).with_key(query_key![id])
/// });
/// ```
#[derive(Clone)]
pub struct Factory {
    func: Arc<FactoryFn>,
    arity: Option<usize>,
    signature: &'static str,
}

impl Factory {
    /// Create a factory from an infallible closure.
    ///
    /// Declare string parameters as `String`, not `&str`; see [`FromArgs`].
    pub fn new<A, O, F>(f: F) -> Self
    where
        A: FromArgs,
        O: Into<FactoryOutput>,
        F: Fn(A) -> O + Send + Sync + 'static,
    {
        Self::try_new(move |args: A| Ok(f(args)))
    }

    /// Create a factory from a closure that may reject its arguments.
    pub fn try_new<A, O, F>(f: F) -> Self
    where
        A: FromArgs,
        O: Into<FactoryOutput>,
        F: Fn(A) -> Result<O, ResolveError> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(move |args: &Args| {
                let typed = A::from_args(args)?;
                f(typed).map(Into::into)
            }),
            arity: A::ARITY,
            signature: type_name::<A>(),
        }
    }

    /// Number of arguments the closure takes, `None` if it accepts any.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Run the closure with `args`.
    pub fn invoke(&self, args: &Args) -> Result<FactoryOutput, ResolveError> {
        (self.func)(args)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("signature", &self.signature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{args, QueryError};

    fn leaf() -> Leaf {
        Leaf::new(|| async { Ok::<_, QueryError>(()) })
    }

    #[test]
    fn test_entries_sorted_and_replaced() {
        let def = FactoryDef::new()
            .leaf("zones", leaf())
            .branch("account", FactoryDef::new())
            .leaf("zones", leaf());

        let names: Vec<_> = def.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["account", "zones"]);
        assert_eq!(def.get("account").map(Descriptor::kind), Some(NodeKind::Branch));
    }

    #[test]
    fn test_factory_invoke() {
        let factory = Factory::new(|(id,): (i32,)| {
            FactoryDef::new().leaf(format!("linode-{id}"), leaf())
        });
        assert_eq!(factory.arity(), Some(1));

        match factory.invoke(&args![7]).unwrap() {
            FactoryOutput::Branch(def) => assert!(def.get("linode-7").is_some()),
            FactoryOutput::Leaf(_) => panic!("expected a branch"),
        }
        assert!(factory.invoke(&args!["7"]).is_err());
    }

    #[test]
    fn test_try_new_rejects() {
        let factory = Factory::try_new(|(page,): (u32,)| {
            if page == 0 {
                Err(ResolveError::Rejected {
                    message: "pages start at 1".into(),
                })
            } else {
                Ok(leaf())
            }
        });

        assert!(matches!(
            factory.invoke(&args![0u32]),
            Err(ResolveError::Rejected { .. })
        ));
        assert!(factory.invoke(&args![1u32]).is_ok());
    }
}
