//! Analysis contexts: interned, ordered sequences of context elements.

use std::collections::BTreeMap as Map;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::middle_end::lang::{ClassId, Site};

use super::heap::Obj;

/// One element of a context: a call site (call-string sensitivity), a
/// receiver object (object sensitivity), or the type of a receiver's
/// allocation site (type sensitivity).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContextElem {
    Site(Site),
    Obj(Obj),
    Type(ClassId),
}

impl Display for ContextElem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ContextElem::Site(s) => write!(f, "{s}"),
            ContextElem::Obj(o) => write!(f, "{o}"),
            ContextElem::Type(t) => write!(f, "{t}"),
        }
    }
}

/// An ordered sequence of context elements, length bounded by the selector's
/// k.  The empty context is the unique bottom.  Contexts are hash-consed by
/// the manager, so equal contexts share one allocation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Context(Rc<Vec<ContextElem>>);

impl Context {
    /// The empty context, usable without a manager (context-insensitive
    /// views).  Structurally equal to the manager's empty context.
    pub fn root() -> Context {
        Context(Rc::new(vec![]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn elem(&self, i: usize) -> &ContextElem {
        &self.0[i]
    }

    pub fn elems(&self) -> &[ContextElem] {
        &self.0
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, "]")
    }
}

/// Hash-consing manager for contexts.
#[derive(Clone, Debug)]
pub struct ContextManager {
    interned: Map<Vec<ContextElem>, Context>,
    empty: Context,
}

impl Default for ContextManager {
    fn default() -> Self {
        ContextManager::new()
    }
}

impl ContextManager {
    pub fn new() -> ContextManager {
        let empty = Context(Rc::new(vec![]));
        let mut interned = Map::new();
        interned.insert(vec![], empty.clone());
        ContextManager { interned, empty }
    }

    pub fn empty(&self) -> Context {
        self.empty.clone()
    }

    pub fn make(&mut self, elems: Vec<ContextElem>) -> Context {
        self.interned
            .entry(elems.clone())
            .or_insert_with(|| Context(Rc::new(elems)))
            .clone()
    }

    /// The last `k - 1` elements of `base` followed by `elem`: the k-limited
    /// context extension every selector family uses.
    pub fn append_limited(&mut self, base: &Context, elem: ContextElem, k: usize) -> Context {
        if k == 0 {
            return self.empty();
        }
        let keep = k - 1;
        let elems = base.elems();
        let start = elems.len().saturating_sub(keep);
        let mut new = elems[start..].to_vec();
        new.push(elem);
        self.make(new)
    }

    /// The last `k` elements of `base`, unchanged when already short enough.
    pub fn truncate(&mut self, base: &Context, k: usize) -> Context {
        let elems = base.elems();
        if elems.len() <= k {
            return base.clone();
        }
        let new = elems[elems.len() - k..].to_vec();
        self.make(new)
    }
}
