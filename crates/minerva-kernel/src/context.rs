//! Typing context
//!
//! The context assigns types (and optionally bodies, for let-bound
//! entries) to the free variables of an expression. It is an immutable
//! cons list: extending shares the tail, and a lookup can hand back the
//! prefix strictly below an entry so the entry's body can be normalized
//! in its own scope.

use crate::expr::Expr;
use crate::name::Name;
use std::sync::Arc;

/// A single context entry.
#[derive(Clone, Debug)]
pub struct ContextEntry {
    /// Display name.
    pub name: Name,
    /// Type of the variable.
    pub ty: Expr,
    /// Body, for let-bound entries.
    pub body: Option<Expr>,
}

impl ContextEntry {
    /// An ordinary (bodyless) entry.
    pub fn var(name: Name, ty: Expr) -> Self {
        ContextEntry {
            name,
            ty,
            body: None,
        }
    }

    /// A let-bound entry.
    pub fn let_bound(name: Name, ty: Expr, body: Expr) -> Self {
        ContextEntry {
            name,
            ty,
            body: Some(body),
        }
    }
}

#[derive(Debug)]
struct ContextNode {
    entry: ContextEntry,
    prev: Context,
    len: usize,
}

/// An immutable typing context. The innermost entry is at the head;
/// de Bruijn index `j` past the local binders selects the `j`-th entry
/// counting inward-out.
#[derive(Clone, Debug, Default)]
pub struct Context(Option<Arc<ContextNode>>);

impl Context {
    /// The empty context.
    pub fn empty() -> Self {
        Context(None)
    }

    /// Extend with a new innermost entry; the tail is shared.
    pub fn extend(&self, entry: ContextEntry) -> Context {
        let len = self.size() + 1;
        Context(Some(Arc::new(ContextNode {
            entry,
            prev: self.clone(),
            len,
        })))
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Pointer equality: true exactly when both contexts are the same
    /// list in memory. Used to detect context changes cheaply.
    pub fn is_eqp(a: &Context, b: &Context) -> bool {
        match (&a.0, &b.0) {
            (None, None) => true,
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Look up the entry for de Bruijn offset `j` (0 = innermost).
    pub fn lookup(&self, j: usize) -> Option<&ContextEntry> {
        self.node_at(j).map(|node| &node.entry)
    }

    /// Look up the entry for offset `j` together with the context
    /// prefix strictly below it, so the entry's body can be interpreted
    /// in its own scope.
    pub fn lookup_ext(&self, j: usize) -> Option<(&ContextEntry, Context)> {
        self.node_at(j).map(|node| (&node.entry, node.prev.clone()))
    }

    fn node_at(&self, j: usize) -> Option<&ContextNode> {
        let mut cur = self.0.as_deref()?;
        for _ in 0..j {
            cur = cur.prev.0.as_deref()?;
        }
        Some(cur)
    }

    /// Iterate from the innermost entry outward.
    pub fn iter(&self) -> impl Iterator<Item = &ContextEntry> {
        let mut cur = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = cur?;
            cur = node.prev.0.as_deref();
            Some(&node.entry)
        })
    }
}
