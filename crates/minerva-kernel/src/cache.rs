//! Scoped memoization cache
//!
//! A map from expression identity to a cached value, with nested scopes:
//! popping a scope restores exactly what the parent scope saw. The
//! normalizer opens a scope whenever the value stack changes shape (at
//! binder boundaries), because an entry is only valid while the
//! interpretation of the expression's free variables is unchanged.
//!
//! Entries are keyed by node address and retain the keying expression,
//! so an address cannot be recycled while its entry is alive.

use crate::expr::Expr;
use std::collections::HashMap;

/// Undo record for one insertion: the previous binding of the key, or
/// `None` when the key was absent.
type Undo<V> = (usize, Option<(Expr, V)>);

/// A scoped cache from expression identity to `V`.
#[derive(Debug, Default)]
pub struct ScopedCache<V> {
    map: HashMap<usize, (Expr, V)>,
    undo: Vec<Undo<V>>,
    /// Undo-stack watermark for each open scope.
    scopes: Vec<usize>,
}

impl<V: Clone> ScopedCache<V> {
    pub fn new() -> Self {
        ScopedCache {
            map: HashMap::new(),
            undo: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Look up the cached value for this exact node.
    pub fn find(&self, e: &Expr) -> Option<&V> {
        self.map.get(&e.ptr_id()).map(|(_, v)| v)
    }

    /// Insert a value for this node, shadowing any previous binding in
    /// the current scope.
    pub fn insert(&mut self, e: &Expr, v: V) {
        let key = e.ptr_id();
        let prev = self.map.insert(key, (e.clone(), v));
        if !self.scopes.is_empty() {
            self.undo.push((key, prev));
        }
    }

    /// Open a scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(self.undo.len());
    }

    /// Close the innermost scope, restoring the parent's visible
    /// contents exactly.
    pub fn pop_scope(&mut self) {
        let Some(mark) = self.scopes.pop() else {
            return;
        };
        while self.undo.len() > mark {
            let Some((key, prev)) = self.undo.pop() else {
                break;
            };
            match prev {
                Some(binding) => {
                    self.map.insert(key, binding);
                }
                None => {
                    self.map.remove(&key);
                }
            }
        }
    }

    /// Drop every entry. Open scopes stay open (their undo logs are
    /// emptied), so pending pops remain balanced.
    pub fn clear(&mut self) {
        self.map.clear();
        self.undo.clear();
        for mark in &mut self.scopes {
            *mark = 0;
        }
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
