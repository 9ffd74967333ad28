//! Kernel expressions
//!
//! Expressions form an immutable DAG: nodes are shared via `Arc`, every
//! node carries a precomputed structural hash, and equal subtrees compare
//! cheaply (pointer check, then hash, then structure). Sharing is what
//! the normalizer's memoization keys on: a node referenced from more than
//! one place ([`Expr::is_shared`]) is worth caching, and its address
//! ([`Expr::ptr_id`]) identifies it while it is alive.
//!
//! Variables are de Bruijn indices; free variables refer to the ambient
//! typing context. Applications are n-ary with the function at index 0.

use crate::builtin::Builtin;
use crate::level::Level;
use crate::name::Name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A binder: `λ name : domain, body` or `Π name : domain, body`.
/// The body uses de Bruijn indices; the name is display-only.
#[derive(Debug, Clone)]
pub struct Binder {
    pub name: Name,
    pub domain: Expr,
    pub body: Expr,
}

/// Expression node kinds.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Bound variable (de Bruijn index); indices past the innermost
    /// binders refer to the ambient context.
    Var(u32),
    /// Reference to an environment object.
    Constant(Name),
    /// Universe at a level.
    Type(Level),
    /// Built-in literal or primitive operation.
    Value(Builtin),
    /// n-ary application; `args[0]` is the function and there is at
    /// least one argument (`args.len() >= 2`).
    App(Vec<Expr>),
    /// Propositional equality.
    Eq(Expr, Expr),
    /// Lambda abstraction.
    Lambda(Binder),
    /// Dependent function type.
    Pi(Binder),
    /// Let binding.
    Let { name: Name, value: Expr, body: Expr },
}

#[derive(Debug)]
struct ExprData {
    hash: u64,
    kind: ExprKind,
}

/// A shared, immutable expression.
#[derive(Clone, Debug)]
pub struct Expr(Arc<ExprData>);

fn combine(seed: u64, h: u64) -> u64 {
    // 64-bit variant of boost::hash_combine
    seed ^ (h
        .wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2))
}

fn hash_of<T: Hash>(t: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    t.hash(&mut hasher);
    hasher.finish()
}

fn structural_hash(kind: &ExprKind) -> u64 {
    match kind {
        ExprKind::Var(i) => combine(1, u64::from(*i)),
        ExprKind::Constant(n) => combine(2, hash_of(n)),
        ExprKind::Type(l) => combine(3, hash_of(l)),
        ExprKind::Value(b) => combine(4, hash_of(b)),
        ExprKind::App(args) => args.iter().fold(5, |acc, a| combine(acc, a.hash())),
        ExprKind::Eq(lhs, rhs) => combine(combine(6, lhs.hash()), rhs.hash()),
        ExprKind::Lambda(b) => combine(combine(7, b.domain.hash()), b.body.hash()),
        ExprKind::Pi(b) => combine(combine(8, b.domain.hash()), b.body.hash()),
        ExprKind::Let { value, body, .. } => combine(combine(9, value.hash()), body.hash()),
    }
}

impl Expr {
    fn mk(kind: ExprKind) -> Expr {
        let hash = structural_hash(&kind);
        Expr(Arc::new(ExprData { hash, kind }))
    }

    /// Bound variable.
    pub fn var(idx: u32) -> Expr {
        Expr::mk(ExprKind::Var(idx))
    }

    /// Constant reference.
    pub fn constant(name: Name) -> Expr {
        Expr::mk(ExprKind::Constant(name))
    }

    /// Universe at the given level.
    pub fn type_(level: Level) -> Expr {
        Expr::mk(ExprKind::Type(level))
    }

    /// `Type 0`.
    pub fn type0() -> Expr {
        Expr::type_(Level::zero())
    }

    /// Built-in value.
    pub fn value(b: Builtin) -> Expr {
        Expr::mk(ExprKind::Value(b))
    }

    /// Boolean literal.
    pub fn bool_value(b: bool) -> Expr {
        Expr::value(Builtin::Bool(b))
    }

    /// Integer literal.
    pub fn int_value(n: i64) -> Expr {
        Expr::value(Builtin::Int(n))
    }

    /// The type of booleans.
    pub fn bool_type() -> Expr {
        Expr::value(Builtin::BoolType)
    }

    /// The type of integers.
    pub fn int_type() -> Expr {
        Expr::value(Builtin::IntType)
    }

    /// n-ary application; `args[0]` is the function. A nested
    /// application head is spliced so applications stay flat.
    pub fn app(args: Vec<Expr>) -> Expr {
        debug_assert!(args.len() >= 2, "an application needs an argument");
        let flat = match args[0].kind() {
            ExprKind::App(head_args) => {
                let mut flat = Vec::with_capacity(head_args.len() + args.len() - 1);
                flat.extend(head_args.iter().cloned());
                flat.extend(args[1..].iter().cloned());
                flat
            }
            _ => args,
        };
        Expr::mk(ExprKind::App(flat))
    }

    /// Binary application convenience.
    pub fn apply(f: Expr, arg: Expr) -> Expr {
        Expr::app(vec![f, arg])
    }

    /// Propositional equality node.
    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::mk(ExprKind::Eq(lhs, rhs))
    }

    /// Lambda abstraction.
    pub fn lambda(name: Name, domain: Expr, body: Expr) -> Expr {
        Expr::mk(ExprKind::Lambda(Binder { name, domain, body }))
    }

    /// Dependent function type.
    pub fn pi(name: Name, domain: Expr, body: Expr) -> Expr {
        Expr::mk(ExprKind::Pi(Binder { name, domain, body }))
    }

    /// Non-dependent function type `domain -> body`.
    pub fn arrow(domain: Expr, body: Expr) -> Expr {
        Expr::pi(Name::anon(), domain, body)
    }

    /// Let binding.
    pub fn let_(name: Name, value: Expr, body: Expr) -> Expr {
        Expr::mk(ExprKind::Let { name, value, body })
    }

    /// The node kind.
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// The precomputed structural hash.
    pub fn hash(&self) -> u64 {
        self.0.hash
    }

    /// Stable identity of this node while it is alive.
    pub fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Pointer equality.
    pub fn is_eqp(a: &Expr, b: &Expr) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// True when this node is referenced from more than one place.
    /// Memoization is only worthwhile for shared nodes.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    /// The binder of a `Lambda` or `Pi` node.
    pub fn as_binder(&self) -> Option<&Binder> {
        match self.kind() {
            ExprKind::Lambda(b) | ExprKind::Pi(b) => Some(b),
            _ => None,
        }
    }

    /// Display name of a binder node.
    pub fn abst_name(&self) -> Option<&Name> {
        self.as_binder().map(|b| &b.name)
    }

    /// Domain of a binder node.
    pub fn abst_domain(&self) -> Option<&Expr> {
        self.as_binder().map(|b| &b.domain)
    }

    /// Body of a binder node.
    pub fn abst_body(&self) -> Option<&Expr> {
        self.as_binder().map(|b| &b.body)
    }

    /// All components of an application, the function at index 0.
    /// A non-application is its own head.
    pub fn args(&self) -> &[Expr] {
        match self.kind() {
            ExprKind::App(args) => args,
            _ => std::slice::from_ref(self),
        }
    }

    /// Number of application components, the function included.
    pub fn num_args(&self) -> usize {
        self.args().len()
    }

    /// The `i`-th application component; index 0 is the function.
    pub fn arg(&self, i: usize) -> &Expr {
        &self.args()[i]
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind(), ExprKind::Type(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind(), ExprKind::Value(_))
    }

    pub fn is_pi(&self) -> bool {
        matches!(self.kind(), ExprKind::Pi(_))
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.kind(), ExprKind::Lambda(_))
    }

    /// Lift loose de Bruijn indices `>= cutoff` by `amount`.
    #[must_use]
    pub fn lift(&self, cutoff: u32, amount: u32) -> Expr {
        if amount == 0 {
            return self.clone();
        }
        match self.kind() {
            ExprKind::Var(i) => {
                if *i >= cutoff {
                    Expr::var(i + amount)
                } else {
                    self.clone()
                }
            }
            ExprKind::Constant(_) | ExprKind::Type(_) | ExprKind::Value(_) => self.clone(),
            ExprKind::App(args) => {
                Expr::mk(ExprKind::App(
                    args.iter().map(|a| a.lift(cutoff, amount)).collect(),
                ))
            }
            ExprKind::Eq(lhs, rhs) => {
                Expr::eq(lhs.lift(cutoff, amount), rhs.lift(cutoff, amount))
            }
            ExprKind::Lambda(b) => Expr::lambda(
                b.name.clone(),
                b.domain.lift(cutoff, amount),
                b.body.lift(cutoff + 1, amount),
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                b.domain.lift(cutoff, amount),
                b.body.lift(cutoff + 1, amount),
            ),
            ExprKind::Let { name, value, body } => Expr::let_(
                name.clone(),
                value.lift(cutoff, amount),
                body.lift(cutoff + 1, amount),
            ),
        }
    }

    /// Substitute `sub` for the variable with index `idx`, shifting the
    /// indices above it down by one.
    #[must_use]
    pub fn substitute(&self, idx: u32, sub: &Expr) -> Expr {
        self.substitute_core(idx, sub, 0)
    }

    /// Substitute `sub` for the innermost bound variable.
    #[must_use]
    pub fn instantiate(&self, sub: &Expr) -> Expr {
        self.substitute(0, sub)
    }

    fn substitute_core(&self, idx: u32, sub: &Expr, depth: u32) -> Expr {
        match self.kind() {
            ExprKind::Var(j) => {
                let target = idx + depth;
                if *j == target {
                    sub.lift(0, depth)
                } else if *j > target {
                    Expr::var(j - 1)
                } else {
                    self.clone()
                }
            }
            ExprKind::Constant(_) | ExprKind::Type(_) | ExprKind::Value(_) => self.clone(),
            ExprKind::App(args) => Expr::app(
                args.iter()
                    .map(|a| a.substitute_core(idx, sub, depth))
                    .collect(),
            ),
            ExprKind::Eq(lhs, rhs) => Expr::eq(
                lhs.substitute_core(idx, sub, depth),
                rhs.substitute_core(idx, sub, depth),
            ),
            ExprKind::Lambda(b) => Expr::lambda(
                b.name.clone(),
                b.domain.substitute_core(idx, sub, depth),
                b.body.substitute_core(idx, sub, depth + 1),
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                b.domain.substitute_core(idx, sub, depth),
                b.body.substitute_core(idx, sub, depth + 1),
            ),
            ExprKind::Let { name, value, body } => Expr::let_(
                name.clone(),
                value.substitute_core(idx, sub, depth),
                body.substitute_core(idx, sub, depth + 1),
            ),
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        if Expr::is_eqp(self, other) {
            return true;
        }
        if self.0.hash != other.0.hash {
            return false;
        }
        match (self.kind(), other.kind()) {
            (ExprKind::Var(i), ExprKind::Var(j)) => i == j,
            (ExprKind::Constant(n), ExprKind::Constant(m)) => n == m,
            (ExprKind::Type(u), ExprKind::Type(v)) => u == v,
            (ExprKind::Value(a), ExprKind::Value(b)) => a == b,
            (ExprKind::App(xs), ExprKind::App(ys)) => xs == ys,
            (ExprKind::Eq(l1, r1), ExprKind::Eq(l2, r2)) => l1 == l2 && r1 == r2,
            (ExprKind::Lambda(a), ExprKind::Lambda(b)) | (ExprKind::Pi(a), ExprKind::Pi(b)) => {
                a.domain == b.domain && a.body == b.body
            }
            (
                ExprKind::Let { value: v1, body: b1, .. },
                ExprKind::Let { value: v2, body: b2, .. },
            ) => v1 == v2 && b1 == b2,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Var(i) => write!(f, "#{i}"),
            ExprKind::Constant(n) => write!(f, "{n}"),
            ExprKind::Type(l) => {
                if l.is_zero() {
                    write!(f, "Type")
                } else {
                    write!(f, "(Type {l})")
                }
            }
            ExprKind::Value(b) => write!(f, "{b}"),
            ExprKind::App(args) => {
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ExprKind::Eq(lhs, rhs) => write!(f, "({lhs} = {rhs})"),
            ExprKind::Lambda(b) => write!(f, "(fun {} : {}, {})", b.name, b.domain, b.body),
            ExprKind::Pi(b) => {
                if b.name.is_anonymous() {
                    write!(f, "({} -> {})", b.domain, b.body)
                } else {
                    write!(f, "(Pi {} : {}, {})", b.name, b.domain, b.body)
                }
            }
            ExprKind::Let { name, value, body } => {
                write!(f, "(let {name} := {value} in {body})")
            }
        }
    }
}
