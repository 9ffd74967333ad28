//! Expression normalizer
//!
//! Reduces expressions to canonical form and decides convertibility.
//! Reduction covers β-redexes, δ-unfolding of non-opaque definitions,
//! let elimination, built-in value computation, and decision of literal
//! propositional equalities. Lambdas become closures and are not entered
//! until an argument arrives or reification forces them.
//!
//! The normalizer works over stack values: a value is an already-reduced
//! expression, a closure (an un-entered λ paired with the value stack
//! captured where it was met), or a bounded-variable marker carrying an
//! absolute binder depth. Markers reify to the correct relative de
//! Bruijn index no matter how much deeper the surrounding context has
//! grown.
//!
//! Memoization is keyed on node identity and gated on sharing; cache
//! frames open and close with the value stack, because an entry is only
//! valid while the interpretation of the expression's free variables is
//! unchanged.
//!
//! Every recursive call counts against a configurable depth budget
//! (`kernel.normalizer.max_depth`, unbounded by default) and polls a
//! cooperative interruption flag that a watchdog thread may set.

use crate::cache::ScopedCache;
use crate::context::Context;
use crate::env::Environment;
use crate::expr::{Binder, Expr, ExprKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Minimum stack space to reserve before recursive calls (32 KB).
const MIN_STACK_RED_ZONE: usize = 32 * 1024;

/// Stack size to grow to when running low (1 MB).
const STACK_GROWTH_SIZE: usize = 1024 * 1024;

/// Default recursion budget (`kernel.normalizer.max_depth`): unbounded.
pub const DEFAULT_MAX_DEPTH: u32 = u32::MAX;

/// Normalization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NormalizerError {
    #[error("kernel normalizer maximum recursion depth exceeded")]
    DepthExceeded,
    #[error("kernel normalizer interrupted")]
    Interrupted,
}

type NResult<T> = Result<T, NormalizerError>;

/// A stack value: a reduced expression, a closure, or a bounded-variable
/// marker carrying an absolute binder depth.
#[derive(Clone, Debug)]
pub enum SValue {
    /// An already-normalized expression.
    Expr(Expr),
    /// An un-entered λ paired with the value stack captured at
    /// construction. The expression is always a `Lambda`.
    Closure(Expr, ValueStack),
    /// A variable bound `level` binders above the bottom; reified in a
    /// context of depth `k` it becomes `Var(k - level - 1)`.
    BoundedVar(usize),
}

#[derive(Debug)]
struct StackNode {
    value: SValue,
    prev: ValueStack,
}

/// The value stack: substitutions for the innermost binders, indexed
/// from 0 (innermost). An immutable cons list, cheap to extend and to
/// capture in closures.
#[derive(Clone, Debug, Default)]
pub struct ValueStack(Option<Arc<StackNode>>);

impl ValueStack {
    pub fn new() -> Self {
        ValueStack(None)
    }

    /// Push a substitution for a new innermost binder.
    pub fn extend(&self, value: SValue) -> ValueStack {
        ValueStack(Some(Arc::new(StackNode {
            value,
            prev: self.clone(),
        })))
    }
}

fn closure_binder(lam: &Expr) -> &Binder {
    match lam.kind() {
        ExprKind::Lambda(b) => b,
        // Closures are only ever built from Lambda nodes
        _ => unreachable!("closure without a lambda"),
    }
}

/// The expression normalizer. One instance per thread; the environment
/// may be shared, the per-instance state may not.
pub struct Normalizer<'env> {
    env: &'env Environment,
    ctx: Context,
    cache: ScopedCache<SValue>,
    max_depth: u32,
    depth: u32,
    interrupted: Arc<AtomicBool>,
}

impl<'env> Normalizer<'env> {
    /// Create a normalizer with an unbounded recursion budget.
    pub fn new(env: &'env Environment) -> Self {
        Self::with_max_depth(env, DEFAULT_MAX_DEPTH)
    }

    /// Create a normalizer with the given recursion budget
    /// (`kernel.normalizer.max_depth`).
    pub fn with_max_depth(env: &'env Environment, max_depth: u32) -> Self {
        Normalizer {
            env,
            ctx: Context::empty(),
            cache: ScopedCache::new(),
            max_depth,
            depth: 0,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Normalize `e` in the given context.
    pub fn normalize(&mut self, e: &Expr, ctx: &Context) -> NResult<Expr> {
        self.set_ctx(ctx);
        let k = self.ctx.size();
        let v = self.normalize_value(e, &ValueStack::new(), k)?;
        self.reify(&v, k)
    }

    /// Decide whether `expected` and `given` are equal up to
    /// normalization, universe cumulativity, and the Π-telescope rules.
    pub fn is_convertible(
        &mut self,
        expected: &Expr,
        given: &Expr,
        ctx: &Context,
    ) -> NResult<bool> {
        if self.is_convertible_core(expected, given) {
            return Ok(true);
        }
        self.set_ctx(ctx);
        let k = self.ctx.size();
        let e_v = self.normalize_value(expected, &ValueStack::new(), k)?;
        let e_n = self.reify(&e_v, k)?;
        let g_v = self.normalize_value(given, &ValueStack::new(), k)?;
        let g_n = self.reify(&g_v, k)?;
        Ok(self.is_convertible_core(&e_n, &g_n))
    }

    /// Discard the cached context and all memoized results. Required
    /// before reuse after a `DepthExceeded` or `Interrupted` failure.
    pub fn clear(&mut self) {
        self.ctx = Context::empty();
        self.cache.clear();
        self.depth = 0;
    }

    /// Cooperative cancellation: a set flag makes the next recursive
    /// step fail with `Interrupted`. May be called from another thread.
    pub fn set_interrupt(&self, flag: bool) {
        self.interrupted.store(flag, Ordering::Relaxed);
    }

    /// The interruption flag, for handing to a watchdog.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    fn set_ctx(&mut self, ctx: &Context) {
        if !Context::is_eqp(ctx, &self.ctx) {
            self.ctx = ctx.clone();
            self.cache.clear();
        }
    }

    /// Run `f` with the cache scoped: the frame opened here is popped on
    /// every exit path, error returns included.
    fn with_cache_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> NResult<T>) -> NResult<T> {
        self.cache.push_scope();
        let r = f(self);
        self.cache.pop_scope();
        r
    }

    /// Run `f` with the ambient context swapped out. The cache is
    /// flushed on entry and on exit: its entries are only valid for the
    /// context they were computed in.
    fn with_saved_context<T>(
        &mut self,
        ctx: Context,
        f: impl FnOnce(&mut Self) -> NResult<T>,
    ) -> NResult<T> {
        let saved = std::mem::replace(&mut self.ctx, ctx);
        self.cache.clear();
        let r = f(self);
        self.ctx = saved;
        self.cache.clear();
        r
    }

    /// Normalize `a` under value stack `s` with `k` binders in scope
    /// above the ambient context.
    fn normalize_value(&mut self, a: &Expr, s: &ValueStack, k: usize) -> NResult<SValue> {
        self.depth += 1;
        let r = stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || {
            self.normalize_core(a, s, k)
        });
        self.depth -= 1;
        r
    }

    fn normalize_core(&mut self, a: &Expr, s: &ValueStack, k: usize) -> NResult<SValue> {
        if self.interrupted.load(Ordering::Relaxed) {
            return Err(NormalizerError::Interrupted);
        }
        if self.depth > self.max_depth {
            return Err(NormalizerError::DepthExceeded);
        }

        let shared = a.is_shared();
        if shared {
            if let Some(v) = self.cache.find(a) {
                return Ok(v.clone());
            }
        }

        let r = match a.kind() {
            ExprKind::Var(i) => self.lookup(s, *i)?,
            ExprKind::Constant(n) => {
                let env = self.env;
                match env.get_object(n) {
                    Some(obj) if obj.is_definition() && !obj.is_opaque() => {
                        match obj.get_value() {
                            // Unfold in a fresh scope: the body is closed
                            // over the empty stack at depth 0.
                            Some(value) => {
                                self.normalize_value(value, &ValueStack::new(), 0)?
                            }
                            None => SValue::Expr(a.clone()),
                        }
                    }
                    _ => SValue::Expr(a.clone()),
                }
            }
            ExprKind::Type(_) | ExprKind::Value(_) => SValue::Expr(a.clone()),
            ExprKind::App(args) => self.normalize_app(args, s, k)?,
            ExprKind::Eq(lhs, rhs) => {
                let new_lhs = self.reify_normalized(lhs, s, k)?;
                let new_rhs = self.reify_normalized(rhs, s, k)?;
                if new_lhs == new_rhs {
                    SValue::Expr(Expr::bool_value(true))
                } else if new_lhs.is_value() && new_rhs.is_value() {
                    SValue::Expr(Expr::bool_value(false))
                } else {
                    SValue::Expr(Expr::eq(new_lhs, new_rhs))
                }
            }
            // No reduction under lambdas until an argument arrives
            ExprKind::Lambda(_) => SValue::Closure(a.clone(), s.clone()),
            ExprKind::Pi(b) => {
                let new_t = self.reify_normalized(&b.domain, s, k)?;
                let ext = s.extend(SValue::BoundedVar(k));
                let new_b =
                    self.with_cache_scope(|this| this.reify_normalized(&b.body, &ext, k + 1))?;
                SValue::Expr(Expr::pi(b.name.clone(), new_t, new_b))
            }
            ExprKind::Let { value, body, .. } => {
                // Keep the value in stack-value form so substitution
                // stays lazy; no Let is rebuilt.
                let v = self.normalize_value(value, s, k)?;
                let ext = s.extend(v);
                self.with_cache_scope(|this| this.normalize_value(body, &ext, k + 1))?
            }
        };

        if shared {
            self.cache.insert(a, r.clone());
        }
        Ok(r)
    }

    /// Reduce an application. `args[0]` is the function; β-steps consume
    /// arguments one at a time while the head stays a closure, and the
    /// remainder is reified into a stuck application, computing built-in
    /// values at the head when their rule fires.
    fn normalize_app(&mut self, args: &[Expr], s: &ValueStack, k: usize) -> NResult<SValue> {
        let n = args.len();
        let mut f = self.normalize_value(&args[0], s, k)?;
        let mut i = 1;
        loop {
            match f {
                SValue::Closure(lam, captured) => {
                    // One β-step under a fresh cache frame
                    let beta = self.with_cache_scope(|this| {
                        let arg = this.normalize_value(&args[i], s, k)?;
                        let ext = captured.extend(arg);
                        this.normalize_value(&closure_binder(&lam).body.clone(), &ext, k)
                    })?;
                    f = beta;
                    if i == n - 1 {
                        return Ok(f);
                    }
                    i += 1;
                }
                head => {
                    let new_f = self.reify(&head, k)?;
                    let mut new_args = Vec::with_capacity(n - i + 1);
                    new_args.push(new_f);
                    while i < n {
                        let v = self.normalize_value(&args[i], s, k)?;
                        new_args.push(self.reify(&v, k)?);
                        i += 1;
                    }
                    if let ExprKind::Value(b) = new_args[0].kind() {
                        if let Some(m) = b.normalize(&new_args) {
                            return self.normalize_value(&m, s, k);
                        }
                    }
                    return Ok(SValue::Expr(Expr::app(new_args)));
                }
            }
        }
    }

    /// Resolve a variable: walk the value stack, then fall through to
    /// the ambient context. A let-bound context entry is normalized in
    /// its own prefix; a plain entry becomes a bounded-variable marker
    /// at the prefix depth.
    fn lookup(&mut self, s: &ValueStack, i: u32) -> NResult<SValue> {
        let mut j = i as usize;
        let mut it = &s.0;
        while let Some(node) = it {
            if j == 0 {
                return Ok(node.value.clone());
            }
            j -= 1;
            it = &node.prev.0;
        }

        let found = self
            .ctx
            .lookup_ext(j)
            .map(|(entry, prefix)| (entry.body.clone(), prefix));
        match found {
            Some((Some(body), prefix)) => {
                let depth = prefix.size();
                let e = self.with_saved_context(prefix, |this| {
                    let v = this.normalize_value(&body, &ValueStack::new(), depth)?;
                    this.reify(&v, depth)
                })?;
                Ok(SValue::Expr(e))
            }
            Some((None, prefix)) => Ok(SValue::BoundedVar(prefix.size())),
            // An index past the ambient context: ill-formed input; the
            // variable is kept as-is.
            None => Ok(SValue::Expr(Expr::var(i))),
        }
    }

    fn reify_normalized(&mut self, e: &Expr, s: &ValueStack, k: usize) -> NResult<Expr> {
        let v = self.normalize_value(e, s, k)?;
        self.reify(&v, k)
    }

    /// Convert a stack value back into an expression in a context of
    /// `k` binders.
    fn reify(&mut self, v: &SValue, k: usize) -> NResult<Expr> {
        match v {
            SValue::Expr(e) => Ok(e.clone()),
            SValue::BoundedVar(level) => Ok(Expr::var((k - level - 1) as u32)),
            SValue::Closure(lam, s) => self.reify_closure(lam, s, k),
        }
    }

    fn reify_closure(&mut self, lam: &Expr, s: &ValueStack, k: usize) -> NResult<Expr> {
        let b = closure_binder(lam).clone();
        let new_t = self.reify_normalized(&b.domain, s, k)?;
        let ext = s.extend(SValue::BoundedVar(k));
        let new_b = self.reify_normalized(&b.body, &ext, k + 1)?;
        Ok(Expr::lambda(b.name, new_t, new_b))
    }

    /// The structural convertibility test: syntactic equality, universe
    /// cumulativity (contravariant in the expected position), bool as a
    /// small type, and descent through Π-telescopes with syntactically
    /// equal domains. No eta.
    fn is_convertible_core(&self, expected: &Expr, given: &Expr) -> bool {
        if expected == given {
            return true;
        }
        let bool_ty = Expr::bool_type();
        let mut e = expected;
        let mut g = given;
        loop {
            if let (ExprKind::Type(u), ExprKind::Type(v)) = (e.kind(), g.kind()) {
                if self.env.is_ge(u, v) {
                    return true;
                }
            }

            if e.is_type() && *g == bool_ty {
                return true;
            }

            match (e.kind(), g.kind()) {
                (ExprKind::Pi(be), ExprKind::Pi(bg)) if be.domain == bg.domain => {
                    e = &be.body;
                    g = &bg.body;
                }
                _ => return false,
            }
        }
    }
}

/// Normalize `e` with a throwaway normalizer.
pub fn normalize(e: &Expr, env: &Environment, ctx: &Context) -> NResult<Expr> {
    Normalizer::new(env).normalize(e, ctx)
}

/// Decide convertibility with a throwaway normalizer.
pub fn is_convertible(
    expected: &Expr,
    given: &Expr,
    env: &Environment,
    ctx: &Context,
) -> NResult<bool> {
    Normalizer::new(env).is_convertible(expected, given, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextEntry;
    use crate::level::Level;
    use crate::name::Name;

    fn setup_env() -> Environment {
        let mut env = Environment::new();
        env.add_axiom("A".into(), Expr::type0()).unwrap();
        env.add_axiom("c".into(), Expr::constant("A".into()))
            .unwrap();
        // id := fun x : Type, x
        env.add_definition(
            "id".into(),
            Expr::pi("x".into(), Expr::type0(), Expr::type0()),
            Expr::lambda("x".into(), Expr::type0(), Expr::var(0)),
            false,
        )
        .unwrap();
        // opaque_id is the same function, but opaque
        env.add_definition(
            "opaque_id".into(),
            Expr::pi("x".into(), Expr::type0(), Expr::type0()),
            Expr::lambda("x".into(), Expr::type0(), Expr::var(0)),
            true,
        )
        .unwrap();
        env
    }

    fn norm(env: &Environment, e: &Expr) -> Expr {
        Normalizer::new(env).normalize(e, &Context::empty()).unwrap()
    }

    #[test]
    fn test_beta() {
        let env = setup_env();
        // (fun x : Type, x) c  ==>  c
        let e = Expr::apply(
            Expr::lambda("x".into(), Expr::type0(), Expr::var(0)),
            Expr::constant("c".into()),
        );
        assert_eq!(norm(&env, &e), Expr::constant("c".into()));
    }

    #[test]
    fn test_beta_matches_substitution() {
        let env = setup_env();
        // normalize(App(Lambda(_, T, b), a)) == normalize(b[0 := a])
        let body = Expr::apply(Expr::constant("id".into()), Expr::var(0));
        let arg = Expr::constant("c".into());
        let redex = Expr::apply(
            Expr::lambda("x".into(), Expr::type0(), body.clone()),
            arg.clone(),
        );
        assert_eq!(norm(&env, &redex), norm(&env, &body.substitute(0, &arg)));
    }

    #[test]
    fn test_delta() {
        let env = setup_env();
        // id c  ==>  c
        let e = Expr::apply(Expr::constant("id".into()), Expr::constant("c".into()));
        assert_eq!(norm(&env, &e), Expr::constant("c".into()));
    }

    #[test]
    fn test_delta_bare_constant() {
        let mut env = setup_env();
        env.add_definition(
            "d".into(),
            Expr::constant("A".into()),
            Expr::constant("c".into()),
            false,
        )
        .unwrap();
        assert_eq!(
            norm(&env, &Expr::constant("d".into())),
            Expr::constant("c".into())
        );
        // The unfolding agrees with normalizing the body in the empty context
        assert_eq!(
            norm(&env, &Expr::constant("d".into())),
            norm(&env, &Expr::constant("c".into()))
        );
    }

    #[test]
    fn test_opaque_not_unfolded() {
        let env = setup_env();
        assert_eq!(
            norm(&env, &Expr::constant("opaque_id".into())),
            Expr::constant("opaque_id".into())
        );
        // Theorems behave like opaque definitions
        let mut env = env;
        env.add_theorem(
            "thm".into(),
            Expr::constant("A".into()),
            Expr::constant("c".into()),
        )
        .unwrap();
        assert_eq!(
            norm(&env, &Expr::constant("thm".into())),
            Expr::constant("thm".into())
        );
    }

    #[test]
    fn test_unknown_constant_kept() {
        let env = Environment::new();
        let e = Expr::constant("ghost".into());
        assert_eq!(norm(&env, &e), e);
    }

    #[test]
    fn test_depth_cap() {
        let env = setup_env();
        let id = Expr::lambda("x".into(), Expr::type0(), Expr::var(0));
        let mut e = Expr::constant("c".into());
        for _ in 0..10 {
            e = Expr::apply(id.clone(), e);
        }
        let mut normalizer = Normalizer::with_max_depth(&env, 3);
        assert_eq!(
            normalizer.normalize(&e, &Context::empty()),
            Err(NormalizerError::DepthExceeded)
        );
        // After clear() the instance is usable again
        normalizer.clear();
        assert_eq!(
            normalizer.normalize(&Expr::constant("c".into()), &Context::empty()),
            Ok(Expr::constant("c".into()))
        );
    }

    #[test]
    fn test_interrupt() {
        let env = setup_env();
        let mut normalizer = Normalizer::new(&env);
        normalizer.set_interrupt(true);
        assert_eq!(
            normalizer.normalize(&Expr::constant("c".into()), &Context::empty()),
            Err(NormalizerError::Interrupted)
        );
        normalizer.set_interrupt(false);
        normalizer.clear();
        assert!(normalizer
            .normalize(&Expr::constant("c".into()), &Context::empty())
            .is_ok());
    }

    #[test]
    fn test_interrupt_flag_from_other_thread() {
        let env = setup_env();
        let normalizer = Normalizer::new(&env);
        let flag = normalizer.interrupt_flag();
        let handle = std::thread::spawn(move || {
            flag.store(true, Ordering::Relaxed);
        });
        handle.join().ok();
        let mut normalizer = normalizer;
        assert_eq!(
            normalizer.normalize(&Expr::constant("c".into()), &Context::empty()),
            Err(NormalizerError::Interrupted)
        );
    }

    #[test]
    fn test_eq_literals() {
        let env = setup_env();
        assert_eq!(
            norm(&env, &Expr::eq(Expr::int_value(1), Expr::int_value(1))),
            Expr::bool_value(true)
        );
        assert_eq!(
            norm(&env, &Expr::eq(Expr::int_value(1), Expr::int_value(2))),
            Expr::bool_value(false)
        );
    }

    #[test]
    fn test_eq_reflexive_non_literal() {
        let env = setup_env();
        let c = Expr::constant("c".into());
        assert_eq!(norm(&env, &Expr::eq(c.clone(), c)), Expr::bool_value(true));
    }

    #[test]
    fn test_eq_stuck() {
        let env = setup_env();
        let e = Expr::eq(Expr::constant("c".into()), Expr::int_value(1));
        assert_eq!(norm(&env, &e), e);
    }

    #[test]
    fn test_eq_reduces_sides() {
        let env = setup_env();
        // (id c = c) decides to true after reducing the left side
        let e = Expr::eq(
            Expr::apply(Expr::constant("id".into()), Expr::constant("c".into())),
            Expr::constant("c".into()),
        );
        assert_eq!(norm(&env, &e), Expr::bool_value(true));
    }

    #[test]
    fn test_builtin_computation() {
        let env = setup_env();
        let add = |a, b| Expr::app(vec![Expr::value(crate::builtin::Builtin::IntAdd), a, b]);
        assert_eq!(
            norm(&env, &add(Expr::int_value(2), Expr::int_value(3))),
            Expr::int_value(5)
        );
        // Nested computation
        assert_eq!(
            norm(
                &env,
                &add(add(Expr::int_value(1), Expr::int_value(2)), Expr::int_value(3))
            ),
            Expr::int_value(6)
        );
        // A stuck argument preserves the application
        let stuck = add(Expr::constant("c".into()), Expr::int_value(3));
        assert_eq!(norm(&env, &stuck), stuck);
    }

    #[test]
    fn test_lambda_reifies_normalized() {
        let env = setup_env();
        // Domains and bodies are normalized on reification, the binder
        // itself is kept
        let e = Expr::lambda(
            "x".into(),
            Expr::type0(),
            Expr::apply(Expr::constant("id".into()), Expr::var(0)),
        );
        let expected = Expr::lambda("x".into(), Expr::type0(), Expr::var(0));
        assert_eq!(norm(&env, &e), expected);
    }

    #[test]
    fn test_pi_normalizes_components() {
        let env = setup_env();
        let e = Expr::pi(
            "x".into(),
            Expr::apply(Expr::constant("id".into()), Expr::type0()),
            Expr::apply(Expr::constant("id".into()), Expr::var(0)),
        );
        let expected = Expr::pi("x".into(), Expr::type0(), Expr::var(0));
        assert_eq!(norm(&env, &e), expected);
    }

    #[test]
    fn test_let_elimination() {
        let env = setup_env();
        let add = |a, b| Expr::app(vec![Expr::value(crate::builtin::Builtin::IntAdd), a, b]);
        // let x := 5 in x + x  ==>  10
        let e = Expr::let_(
            "x".into(),
            Expr::int_value(5),
            add(Expr::var(0), Expr::var(0)),
        );
        assert_eq!(norm(&env, &e), Expr::int_value(10));
        // ... and agrees with substitution
        let body = add(Expr::var(0), Expr::var(0));
        assert_eq!(
            norm(&env, &e),
            norm(&env, &body.substitute(0, &Expr::int_value(5)))
        );
    }

    #[test]
    fn test_idempotence() {
        let env = setup_env();
        let add = |a, b| Expr::app(vec![Expr::value(crate::builtin::Builtin::IntAdd), a, b]);
        let samples = vec![
            Expr::apply(Expr::constant("id".into()), Expr::constant("c".into())),
            Expr::lambda(
                "x".into(),
                Expr::type0(),
                Expr::apply(Expr::constant("id".into()), Expr::var(0)),
            ),
            Expr::eq(Expr::constant("c".into()), Expr::int_value(1)),
            add(Expr::constant("c".into()), Expr::int_value(3)),
            Expr::pi("x".into(), Expr::type0(), Expr::var(0)),
        ];
        for e in samples {
            let once = norm(&env, &e);
            let twice = norm(&env, &once);
            assert_eq!(once, twice, "normalization not idempotent for {e}");
        }
    }

    #[test]
    fn test_determinism() {
        let env = setup_env();
        let e = Expr::apply(
            Expr::constant("id".into()),
            Expr::apply(Expr::constant("id".into()), Expr::constant("c".into())),
        );
        assert_eq!(norm(&env, &e), norm(&env, &e));
    }

    #[test]
    fn test_shared_subterm_memoized_result() {
        let env = setup_env();
        let add = |a, b| Expr::app(vec![Expr::value(crate::builtin::Builtin::IntAdd), a, b]);
        let sub = add(Expr::int_value(2), Expr::int_value(3));
        // `sub` is referenced twice, so it is shared and cacheable
        let e = add(sub.clone(), sub);
        assert_eq!(norm(&env, &e), Expr::int_value(10));
    }

    #[test]
    fn test_context_let_entry_unfolds() {
        let env = setup_env();
        let ctx = Context::empty().extend(ContextEntry::let_bound(
            "x".into(),
            Expr::int_type(),
            Expr::int_value(5),
        ));
        let mut normalizer = Normalizer::new(&env);
        assert_eq!(
            normalizer.normalize(&Expr::var(0), &ctx),
            Ok(Expr::int_value(5))
        );
    }

    #[test]
    fn test_context_plain_entry_stays_variable() {
        let env = setup_env();
        let ctx = Context::empty()
            .extend(ContextEntry::var("x".into(), Expr::int_type()))
            .extend(ContextEntry::var("y".into(), Expr::int_type()));
        let mut normalizer = Normalizer::new(&env);
        assert_eq!(normalizer.normalize(&Expr::var(0), &ctx), Ok(Expr::var(0)));
        assert_eq!(normalizer.normalize(&Expr::var(1), &ctx), Ok(Expr::var(1)));
    }

    #[test]
    fn test_context_entry_body_normalized_in_prefix() {
        let env = setup_env();
        let add = |a, b| Expr::app(vec![Expr::value(crate::builtin::Builtin::IntAdd), a, b]);
        let ctx = Context::empty()
            .extend(ContextEntry::let_bound(
                "x".into(),
                Expr::int_type(),
                add(Expr::int_value(2), Expr::int_value(3)),
            ))
            .extend(ContextEntry::var("y".into(), Expr::int_type()));
        let mut normalizer = Normalizer::new(&env);
        // Var(1) refers to x, whose body computes in its own scope
        assert_eq!(
            normalizer.normalize(&Expr::var(1), &ctx),
            Ok(Expr::int_value(5))
        );
        // The ambient context is restored afterwards
        assert_eq!(normalizer.normalize(&Expr::var(0), &ctx), Ok(Expr::var(0)));
    }

    #[test]
    fn test_convertible_reflexive() {
        let env = setup_env();
        let e = Expr::apply(Expr::constant("id".into()), Expr::constant("c".into()));
        assert_eq!(
            Normalizer::new(&env).is_convertible(&e, &e, &Context::empty()),
            Ok(true)
        );
    }

    #[test]
    fn test_convertible_cumulativity() {
        let env = setup_env();
        let t1 = Expr::type_(Level::of(1));
        let t0 = Expr::type0();
        // Type 1 >= Type 0, not the reverse
        assert_eq!(
            Normalizer::new(&env).is_convertible(&t1, &t0, &Context::empty()),
            Ok(true)
        );
        assert_eq!(
            Normalizer::new(&env).is_convertible(&t0, &t1, &Context::empty()),
            Ok(false)
        );
    }

    #[test]
    fn test_convertible_universe_constraints() {
        let mut env = Environment::new();
        env.add_universe("u".into()).unwrap();
        env.add_universe("v".into()).unwrap();
        env.add_universe_constraint("u".into(), "v".into()).unwrap();
        let tu = Expr::type_(Level::param("u".into()));
        let tv = Expr::type_(Level::param("v".into()));
        assert_eq!(
            Normalizer::new(&env).is_convertible(&tu, &tv, &Context::empty()),
            Ok(true)
        );
        assert_eq!(
            Normalizer::new(&env).is_convertible(&tv, &tu, &Context::empty()),
            Ok(false)
        );
    }

    #[test]
    fn test_convertible_bool_small() {
        let env = setup_env();
        assert_eq!(
            Normalizer::new(&env).is_convertible(
                &Expr::type_(Level::of(2)),
                &Expr::bool_type(),
                &Context::empty()
            ),
            Ok(true)
        );
        assert_eq!(
            Normalizer::new(&env).is_convertible(
                &Expr::bool_type(),
                &Expr::type0(),
                &Context::empty()
            ),
            Ok(false)
        );
    }

    #[test]
    fn test_convertible_pi_telescope() {
        let env = setup_env();
        let a = Expr::constant("A".into());
        // (x : A) -> Type 1  >=  (x : A) -> Type 0
        let p1 = Expr::pi("x".into(), a.clone(), Expr::type_(Level::of(1)));
        let p0 = Expr::pi("x".into(), a.clone(), Expr::type0());
        assert_eq!(
            Normalizer::new(&env).is_convertible(&p1, &p0, &Context::empty()),
            Ok(true)
        );
        // Different domains fail
        let q = Expr::pi("x".into(), Expr::bool_type(), Expr::type_(Level::of(1)));
        assert_eq!(
            Normalizer::new(&env).is_convertible(&q, &p0, &Context::empty()),
            Ok(false)
        );
    }

    #[test]
    fn test_convertible_after_normalization() {
        let mut env = setup_env();
        // P unfolds to the boolean type, so Type >= P after reduction
        env.add_definition("P".into(), Expr::type0(), Expr::bool_type(), false)
            .unwrap();
        assert_eq!(
            Normalizer::new(&env).is_convertible(
                &Expr::type0(),
                &Expr::constant("P".into()),
                &Context::empty()
            ),
            Ok(true)
        );
        // Normalization closure: equal normal forms are convertible
        let a = Expr::apply(Expr::constant("id".into()), Expr::constant("c".into()));
        let b = Expr::constant("c".into());
        assert_eq!(
            Normalizer::new(&env).is_convertible(&a, &b, &Context::empty()),
            Ok(true)
        );
    }

    #[test]
    fn test_no_eta() {
        let mut env = setup_env();
        env.add_axiom(
            "f".into(),
            Expr::pi("x".into(), Expr::constant("A".into()), Expr::constant("A".into())),
        )
        .unwrap();
        // fun x : A, f x  is NOT convertible with  f
        let eta = Expr::lambda(
            "x".into(),
            Expr::constant("A".into()),
            Expr::apply(Expr::constant("f".into()), Expr::var(0)),
        );
        assert_eq!(
            Normalizer::new(&env).is_convertible(
                &eta,
                &Expr::constant("f".into()),
                &Context::empty()
            ),
            Ok(false)
        );
    }

    #[test]
    fn test_display_names_preserved() {
        let env = setup_env();
        let e = Expr::pi(Name::from_string("n"), Expr::type0(), Expr::var(0));
        let n = norm(&env, &e);
        assert_eq!(n.abst_name(), Some(&Name::from_string("n")));
    }
}
