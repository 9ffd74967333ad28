//! Type context
//!
//! A type context bundles the environment, a metavariable context, and a
//! transparency mode, and offers weak-head normalization on demand. The
//! search engine synchronizes the metavariable context with its live
//! proof state before trying lemmas, and computes goal head symbols
//! through `whnf` here rather than through the full kernel normalizer.

use crate::state::{MetaState, ProofState};
use minerva_kernel::{Context, Environment, Expr, ExprKind, Name, Normalizer, ObjectKind};
use std::sync::Arc;

/// Which definitions `whnf` unfolds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparencyMode {
    /// Unfold everything with a body, theorems and opaque definitions
    /// included.
    All,
    /// Unfold non-opaque definitions only (the kernel's own rule).
    #[default]
    Default,
    /// Unfold nothing.
    None,
}

/// Environment + metavariable context + transparency.
#[derive(Debug, Clone)]
pub struct TypeContext {
    env: Arc<Environment>,
    mctx: MetaState,
    transparency: TransparencyMode,
}

impl TypeContext {
    pub fn new(env: Arc<Environment>, transparency: TransparencyMode) -> Self {
        TypeContext {
            env,
            mctx: MetaState::new(),
            transparency,
        }
    }

    /// Build a type context for a proof state.
    pub fn mk_type_context_for(state: &ProofState, transparency: TransparencyMode) -> Self {
        TypeContext {
            env: Arc::clone(&state.env),
            mctx: state.mctx().clone(),
            transparency,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn transparency(&self) -> TransparencyMode {
        self.transparency
    }

    /// Replace the metavariable context (the sync point before trying
    /// lemmas).
    pub fn set_mctx(&mut self, mctx: MetaState) {
        self.mctx = mctx;
    }

    pub fn mctx(&self) -> &MetaState {
        &self.mctx
    }

    /// Weak-head normalize with this context's metavariable state.
    pub fn whnf(&self, e: &Expr) -> Expr {
        self.whnf_in(e, &self.mctx)
    }

    /// Weak-head normalize with an explicit metavariable state: β-steps
    /// at the head, let elimination, δ-unfolding per the transparency
    /// mode, and built-in computation at the head.
    pub fn whnf_in(&self, e: &Expr, mctx: &MetaState) -> Expr {
        let mut t = mctx.instantiate(e);
        loop {
            t = self.whnf_core(t);
            match self.unfold_head(&t) {
                Some(next) => t = next,
                None => return t,
            }
        }
    }

    /// β and let reduction at the head; no δ.
    fn whnf_core(&self, e: Expr) -> Expr {
        let step = match e.kind() {
            ExprKind::Let { value, body, .. } => Some(body.instantiate(value)),
            ExprKind::App(args) => {
                let f = self.whnf_core(args[0].clone());
                if let ExprKind::Lambda(lam) = f.kind() {
                    // One β-step, then keep reducing
                    let reduced = lam.body.instantiate(&args[1]);
                    if args.len() > 2 {
                        let mut new_args = Vec::with_capacity(args.len() - 1);
                        new_args.push(reduced);
                        new_args.extend(args[2..].iter().cloned());
                        Some(Expr::app(new_args))
                    } else {
                        Some(reduced)
                    }
                } else if Expr::is_eqp(&f, &args[0]) {
                    None
                } else {
                    // The head reduced to something stuck: rebuild once
                    let mut new_args = Vec::with_capacity(args.len());
                    new_args.push(f);
                    new_args.extend(args[1..].iter().cloned());
                    return Expr::app(new_args);
                }
            }
            _ => None,
        };
        match step {
            Some(next) => self.whnf_core(next),
            None => e,
        }
    }

    /// Unfold the head constant per the transparency mode, or fire the
    /// head's built-in computation rule.
    fn unfold_head(&self, e: &Expr) -> Option<Expr> {
        let args = e.args();
        match args[0].kind() {
            ExprKind::Constant(n) => {
                let value = self.unfoldable_value(n)?;
                if args.len() == 1 {
                    Some(value.clone())
                } else {
                    let mut new_args = Vec::with_capacity(args.len());
                    new_args.push(value.clone());
                    new_args.extend(args[1..].iter().cloned());
                    Some(Expr::app(new_args))
                }
            }
            ExprKind::Value(b) if args.len() > 1 => b.normalize(args),
            _ => None,
        }
    }

    fn unfoldable_value(&self, name: &Name) -> Option<&Expr> {
        let obj = self.env.get_object(name)?;
        match (&obj.kind, self.transparency) {
            (_, TransparencyMode::None) => None,
            (ObjectKind::Definition { value, opaque }, TransparencyMode::Default) => {
                if *opaque {
                    None
                } else {
                    Some(value)
                }
            }
            (ObjectKind::Definition { value, .. }, TransparencyMode::All) => Some(value),
            (ObjectKind::Theorem { value }, TransparencyMode::All) => Some(value),
            _ => None,
        }
    }

    /// The head symbol of an expression: the outermost constant after
    /// weak-head normalization. Anything without a constant head
    /// (binders, variables, built-in values) has none.
    pub fn head_index(&self, e: &Expr) -> Option<Name> {
        let t = self.whnf(e);
        match t.args()[0].kind() {
            ExprKind::Constant(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Directional convertibility through the kernel normalizer.
    pub fn is_convertible(&self, expected: &Expr, given: &Expr) -> bool {
        let expected = self.mctx.instantiate(expected);
        let given = self.mctx.instantiate(given);
        Normalizer::new(&self.env)
            .is_convertible(&expected, &given, &Context::empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MetaState;

    fn env() -> Arc<Environment> {
        let mut env = Environment::new();
        env.add_axiom("A".into(), Expr::type0()).unwrap();
        env.add_axiom("a".into(), Expr::constant("A".into())).unwrap();
        env.add_axiom(
            "P".into(),
            Expr::arrow(Expr::constant("A".into()), Expr::type0()),
        )
        .unwrap();
        env.add_definition(
            "Pa".into(),
            Expr::type0(),
            Expr::apply(Expr::constant("P".into()), Expr::constant("a".into())),
            false,
        )
        .unwrap();
        env.add_definition(
            "hidden".into(),
            Expr::type0(),
            Expr::constant("A".into()),
            true,
        )
        .unwrap();
        env.add_theorem(
            "thm".into(),
            Expr::constant("A".into()),
            Expr::constant("a".into()),
        )
        .unwrap();
        Arc::new(env)
    }

    #[test]
    fn test_whnf_beta() {
        let ctx = TypeContext::new(env(), TransparencyMode::Default);
        let e = Expr::apply(
            Expr::lambda("x".into(), Expr::type0(), Expr::var(0)),
            Expr::constant("a".into()),
        );
        assert_eq!(ctx.whnf(&e), Expr::constant("a".into()));
    }

    #[test]
    fn test_whnf_unfolds_by_transparency() {
        let e = Expr::constant("Pa".into());
        let expected = Expr::apply(Expr::constant("P".into()), Expr::constant("a".into()));

        let default_ctx = TypeContext::new(env(), TransparencyMode::Default);
        assert_eq!(default_ctx.whnf(&e), expected);

        let none_ctx = TypeContext::new(env(), TransparencyMode::None);
        assert_eq!(none_ctx.whnf(&e), e);

        // Opaque definitions and theorems only open under All
        let hidden = Expr::constant("hidden".into());
        assert_eq!(default_ctx.whnf(&hidden), hidden);
        let all_ctx = TypeContext::new(env(), TransparencyMode::All);
        assert_eq!(all_ctx.whnf(&hidden), Expr::constant("A".into()));
        assert_eq!(
            all_ctx.whnf(&Expr::constant("thm".into())),
            Expr::constant("a".into())
        );
    }

    #[test]
    fn test_whnf_instantiates_metas() {
        let mut mctx = MetaState::new();
        let m = mctx.fresh(Expr::type0());
        mctx.assign(m, Expr::constant("A".into()));
        let mut ctx = TypeContext::new(env(), TransparencyMode::Default);
        ctx.set_mctx(mctx);
        assert_eq!(
            ctx.whnf(&MetaState::meta_const(m)),
            Expr::constant("A".into())
        );
    }

    #[test]
    fn test_head_index() {
        let ctx = TypeContext::new(env(), TransparencyMode::Default);
        // The head of `P a` is P
        let e = Expr::apply(Expr::constant("P".into()), Expr::constant("a".into()));
        assert_eq!(ctx.head_index(&e), Some("P".into()));
        // ... and `Pa` unfolds to it
        assert_eq!(ctx.head_index(&Expr::constant("Pa".into())), Some("P".into()));
        // Binders and values have no constant head
        assert_eq!(ctx.head_index(&Expr::type0()), None);
        assert_eq!(
            ctx.head_index(&Expr::pi("x".into(), Expr::type0(), Expr::var(0))),
            None
        );
    }

    #[test]
    fn test_whnf_computes_builtins() {
        let ctx = TypeContext::new(env(), TransparencyMode::Default);
        let e = Expr::app(vec![
            Expr::value(minerva_kernel::Builtin::IntAdd),
            Expr::int_value(1),
            Expr::int_value(2),
        ]);
        assert_eq!(ctx.whnf(&e), Expr::int_value(3));
    }
}
