//! Lemma application
//!
//! `apply` tries to close the focused goal with a lemma: the lemma
//! type's Π-telescope is stripped into fresh metavariables, the
//! conclusion is unified against the goal target, and the premises left
//! open become subgoals in telescope order, prepended to the remaining
//! goals. A failed application leaves no trace: the caller's state is
//! untouched and `None` is returned.

use crate::state::{Goal, Lemma, MetaId, MetaState, ProofState};
use crate::type_context::TypeContext;
use minerva_kernel::{Expr, ExprKind};

/// Apply `lemma` to the main goal of `state`.
///
/// With `all_args` every telescope premise becomes a subgoal even when
/// unification solved it; otherwise only the unsolved ones do. With
/// `use_instances` the state's registered instance lemmas may close
/// remaining subgoals outright.
pub fn apply(
    ctx: &mut TypeContext,
    all_args: bool,
    use_instances: bool,
    lemma: &Lemma,
    state: &ProofState,
) -> Option<ProofState> {
    let goal = state.get_main_goal_decl()?.clone();
    if state.metas.is_assigned(goal.id) {
        return None;
    }
    let mut new_state = state.clone();

    // Strip the Π-telescope, one fresh metavariable per premise.
    let mut premises: Vec<MetaId> = Vec::new();
    let mut concl = lemma.ty.clone();
    loop {
        concl = ctx.whnf_in(&concl, &new_state.metas);
        let next = match concl.kind() {
            ExprKind::Pi(b) => {
                let m = new_state.metas.fresh(b.domain.clone());
                premises.push(m);
                b.body.instantiate(&MetaState::meta_const(m))
            }
            _ => break,
        };
        concl = next;
    }

    let target = ctx.whnf_in(&goal.target, &new_state.metas);
    if !unify(ctx, &mut new_state.metas, &concl, &target) {
        return None;
    }

    // The goal is solved by the lemma applied to its premises.
    let proof = if premises.is_empty() {
        lemma.proof.clone()
    } else {
        let mut args = Vec::with_capacity(premises.len() + 1);
        args.push(lemma.proof.clone());
        args.extend(premises.iter().map(|m| MetaState::meta_const(*m)));
        Expr::app(args)
    };
    if !new_state.metas.assign(goal.id, proof) {
        return None;
    }

    // Unsolved premises become subgoals, in telescope order.
    let mut subgoals: Vec<Goal> = Vec::new();
    for m in &premises {
        if all_args || !new_state.metas.is_assigned(*m) {
            let target = match new_state.metas.decl_type(*m) {
                Some(ty) => new_state.metas.instantiate(ty),
                None => continue,
            };
            subgoals.push(Goal { id: *m, target });
        }
    }

    if use_instances {
        let instances = new_state.instances.clone();
        subgoals.retain(|subgoal| !close_by_instance(ctx, &mut new_state.metas, subgoal, &instances));
    }

    subgoals.extend(state.goals()[1..].iter().cloned());
    new_state.goals = subgoals;
    Some(new_state)
}

/// Close a subgoal with a registered instance lemma whose type is
/// exactly convertible with the subgoal target. Matching never assigns
/// anything except the closed subgoal's own metavariable: a target
/// still mentioning open metavariables simply fails the check and the
/// subgoal stays.
fn close_by_instance(
    ctx: &TypeContext,
    metas: &mut MetaState,
    subgoal: &Goal,
    instances: &[Lemma],
) -> bool {
    if metas.is_assigned(subgoal.id) {
        return true;
    }
    let target = metas.instantiate(&subgoal.target);
    for instance in instances {
        let inst_ty = metas.instantiate(&instance.ty);
        if ctx.is_convertible(&target, &inst_ty)
            && metas.assign(subgoal.id, instance.proof.clone())
        {
            return true;
        }
    }
    false
}

/// First-order unification: metavariables are holes, structure must
/// match, and the kernel's convertibility is the residual check for
/// heads the structural walk cannot relate.
fn unify(ctx: &TypeContext, metas: &mut MetaState, lhs: &Expr, rhs: &Expr) -> bool {
    let l = ctx.whnf_in(lhs, metas);
    let r = ctx.whnf_in(rhs, metas);
    if l == r {
        return true;
    }
    // After whnf an assigned metavariable is gone, so a surviving one is
    // a hole.
    if let Some(m) = MetaState::as_meta(&l) {
        return assign_checked(metas, m, &r);
    }
    if let Some(m) = MetaState::as_meta(&r) {
        return assign_checked(metas, m, &l);
    }
    match (l.kind(), r.kind()) {
        (ExprKind::App(xs), ExprKind::App(ys)) if xs.len() == ys.len() => xs
            .iter()
            .zip(ys.iter())
            .all(|(x, y)| unify(ctx, metas, x, y)),
        (ExprKind::Eq(l1, r1), ExprKind::Eq(l2, r2)) => {
            unify(ctx, metas, l1, l2) && unify(ctx, metas, r1, r2)
        }
        (ExprKind::Lambda(a), ExprKind::Lambda(b)) | (ExprKind::Pi(a), ExprKind::Pi(b)) => {
            unify(ctx, metas, &a.domain, &b.domain) && unify(ctx, metas, &a.body, &b.body)
        }
        (ExprKind::Type(u), ExprKind::Type(v)) => {
            ctx.env().is_ge(u, v) && ctx.env().is_ge(v, u)
        }
        // Bound variables only match themselves
        (ExprKind::Var(i), ExprKind::Var(j)) => i == j,
        (ExprKind::Var(_), _) | (_, ExprKind::Var(_)) => false,
        (ExprKind::Value(a), ExprKind::Value(b)) => a == b,
        _ => ctx.is_convertible(&l, &r),
    }
}

fn assign_checked(metas: &mut MetaState, m: MetaId, val: &Expr) -> bool {
    if metas.occurs(m, val) {
        return false;
    }
    metas.assign(m, val.clone())
}
