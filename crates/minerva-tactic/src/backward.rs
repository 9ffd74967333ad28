//! Backward chaining
//!
//! Goal-driven, depth-bounded, backtracking proof search. Candidate
//! lemmas are looked up by the head symbol of the focused goal's
//! weak-head-normalized target; each successful application pushes a
//! choice point carrying the pre-application state and the candidates
//! not yet tried, so exhausted branches restore the exact state the
//! alternative saw. Goals whose head has no candidates go to a
//! user-supplied leaf tactic. The choice stack is bounded by
//! `back_chaining.max_depth` (default 8); exhausting every choice is the
//! only failure.
//!
//! Trace points (target `back_chaining`) report candidates tried,
//! successes, backtracking, and the depth limit.

use crate::apply::apply;
use crate::state::{Lemma, ProofState, TacticError, TacticResult};
use crate::type_context::{TransparencyMode, TypeContext};
use hashbrown::HashMap;
use minerva_kernel::{Expr, ExprKind, Name};
use tracing::trace;

/// Default choice-stack bound (`back_chaining.max_depth`).
pub const DEFAULT_BACK_CHAINING_MAX_DEPTH: usize = 8;

/// A backward lemma: either an already-materialized term or a lazy
/// constant name resolved against the environment on use.
#[derive(Debug, Clone)]
pub enum BackwardLemma {
    Term(Lemma),
    Const(Name),
}

impl BackwardLemma {
    /// Materialize the lemma under a type context.
    pub fn to_lemma(&self, ctx: &TypeContext) -> Option<Lemma> {
        match self {
            BackwardLemma::Term(lemma) => Some(lemma.clone()),
            BackwardLemma::Const(name) => Lemma::from_const(ctx.env(), name),
        }
    }
}

/// Map from conclusion head symbol to candidate backward lemmas, in
/// insertion order within a head.
#[derive(Debug, Clone, Default)]
pub struct BackwardLemmaIndex {
    map: HashMap<Name, Vec<BackwardLemma>>,
}

impl BackwardLemmaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The head symbol of a lemma type's conclusion: strip the
    /// Π-telescope, then take the constant head of the whnf'd body.
    fn conclusion_head(ctx: &TypeContext, ty: &Expr) -> Option<Name> {
        let mut t = ctx.whnf(ty);
        loop {
            let body = match t.kind() {
                ExprKind::Pi(b) => b.body.clone(),
                _ => break,
            };
            t = ctx.whnf(&body);
        }
        ctx.head_index(&t)
    }

    /// Index a lemma expression. Only constants can be resolved to a
    /// type here; anything else needs [`BackwardLemmaIndex::insert_lemma`].
    /// Returns false when the conclusion has no constant head.
    pub fn insert(&mut self, ctx: &TypeContext, e: &Expr) -> bool {
        let ExprKind::Constant(name) = e.kind() else {
            return false;
        };
        let Some(lemma) = Lemma::from_const(ctx.env(), name) else {
            return false;
        };
        let Some(head) = Self::conclusion_head(ctx, &lemma.ty) else {
            return false;
        };
        self.map
            .entry(head)
            .or_default()
            .push(BackwardLemma::Const(name.clone()));
        true
    }

    /// Index a materialized lemma.
    pub fn insert_lemma(&mut self, ctx: &TypeContext, lemma: Lemma) -> bool {
        let Some(head) = Self::conclusion_head(ctx, &lemma.ty) else {
            return false;
        };
        self.map
            .entry(head)
            .or_default()
            .push(BackwardLemma::Term(lemma));
        true
    }

    /// The candidates for a head symbol, in insertion order.
    pub fn find(&self, head: &Name) -> Vec<BackwardLemma> {
        self.map.get(head).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Search configuration. The fields mirror the engine's inputs:
/// transparency for the type context, instance insertion for `apply`,
/// and the choice-stack bound.
#[derive(Debug, Clone, Copy)]
pub struct BackChainingConfig {
    pub transparency: TransparencyMode,
    pub use_instances: bool,
    pub max_depth: usize,
}

impl Default for BackChainingConfig {
    fn default() -> Self {
        BackChainingConfig {
            transparency: TransparencyMode::default(),
            use_instances: true,
            max_depth: DEFAULT_BACK_CHAINING_MAX_DEPTH,
        }
    }
}

/// A choice point: the state before a lemma was applied and the
/// candidates not yet tried there.
struct Choice {
    state: ProofState,
    lemmas: Vec<BackwardLemma>,
}

/// Driver phases; the loop is a plain state machine.
enum Phase {
    CheckDone,
    TryHead,
    Backtrack,
}

/// The search engine for one `run`.
struct BackChaining<'a> {
    ctx: TypeContext,
    use_instances: bool,
    max_depth: usize,
    leaf_tactic: Box<dyn FnMut(ProofState) -> TacticResult + 'a>,
    lemmas: BackwardLemmaIndex,
    /// The live state, focused on exactly one goal plus whatever
    /// applications added.
    state: ProofState,
    choices: Vec<Choice>,
}

impl<'a> BackChaining<'a> {
    fn run(&mut self) -> bool {
        let mut phase = Phase::CheckDone;
        loop {
            match phase {
                Phase::CheckDone => {
                    if self.state.goals().is_empty() {
                        return true;
                    }
                    if self.choices.len() >= self.max_depth {
                        trace!(target: "back_chaining", "maximum depth reached");
                        phase = Phase::Backtrack;
                    } else {
                        phase = Phase::TryHead;
                    }
                }
                Phase::TryHead => {
                    let progressed = self.try_head();
                    phase = if progressed {
                        Phase::CheckDone
                    } else {
                        Phase::Backtrack
                    };
                }
                Phase::Backtrack => {
                    if self.backtrack() {
                        phase = Phase::CheckDone;
                    } else {
                        return false;
                    }
                }
            }
        }
    }

    /// Resolve the focused goal's head and dispatch to the index or the
    /// leaf tactic.
    fn try_head(&mut self) -> bool {
        let Some(goal) = self.state.get_main_goal_decl().cloned() else {
            return false;
        };
        let target = self.ctx.whnf_in(goal.get_type(), self.state.mctx());
        let candidates = match self.ctx.head_index(&target) {
            Some(head) => self.lemmas.find(&head),
            None => Vec::new(),
        };
        if candidates.is_empty() {
            self.invoke_leaf_tactic()
        } else {
            self.try_lemmas(candidates)
        }
    }

    /// Try candidates in order. A success pushes a choice point with
    /// the pre-application state and the untried remainder, so the
    /// search stays depth-bounded even when a head has a single
    /// self-replicating lemma.
    fn try_lemmas(&mut self, lemmas: Vec<BackwardLemma>) -> bool {
        self.ctx.set_mctx(self.state.mctx().clone());
        for (i, candidate) in lemmas.iter().enumerate() {
            let Some(lemma) = candidate.to_lemma(&self.ctx) else {
                continue;
            };
            trace!(
                target: "back_chaining",
                "[{}] trying lemma {}",
                self.choices.len(),
                lemma.proof
            );
            if let Some(new_state) = apply(
                &mut self.ctx,
                false,
                self.use_instances,
                &lemma,
                &self.state,
            ) {
                trace!(target: "back_chaining", "succeeded");
                let remaining = lemmas[i + 1..].to_vec();
                self.choices.push(Choice {
                    state: self.state.clone(),
                    lemmas: remaining,
                });
                self.state = new_state;
                return true;
            }
        }
        false
    }

    /// Pop choice points until one of them has a lemma that applies.
    fn backtrack(&mut self) -> bool {
        while let Some(choice) = self.choices.pop() {
            trace!(
                target: "back_chaining",
                "[{}] backtracking",
                self.choices.len() + 1
            );
            self.state = choice.state;
            if self.try_lemmas(choice.lemmas) {
                return true;
            }
        }
        false
    }

    /// Focus the main goal alone, run the leaf tactic, and on success
    /// reattach the trailing goals to the returned state.
    fn invoke_leaf_tactic(&mut self) -> bool {
        let Some(goal) = self.state.get_main_goal_decl().cloned() else {
            return false;
        };
        let focused = self.state.with_goals(vec![goal]);
        match (self.leaf_tactic)(focused) {
            Ok(new_state) => {
                let trailing = self.state.goals()[1..].to_vec();
                self.state = new_state.with_goals(trailing);
                true
            }
            Err(_) => false,
        }
    }
}

/// Backward-chaining entry point.
///
/// The engine focuses the head goal of `state`; on success the trailing
/// goals are reattached to the final state. A state without goals is an
/// error, and exhausting every choice yields the fixed
/// [`TacticError::SearchFailed`].
///
/// `index` holds the globally registered backward lemmas;
/// `extra_lemmas` are per-call additions (constants), tried after the
/// global entries for the same head.
pub fn backward_chaining<'a>(
    state: &ProofState,
    config: &BackChainingConfig,
    leaf_tactic: impl FnMut(ProofState) -> TacticResult + 'a,
    index: &BackwardLemmaIndex,
    extra_lemmas: &[Expr],
) -> TacticResult {
    if state.get_main_goal_decl().is_none() {
        return Err(TacticError::NoGoals);
    }

    let ctx = TypeContext::mk_type_context_for(state, config.transparency);
    let mut lemmas = index.clone();
    for extra in extra_lemmas {
        lemmas.insert(&ctx, extra);
    }

    let goals = state.goals().to_vec();
    let mut engine = BackChaining {
        ctx,
        use_instances: config.use_instances,
        max_depth: config.max_depth,
        leaf_tactic: Box::new(leaf_tactic),
        lemmas,
        state: state.with_goals(vec![goals[0].clone()]),
        choices: Vec::new(),
    };

    if engine.run() {
        Ok(engine.state.with_goals(goals[1..].to_vec()))
    } else {
        Err(TacticError::SearchFailed)
    }
}
