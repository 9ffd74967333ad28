//! Proof states and metavariables
//!
//! A proof state carries an ordered list of goals, each a metavariable
//! with a target type, plus the metavariable context recording types and
//! assignments. States are cheap to clone: the backward-chaining engine
//! snapshots them at every choice point.
//!
//! Metavariables occur inside expressions as constants with a reserved
//! name (`_mvar.<n>`). The kernel leaves them untouched (they resolve to
//! no environment object), so the expression model needs no extra
//! variant.

use hashbrown::HashMap;
use minerva_kernel::{Environment, Expr, ExprKind, Name};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for metavariables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaId(pub u64);

/// A metavariable declaration: its type and, once solved, its value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaDecl {
    pub ty: Expr,
    pub assignment: Option<Expr>,
}

/// The metavariable context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaState {
    metas: HashMap<MetaId, MetaDecl>,
    next_id: u64,
}

impl MetaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh metavariable with the given type.
    pub fn fresh(&mut self, ty: Expr) -> MetaId {
        let id = MetaId(self.next_id);
        self.next_id += 1;
        self.metas.insert(
            id,
            MetaDecl {
                ty,
                assignment: None,
            },
        );
        id
    }

    /// The expression form of a metavariable: a reserved-name constant.
    pub fn meta_const(id: MetaId) -> Expr {
        Expr::constant(Name::num(Name::from_string("_mvar"), id.0))
    }

    /// Decode a metavariable from its reserved-name constant.
    pub fn as_meta(e: &Expr) -> Option<MetaId> {
        let ExprKind::Constant(name) = e.kind() else {
            return None;
        };
        let Name::Num(prefix, n) = name else {
            return None;
        };
        match &**prefix {
            Name::Str(root, s) if root.is_anonymous() && s == "_mvar" => Some(MetaId(*n)),
            _ => None,
        }
    }

    pub fn get(&self, id: MetaId) -> Option<&MetaDecl> {
        self.metas.get(&id)
    }

    /// The declared type of a metavariable.
    pub fn decl_type(&self, id: MetaId) -> Option<&Expr> {
        self.metas.get(&id).map(|m| &m.ty)
    }

    /// Assign a value to an unassigned metavariable.
    pub fn assign(&mut self, id: MetaId, val: Expr) -> bool {
        if let Some(meta) = self.metas.get_mut(&id) {
            if meta.assignment.is_none() {
                meta.assignment = Some(val);
                return true;
            }
        }
        false
    }

    pub fn is_assigned(&self, id: MetaId) -> bool {
        self.metas
            .get(&id)
            .is_some_and(|m| m.assignment.is_some())
    }

    pub fn get_assignment(&self, id: MetaId) -> Option<&Expr> {
        self.metas.get(&id).and_then(|m| m.assignment.as_ref())
    }

    /// Replace assigned metavariables in an expression, recursively.
    pub fn instantiate(&self, e: &Expr) -> Expr {
        match e.kind() {
            ExprKind::Constant(_) => {
                if let Some(id) = Self::as_meta(e) {
                    if let Some(val) = self.get_assignment(id) {
                        return self.instantiate(val);
                    }
                }
                e.clone()
            }
            ExprKind::Var(_) | ExprKind::Type(_) | ExprKind::Value(_) => e.clone(),
            ExprKind::App(args) => {
                Expr::app(args.iter().map(|a| self.instantiate(a)).collect())
            }
            ExprKind::Eq(lhs, rhs) => Expr::eq(self.instantiate(lhs), self.instantiate(rhs)),
            ExprKind::Lambda(b) => Expr::lambda(
                b.name.clone(),
                self.instantiate(&b.domain),
                self.instantiate(&b.body),
            ),
            ExprKind::Pi(b) => Expr::pi(
                b.name.clone(),
                self.instantiate(&b.domain),
                self.instantiate(&b.body),
            ),
            ExprKind::Let { name, value, body } => Expr::let_(
                name.clone(),
                self.instantiate(value),
                self.instantiate(body),
            ),
        }
    }

    /// True when `id` occurs (through assignments) in `e`.
    pub fn occurs(&self, id: MetaId, e: &Expr) -> bool {
        let e = self.instantiate(e);
        self.occurs_core(id, &e)
    }

    fn occurs_core(&self, id: MetaId, e: &Expr) -> bool {
        if Self::as_meta(e) == Some(id) {
            return true;
        }
        match e.kind() {
            ExprKind::App(args) => args.iter().any(|a| self.occurs_core(id, a)),
            ExprKind::Eq(lhs, rhs) => self.occurs_core(id, lhs) || self.occurs_core(id, rhs),
            ExprKind::Lambda(b) | ExprKind::Pi(b) => {
                self.occurs_core(id, &b.domain) || self.occurs_core(id, &b.body)
            }
            ExprKind::Let { value, body, .. } => {
                self.occurs_core(id, value) || self.occurs_core(id, body)
            }
            _ => false,
        }
    }
}

/// A goal: a metavariable together with its target type.
#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: MetaId,
    pub target: Expr,
}

impl Goal {
    /// The goal's target type.
    pub fn get_type(&self) -> &Expr {
        &self.target
    }
}

/// A lemma: a proof term paired with its type. Type inference is out of
/// scope here, so the pair is explicit; constants resolve their declared
/// type from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Lemma {
    pub proof: Expr,
    pub ty: Expr,
}

impl Lemma {
    pub fn new(proof: Expr, ty: Expr) -> Self {
        Lemma { proof, ty }
    }

    /// Resolve a declared constant into a lemma.
    pub fn from_const(env: &Environment, name: &Name) -> Option<Lemma> {
        let obj = env.get_object(name)?;
        Some(Lemma {
            proof: Expr::constant(name.clone()),
            ty: obj.type_.clone(),
        })
    }
}

/// Tactic failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TacticError {
    #[error("tactic failed: there are no goals to be proved")]
    NoGoals,
    #[error("back_chaining failed, enable the 'back_chaining' trace target to obtain more details")]
    SearchFailed,
    #[error("leaf tactic failed")]
    LeafFailed,
    #[error("{0}")]
    Other(String),
}

/// The usual tactic result: a new proof state or a failure.
pub type TacticResult = Result<ProofState, TacticError>;

/// A proof state: goals, metavariable context, and the environment they
/// live in.
#[derive(Debug, Clone)]
pub struct ProofState {
    pub env: Arc<Environment>,
    pub goals: Vec<Goal>,
    pub metas: MetaState,
    /// Lemmas registered as instances; `apply` may close subgoals with
    /// them when instance insertion is enabled.
    pub instances: Vec<Lemma>,
}

impl ProofState {
    /// An empty state over the given environment.
    pub fn new(env: Arc<Environment>) -> Self {
        ProofState {
            env,
            goals: Vec::new(),
            metas: MetaState::new(),
            instances: Vec::new(),
        }
    }

    /// A state with a single goal for `target`.
    pub fn with_main_goal(env: Arc<Environment>, target: Expr) -> Self {
        let mut state = Self::new(env);
        state.add_goal(target);
        state
    }

    /// Append a new goal, returning its metavariable.
    pub fn add_goal(&mut self, target: Expr) -> MetaId {
        let id = self.metas.fresh(target.clone());
        self.goals.push(Goal { id, target });
        id
    }

    /// The ordered goal list.
    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// The focused (first) goal, when there is one.
    pub fn get_main_goal_decl(&self) -> Option<&Goal> {
        self.goals.first()
    }

    /// The metavariable context.
    pub fn mctx(&self) -> &MetaState {
        &self.metas
    }

    /// This state with a different goal list.
    pub fn with_goals(&self, goals: Vec<Goal>) -> ProofState {
        ProofState {
            env: Arc::clone(&self.env),
            goals,
            metas: self.metas.clone(),
            instances: self.instances.clone(),
        }
    }

    /// Register an instance lemma.
    pub fn register_instance(&mut self, lemma: Lemma) {
        self.instances.push(lemma);
    }

    /// The proof term of a solved goal, with metavariables resolved.
    pub fn proof_of(&self, id: MetaId) -> Option<Expr> {
        self.metas.get_assignment(id).map(|e| self.metas.instantiate(e))
    }
}

/// Replace a state's goal list, keeping its metavariable context.
pub fn set_goals(state: &ProofState, goals: Vec<Goal>) -> ProofState {
    state.with_goals(goals)
}

impl fmt::Display for ProofState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.goals.is_empty() {
            return write!(f, "no goals");
        }
        for (i, goal) in self.goals.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "|- {}", self.metas.instantiate(&goal.target))?;
        }
        Ok(())
    }
}
