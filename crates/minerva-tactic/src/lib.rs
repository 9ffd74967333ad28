//! Minerva tactic layer - proof search
//!
//! Builds on the kernel to provide proof states, lemma application, and
//! depth-bounded backward-chaining search:
//!
//! - Proof states and metavariables (`state.rs`)
//! - Type contexts with transparency-aware whnf (`type_context.rs`)
//! - The `apply` operator (`apply.rs`)
//! - The lemma index and the backward-chaining engine (`backward.rs`)
//!
//! Search order is deterministic: candidates are tried in insertion
//! order within a head bucket, globally registered lemmas before
//! per-call extras, and backtracking is LIFO.

pub mod apply;
pub mod backward;
pub mod state;
pub mod type_context;

pub use apply::apply;
pub use backward::{
    backward_chaining, BackChainingConfig, BackwardLemma, BackwardLemmaIndex,
    DEFAULT_BACK_CHAINING_MAX_DEPTH,
};
pub use state::{
    set_goals, Goal, Lemma, MetaDecl, MetaId, MetaState, ProofState, TacticError, TacticResult,
};
pub use type_context::{TransparencyMode, TypeContext};
