//! Minerva kernel - trusted reduction core
//!
//! This crate implements the semantic heart of the prover: reduction of
//! dependently-typed expressions to canonical form, and convertibility
//! (definitional equality modulo β-reduction, δ-unfolding, universe
//! cumulativity, and built-in value computation).
//!
//! # Architecture
//!
//! - Expression representation (`expr.rs`)
//! - Universe levels (`level.rs`)
//! - Environment with declared objects and universes (`env.rs`)
//! - Typing context (`context.rs`)
//! - Scoped memoization cache (`cache.rs`)
//! - Normalizer and convertibility (`normalize.rs`)
//! - Built-in values with computation rules (`builtin.rs`)
//!
//! # Performance
//!
//! Expressions are shared `Arc` nodes carrying precomputed structural
//! hashes; the normalizer memoizes shared subterms and postpones work
//! with closures, so repeated substructure is reduced once.

pub mod builtin;
pub mod cache;
pub mod context;
pub mod env;
pub mod expr;
pub mod level;
pub mod name;
pub mod normalize;

pub use builtin::Builtin;
pub use context::{Context, ContextEntry};
pub use env::{EnvError, Environment, Object, ObjectKind};
pub use expr::{Binder, Expr, ExprKind};
pub use level::Level;
pub use name::Name;
pub use normalize::{
    is_convertible, normalize, Normalizer, NormalizerError, SValue, ValueStack, DEFAULT_MAX_DEPTH,
};
