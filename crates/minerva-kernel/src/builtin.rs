//! Built-in values
//!
//! Built-in values are literals and primitive operations embedded in
//! expressions. Each operation carries its computation rule: the
//! normalizer calls [`Builtin::normalize`] on a value-headed application
//! and substitutes the result when the rule fires. An operation applied
//! to arguments that are not yet literals returns `None` and the
//! application is kept in normal form unchanged.

use crate::expr::{Expr, ExprKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A built-in value: a literal or a primitive operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// The type of booleans (distinguished: it lives below every universe)
    BoolType,
    /// The type of integers
    IntType,
    /// Integer addition
    IntAdd,
    /// Integer multiplication
    IntMul,
    /// Integer comparison `<=`, producing a boolean
    IntLe,
    /// Boolean negation
    BoolNot,
}

impl Builtin {
    /// Display name of the value.
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Bool(true) => "true",
            Builtin::Bool(false) => "false",
            Builtin::Int(_) => "int",
            Builtin::BoolType => "Bool",
            Builtin::IntType => "Int",
            Builtin::IntAdd => "Int.add",
            Builtin::IntMul => "Int.mul",
            Builtin::IntLe => "Int.le",
            Builtin::BoolNot => "Bool.not",
        }
    }

    /// Apply the computation rule of this value to an application.
    ///
    /// `args` is the whole (already normalized) application, with
    /// `args[0]` the operator itself. Returns the contractum when the
    /// rule fires.
    pub fn normalize(&self, args: &[Expr]) -> Option<Expr> {
        match self {
            Builtin::IntAdd => {
                let (a, b) = two_int_args(args)?;
                Some(Expr::int_value(a.wrapping_add(b)))
            }
            Builtin::IntMul => {
                let (a, b) = two_int_args(args)?;
                Some(Expr::int_value(a.wrapping_mul(b)))
            }
            Builtin::IntLe => {
                let (a, b) = two_int_args(args)?;
                Some(Expr::bool_value(a <= b))
            }
            Builtin::BoolNot => {
                if args.len() != 2 {
                    return None;
                }
                match args[1].kind() {
                    ExprKind::Value(Builtin::Bool(b)) => Some(Expr::bool_value(!b)),
                    _ => None,
                }
            }
            // Literals and types have no computation rule
            _ => None,
        }
    }
}

fn two_int_args(args: &[Expr]) -> Option<(i64, i64)> {
    if args.len() != 3 {
        return None;
    }
    match (args[1].kind(), args[2].kind()) {
        (ExprKind::Value(Builtin::Int(a)), ExprKind::Value(Builtin::Int(b))) => Some((*a, *b)),
        _ => None,
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builtin::Int(n) => write!(f, "{n}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}
