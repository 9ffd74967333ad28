//! Universe levels
//!
//! Universe levels form a well-founded partial order used to stratify
//! types. The structural order implemented here is conservative: it only
//! answers `true` when `l1 >= l2` holds for every valuation of the
//! universe parameters. The environment refines the order with declared
//! constraints between parameters (see `Environment::is_ge`).

use crate::name::Name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Universe level
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Zero (the lowest level)
    Zero,
    /// Successor: l + 1
    Succ(Arc<Level>),
    /// Maximum: max(l1, l2)
    Max(Arc<Level>, Arc<Level>),
    /// Universe parameter declared in the environment
    Param(Name),
}

impl Level {
    /// Create zero level
    pub fn zero() -> Self {
        Level::Zero
    }

    /// Create successor level
    pub fn succ(l: Level) -> Self {
        Level::Succ(Arc::new(l))
    }

    /// A concrete level `succ^n(0)`
    pub fn of(n: u32) -> Self {
        let mut l = Level::Zero;
        for _ in 0..n {
            l = Level::succ(l);
        }
        l
    }

    /// Create max level, simplifying if possible
    pub fn max(l1: Level, l2: Level) -> Self {
        // max(l, l) = l, max(0, l) = l, max(l, 0) = l
        if l1 == l2 || l2.is_zero() {
            return l1;
        }
        if l1.is_zero() {
            return l2;
        }
        // Collapse when one side already dominates
        if Level::is_geq(&l1, &l2) {
            return l1;
        }
        if Level::is_geq(&l2, &l1) {
            return l2;
        }
        Level::Max(Arc::new(l1), Arc::new(l2))
    }

    /// Create parameter level
    pub fn param(name: Name) -> Self {
        Level::Param(name)
    }

    /// Check if this is definitely zero
    pub fn is_zero(&self) -> bool {
        match self {
            Level::Zero => true,
            Level::Succ(_) | Level::Param(_) => false,
            Level::Max(l1, l2) => l1.is_zero() && l2.is_zero(),
        }
    }

    /// Get the base level and offset (number of `Succ` applications),
    /// e.g. `succ(succ(u))` => `(u, 2)`
    pub fn get_offset(&self) -> (&Level, u32) {
        match self {
            Level::Succ(inner) => {
                let (base, offset) = inner.get_offset();
                (base, offset + 1)
            }
            _ => (self, 0),
        }
    }

    /// Check if `l1 >= l2` structurally.
    ///
    /// This is a conservative approximation: `true` only when the order
    /// holds for every assignment of the parameters.
    pub fn is_geq(l1: &Level, l2: &Level) -> bool {
        if l1 == l2 || l2.is_zero() {
            return true;
        }

        let (base1, offset1) = l1.get_offset();
        let (base2, offset2) = l2.get_offset();

        if base1 == base2 {
            return offset1 >= offset2;
        }

        // Any parameter is >= 0, so succ^k1(X) >= succ^k2(0) when k1 >= k2.
        if base2.is_zero() && offset1 >= offset2 {
            return true;
        }

        // succ^k(l1') >= l2 when l1' >= l2
        if offset1 > 0 {
            if let Level::Succ(inner) = l1 {
                if Level::is_geq(inner, l2) {
                    return true;
                }
            }
        }

        // max(a, b) >= l if a >= l or b >= l
        if let Level::Max(a, b) = l1 {
            if Level::is_geq(a, l2) || Level::is_geq(b, l2) {
                return true;
            }
        }

        // l >= max(a, b) if l >= a and l >= b
        if let Level::Max(a, b) = l2 {
            if Level::is_geq(l1, a) && Level::is_geq(l1, b) {
                return true;
            }
        }

        false
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Zero
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (base, offset) = self.get_offset();
        match base {
            Level::Zero => write!(f, "{offset}"),
            Level::Param(n) => {
                if offset == 0 {
                    write!(f, "{n}")
                } else {
                    write!(f, "{n}+{offset}")
                }
            }
            Level::Max(a, b) => {
                if offset == 0 {
                    write!(f, "(max {a} {b})")
                } else {
                    write!(f, "(max {a} {b})+{offset}")
                }
            }
            Level::Succ(_) => unreachable!("get_offset strips all successors"),
        }
    }
}
