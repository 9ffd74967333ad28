//! Hierarchical names
//!
//! Names are `.`-separated paths such as `Int.add`. Prefixes are shared
//! via `Arc`, so cloning a name is cheap and long common prefixes are
//! stored once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A hierarchical name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Name {
    /// The root (empty) name.
    Anonymous,
    /// A string component appended to a prefix.
    Str(Arc<Name>, String),
    /// A numeric component appended to a prefix.
    Num(Arc<Name>, u64),
}

impl Name {
    /// The anonymous name.
    pub fn anon() -> Self {
        Name::Anonymous
    }

    /// Append a string component to a prefix.
    pub fn str(prefix: Name, s: impl Into<String>) -> Self {
        Name::Str(Arc::new(prefix), s.into())
    }

    /// Append a numeric component to a prefix.
    pub fn num(prefix: Name, n: u64) -> Self {
        Name::Num(Arc::new(prefix), n)
    }

    /// Parse a `.`-separated path into a name.
    pub fn from_string(s: &str) -> Self {
        s.split('.')
            .filter(|part| !part.is_empty())
            .fold(Name::Anonymous, |prefix, part| Name::str(prefix, part))
    }

    /// True for the anonymous name.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Name::Anonymous)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Anonymous => write!(f, "[anonymous]"),
            Name::Str(prefix, s) => {
                if prefix.is_anonymous() {
                    write!(f, "{s}")
                } else {
                    write!(f, "{prefix}.{s}")
                }
            }
            Name::Num(prefix, n) => {
                if prefix.is_anonymous() {
                    write!(f, "{n}")
                } else {
                    write!(f, "{prefix}.{n}")
                }
            }
        }
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_roundtrip() {
        let n = Name::from_string("Int.add");
        assert_eq!(n.to_string(), "Int.add");
        assert_eq!(n, Name::str(Name::str(Name::anon(), "Int"), "add"));
    }

    #[test]
    fn test_anonymous() {
        assert!(Name::anon().is_anonymous());
        assert!(!Name::from_string("x").is_anonymous());
        assert_eq!(Name::from_string(""), Name::Anonymous);
    }

    #[test]
    fn test_numeric_component() {
        let n = Name::num(Name::from_string("_mvar"), 3);
        assert_eq!(n.to_string(), "_mvar.3");
    }
}
