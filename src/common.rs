//! Common definitions that are shared between different parts of the compiler
//! and the virtual machine.

use derive_more::Display;

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers.
pub type Id = internment::Intern<String>;

/// Name of the pseudo-function that owns the global scope.
pub const GLOBAL_SCOPE: &str = "global";

/// Intern a name.
pub fn intern(name: &str) -> Id {
    Id::new(name.to_string())
}

/// The interned identifier of the global scope.
pub fn global_scope() -> Id {
    intern(GLOBAL_SCOPE)
}

/// The value types of the language.  `Str` only ever appears as a constant
/// operand of `print`; it cannot be stored in a variable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Type {
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("string")]
    Str,
}

/// A runtime value.  Memory cells are dynamically typed: the compiler does
/// not reject storing a `float` result into an `int` destination, so the
/// declared type of an address says nothing definitive about what it holds.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// The language type this value belongs to.
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::Str,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) => None,
        }
    }

    /// Whether the value compares equal to zero.  `GOTOF` branches on this.
    pub fn is_zero(&self) -> Option<bool> {
        match self {
            Value::Int(i) => Some(*i == 0),
            Value::Float(f) => Some(*f == 0.0),
            Value::Str(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            // Integral floats keep their fractional point: 5.0 prints as
            // "5.0", not "5".
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_display_keeps_point() {
        assert_eq!(Value::Float(5.0).to_string(), "5.0");
        assert_eq!(Value::Float(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Str("Hola".into()).to_string(), "Hola");
    }

    #[test]
    fn zero_check() {
        assert_eq!(Value::Int(0).is_zero(), Some(true));
        assert_eq!(Value::Float(0.0).is_zero(), Some(true));
        assert_eq!(Value::Int(3).is_zero(), Some(false));
        assert_eq!(Value::Str("0".into()).is_zero(), None);
    }
}
