//! Scope-based statement building.
//!
//! An assignment is built as a tree of scopes opened and closed in strict
//! nesting order:
//!
//! ```text
//! session.assign("y")            y<-
//!   .expression()                  (
//!     .function(MatMul)              (
//!       .parameter().variable("a")     a
//!       .parameter().variable("b")     %*%b
//!     close                          )
//!   close                          )
//! close                          ;   then exists("y") fence
//! ```
//!
//! `stack` holds the state machine; `builder` wraps it in guards that
//! borrow the session and roll back on drop.

mod builder;
mod stack;

pub use builder::{Assignment, Expression, Function, Parameter};
pub use stack::{Closed, FunctionSpec, ResultRule, ScopeId, ScopeKind, ScopeStack, Statement};

use rbridge_types::ValueType;

/// Engine functions with known call syntax and result kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedFunction {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// Matrix product, `%*%`.
    MatMul,
    Transpose,
    Inverse,
    Determinant,
    Sum,
    Mean,
    Length,
}

impl NamedFunction {
    pub fn spec(self) -> FunctionSpec {
        use NamedFunction::*;
        match self {
            Add => FunctionSpec::infix("+"),
            Subtract => FunctionSpec::infix("-"),
            Multiply => FunctionSpec::infix("*"),
            Divide => FunctionSpec::infix("/"),
            MatMul => FunctionSpec::infix("%*%").returning(ValueType::Matrix),
            Transpose => FunctionSpec::call("t").returning(ValueType::Matrix),
            Inverse => FunctionSpec::call("solve").returning(ValueType::Matrix),
            Determinant => FunctionSpec::call("det").returning(ValueType::Double),
            Sum => FunctionSpec::call("sum").returning(ValueType::Double),
            Mean => FunctionSpec::call("mean").returning(ValueType::Double),
            Length => FunctionSpec::call("length").returning(ValueType::Long),
        }
    }

    /// Look a function up by its engine spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        use NamedFunction::*;
        Some(match name {
            "+" => Add,
            "-" => Subtract,
            "*" => Multiply,
            "/" => Divide,
            "%*%" => MatMul,
            "t" => Transpose,
            "solve" => Inverse,
            "det" => Determinant,
            "sum" => Sum,
            "mean" => Mean,
            "length" => Length,
            _ => return None,
        })
    }
}

impl From<NamedFunction> for FunctionSpec {
    fn from(f: NamedFunction) -> Self {
        f.spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_results() {
        assert_eq!(
            NamedFunction::Determinant.spec().result(),
            ResultRule::Fixed(ValueType::Double)
        );
        assert_eq!(
            NamedFunction::Transpose.spec().result(),
            ResultRule::Fixed(ValueType::Matrix)
        );
        assert_eq!(NamedFunction::Add.spec().result(), ResultRule::Widest);
    }

    #[test]
    fn names_resolve() {
        for f in [
            NamedFunction::Add,
            NamedFunction::MatMul,
            NamedFunction::Inverse,
            NamedFunction::Length,
        ] {
            assert_eq!(NamedFunction::from_name(f.spec().label()), Some(f));
        }
        assert_eq!(NamedFunction::from_name("print"), None);
    }
}
