//! Guards over the scope stack.
//!
//! Each open operation returns a guard that mutably borrows its parent, so
//! a parent cannot be touched while a child is live. Dropping a guard
//! without `close` abandons its frame; dropping an unclosed [`Assignment`]
//! discards the statement, deletes its spooled files and frees the
//! session.

use rbridge_types::{Matrix, Scalar, ValueType, Variable};

use super::stack::{Closed, FunctionSpec, ScopeId, ScopeKind, ScopeStack};
use crate::error::{BridgeResult, StateError};
use crate::literal;
use crate::session::{BusyGuard, EngineSession};

/// The session and the statement being built for it.
struct Builder<'s> {
    session: &'s EngineSession,
    stack: ScopeStack,
}

impl Builder<'_> {
    fn open(&mut self, kind: ScopeKind) -> BridgeResult<ScopeId> {
        Ok(self.stack.open(kind)?)
    }

    fn close(&mut self, id: ScopeId) -> BridgeResult<Option<ValueType>> {
        match self.stack.close(id)? {
            Closed::Nested(ty) => Ok(ty),
            Closed::Statement(_) => Err(StateError::NoParent("nested scope").into()),
        }
    }

    fn value(&mut self, text: &str, ty: ValueType) -> BridgeResult<()> {
        Ok(self.stack.write_value(text, ty)?)
    }

    fn literal(&mut self, value: Scalar) -> BridgeResult<()> {
        self.value(&literal::encode_scalar(&value), value.value_type())
    }

    fn matrix(&mut self, matrix: &Matrix, as_vector: bool) -> BridgeResult<()> {
        let lit = self.session.matrix_literal(matrix, as_vector)?;
        if let Some(path) = lit.spooled {
            self.stack.register_pending(path)?;
        }
        let ty = if as_vector {
            ValueType::Vector
        } else {
            ValueType::Matrix
        };
        self.value(&lit.text, ty)
    }

    fn variable(&mut self, name: &str) -> BridgeResult<ValueType> {
        let ty = self.session.lookup(name)?;
        self.value(name, ty)?;
        Ok(ty)
    }
}

/// Leaf and nesting operations shared by value-holding scopes.
macro_rules! value_scope {
    ($guard:ident) => {
        impl<'s> $guard<'_, 's> {
            /// Write a scalar literal.
            pub fn literal(&mut self, value: impl Into<Scalar>) -> BridgeResult<()> {
                self.builder.literal(value.into())
            }

            /// Write a matrix literal, spooled when large.
            pub fn matrix(&mut self, matrix: &Matrix) -> BridgeResult<()> {
                self.builder.matrix(matrix, false)
            }

            /// Write a one-row or one-column matrix as a bare vector.
            pub fn vector(&mut self, vector: &Matrix) -> BridgeResult<()> {
                self.builder.matrix(vector, true)
            }

            /// Reference a bound variable; its kind becomes this scope's.
            pub fn variable(&mut self, name: &str) -> BridgeResult<ValueType> {
                self.builder.variable(name)
            }

            /// Write engine syntax the builder doesn't model, with its kind.
            pub fn raw(&mut self, text: &str, ty: ValueType) -> BridgeResult<()> {
                self.builder.value(text, ty)
            }

            /// Open a function call as this scope's value.
            pub fn function(&mut self, spec: impl Into<FunctionSpec>) -> BridgeResult<Function<'_, 's>> {
                let id = self.builder.open(ScopeKind::Function(spec.into()))?;
                Ok(Function {
                    builder: &mut *self.builder,
                    id,
                    closed: false,
                })
            }

            /// Open a parenthesised sub-expression as this scope's value.
            pub fn expression(&mut self) -> BridgeResult<Expression<'_, 's>> {
                let id = self.builder.open(ScopeKind::Expression)?;
                Ok(Expression {
                    builder: &mut *self.builder,
                    id,
                    closed: false,
                })
            }

            /// Kind inferred so far.
            pub fn inferred(&self) -> Option<ValueType> {
                self.builder.stack.inferred(self.id)
            }

            /// Close the scope, returning its inferred kind.
            pub fn close(mut self) -> BridgeResult<Option<ValueType>> {
                let ty = self.builder.close(self.id)?;
                self.closed = true;
                Ok(ty)
            }
        }

        impl Drop for $guard<'_, '_> {
            fn drop(&mut self) {
                if !self.closed {
                    self.builder.stack.abandon(self.id);
                }
            }
        }
    };
}

/// A top-level binding of one variable, sent and fenced on `close`.
pub struct Assignment<'s> {
    builder: Builder<'s>,
    id: ScopeId,
    target: String,
    closed: bool,
    // Released after the statement is committed or abandoned
    _busy: BusyGuard<'s>,
}

impl<'s> Assignment<'s> {
    pub(crate) fn open(session: &'s EngineSession, target: &str, busy: BusyGuard<'s>) -> BridgeResult<Self> {
        let mut builder = Builder {
            session,
            stack: ScopeStack::new(),
        };
        let id = builder.open(ScopeKind::Assignment {
            target: target.to_string(),
        })?;
        tracing::trace!(name = target, "assignment opened");
        Ok(Self {
            builder,
            id,
            target: target.to_string(),
            closed: false,
            _busy: busy,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Statement text buffered so far.
    pub fn text(&self) -> &str {
        self.builder.stack.text()
    }

    /// Open the right-hand side. An assignment has exactly one.
    pub fn expression(&mut self) -> BridgeResult<Expression<'_, 's>> {
        let id = self.builder.open(ScopeKind::Expression)?;
        Ok(Expression {
            builder: &mut self.builder,
            id,
            closed: false,
        })
    }

    /// Send the statement, wait for the fence, and record the binding.
    pub fn close(mut self) -> BridgeResult<Variable> {
        let statement = match self.builder.stack.close(self.id)? {
            Closed::Statement(statement) => statement,
            Closed::Nested(_) => return Err(StateError::MissingValue(self.target.clone()).into()),
        };
        self.closed = true;
        self.builder.session.commit(statement)
    }
}

impl Drop for Assignment<'_> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(name = %self.target, "assignment dropped unclosed, discarding");
            self.builder.stack.abandon(self.id);
        }
    }
}

impl std::fmt::Debug for Assignment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assignment")
            .field("target", &self.target)
            .field("text", &self.text())
            .finish()
    }
}

/// A parenthesised value: one literal, variable, or nested scope.
pub struct Expression<'a, 's> {
    builder: &'a mut Builder<'s>,
    id: ScopeId,
    closed: bool,
}

value_scope!(Expression);

impl std::fmt::Debug for Expression<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression").field("id", &self.id).finish()
    }
}

/// A function call collecting parameters.
pub struct Function<'a, 's> {
    builder: &'a mut Builder<'s>,
    id: ScopeId,
    closed: bool,
}

impl std::fmt::Debug for Function<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function").field("id", &self.id).finish()
    }
}

impl<'s> Function<'_, 's> {
    /// Open the next argument.
    pub fn parameter(&mut self) -> BridgeResult<Parameter<'_, 's>> {
        let id = self.builder.open(ScopeKind::Parameter)?;
        Ok(Parameter {
            builder: &mut *self.builder,
            id,
            closed: false,
        })
    }

    /// Open a parameter holding a single literal and close it.
    pub fn literal_arg(&mut self, value: impl Into<Scalar>) -> BridgeResult<()> {
        let mut p = self.parameter()?;
        p.literal(value)?;
        p.close().map(|_| ())
    }

    /// Open a parameter referencing a variable and close it.
    pub fn variable_arg(&mut self, name: &str) -> BridgeResult<()> {
        let mut p = self.parameter()?;
        p.variable(name)?;
        p.close().map(|_| ())
    }

    pub fn inferred(&self) -> Option<ValueType> {
        self.builder.stack.inferred(self.id)
    }

    /// Close the call, returning its inferred kind.
    pub fn close(mut self) -> BridgeResult<Option<ValueType>> {
        let ty = self.builder.close(self.id)?;
        self.closed = true;
        Ok(ty)
    }
}

impl Drop for Function<'_, '_> {
    fn drop(&mut self) {
        if !self.closed {
            self.builder.stack.abandon(self.id);
        }
    }
}

/// One function argument.
pub struct Parameter<'a, 's> {
    builder: &'a mut Builder<'s>,
    id: ScopeId,
    closed: bool,
}

value_scope!(Parameter);
