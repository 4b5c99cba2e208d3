//! Error types for the bridge.
//!
//! Four failure families surface to callers:
//!
//! - **Unavailable**: no engine executable passed the capability probe.
//! - **Io**: a pipe read or write failed; the session is unusable afterwards.
//! - **State**: the caller broke the scope protocol or asked for the wrong
//!   kind of value. Raised before anything is written to the engine.
//! - **Cleanup / Shutdown**: several independent teardown steps failed; every
//!   failure is collected rather than the first one hiding the rest.

use std::fmt;
use std::io;
use std::path::PathBuf;

use rbridge_types::{ShapeError, ValueType};
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge operation errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine i/o failed while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("protocol state: {0}")]
    State(#[from] StateError),
    #[error("variable not bound: {0}")]
    NotBound(String),
    #[error("invalid variable name: {0:?}")]
    InvalidName(String),
    #[error("malformed engine reply {line:?}: {reason}")]
    Decode { line: String, reason: String },
    #[error("engine did not bind {0}")]
    Rejected(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Cleanup(#[from] CleanupError),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error("engine session already closed")]
    Closed,
}

impl BridgeError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        BridgeError::Io { context, source }
    }

    pub fn decode(line: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Decode {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// True for caller mistakes that were caught before touching the engine.
    pub fn is_state_failure(&self) -> bool {
        matches!(self, BridgeError::State(_))
    }

    /// True when the pipe is gone and the session cannot be used again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Io { .. } | BridgeError::Closed)
    }
}

/// Scope protocol violations and type-mismatched queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("another assignment or engine call is in progress")]
    Busy,
    #[error("cannot open {child} under {parent}: {reason}")]
    IllegalNesting {
        parent: &'static str,
        child: &'static str,
        reason: &'static str,
    },
    #[error("cannot open {0} without an enclosing scope")]
    NoParent(&'static str),
    #[error("cannot close {0} while a child scope is open")]
    ChildStillOpen(&'static str),
    #[error("{function} needs at least {min} parameters")]
    TooFewParameters { function: String, min: usize },
    #[error("scope {0} is already closed")]
    AlreadyClosed(usize),
    #[error("{0} already holds a value")]
    ValueAlreadySet(&'static str),
    #[error("{0} cannot hold a value directly")]
    NotAValueScope(&'static str),
    #[error("assignment to {0} has no value")]
    MissingValue(String),
    #[error("cannot register a temp file outside an assignment")]
    NoEnclosingAssignment,
    #[error("{name} holds a {actual}, not a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: ValueType,
    },
}

/// Temp files that could not be deleted when their assignment ended.
#[derive(Debug, Error)]
pub struct CleanupError {
    pub failures: Vec<(PathBuf, io::Error)>,
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to delete {} temp file(s): ", self.failures.len())?;
        for (i, (path, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", path.display(), err)?;
        }
        Ok(())
    }
}

/// Every step of session teardown that failed.
#[derive(Debug, Error)]
pub struct ShutdownError {
    pub failures: Vec<String>,
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine shutdown failed: {}", self.failures.join("; "))
    }
}
