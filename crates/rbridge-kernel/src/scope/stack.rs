//! The scope state machine.
//!
//! Every live construct is one frame on a single stack. A frame records its
//! kind, its parent's index, whether a child is open, how many children it
//! has had, and the value kind inferred for it so far. Statement text is
//! accumulated as frames open and close; nothing reaches the engine until
//! the Assignment at the bottom of the stack closes.
//!
//! ```text
//! Assignment  x<-            ;
//!   Expression  (          )
//!     Function    solve(  )
//!       Parameter   m
//! ```
//!
//! Abandoning a frame (its guard dropped without `close`) truncates the
//! text it emitted and restores the parent to its state before the open.

use std::path::PathBuf;

use rbridge_types::ValueType;

use crate::error::StateError;
use crate::pending::PendingDeleteSet;
use crate::protocol;

/// How a function's result kind is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultRule {
    /// Known on open, whatever the arguments are.
    Fixed(ValueType),
    /// The first argument with a resolved kind.
    Inherit,
    /// The widest argument kind (arithmetic).
    Widest,
}

/// Call syntax of a function frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Emitted on open: `name(` or `(` for infix operators.
    open: String,
    /// Emitted before parameter `i` (for `i >= 1`): entry `min(i-1, len-1)`.
    separators: Vec<String>,
    /// Fewest parameters that form a valid call.
    min_params: usize,
    result: ResultRule,
    label: String,
}

impl FunctionSpec {
    /// `name(a, b, ...)`; the result inherits the first argument's kind.
    pub fn call(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            open: format!("{}(", name),
            separators: vec![",".to_string()],
            min_params: 0,
            result: ResultRule::Inherit,
            label: name,
        }
    }

    /// `(a op b op ...)`; the result is the widest operand kind.
    pub fn infix(op: impl Into<String>) -> Self {
        let op = op.into();
        Self {
            open: "(".to_string(),
            separators: vec![op.clone()],
            min_params: 2,
            result: ResultRule::Widest,
            label: op,
        }
    }

    /// Positional separators, e.g. `["+", "*"]` for `(a+b*c)`.
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        if !separators.is_empty() {
            self.separators = separators;
        }
        self
    }

    pub fn returning(mut self, ty: ValueType) -> Self {
        self.result = ResultRule::Fixed(ty);
        self
    }

    pub fn with_min_params(mut self, min: usize) -> Self {
        self.min_params = min;
        self
    }

    pub fn result(&self) -> ResultRule {
        self.result
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn separator(&self, index: usize) -> &str {
        let i = index.saturating_sub(1).min(self.separators.len().saturating_sub(1));
        self.separators.get(i).map(String::as_str).unwrap_or(",")
    }
}

/// The closed set of scope kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Assignment { target: String },
    Expression,
    Function(FunctionSpec),
    Parameter,
}

impl ScopeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Assignment { .. } => "assignment",
            ScopeKind::Expression => "expression",
            ScopeKind::Function(_) => "function",
            ScopeKind::Parameter => "parameter",
        }
    }

    /// Expressions and parameters hold exactly one value.
    fn holds_value(&self) -> bool {
        matches!(self, ScopeKind::Expression | ScopeKind::Parameter)
    }
}

/// Handle to one open frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId {
    index: usize,
    serial: u64,
}

impl ScopeId {
    pub fn depth(&self) -> usize {
        self.index
    }
}

#[derive(Debug)]
struct Frame {
    kind: ScopeKind,
    parent: Option<usize>,
    serial: u64,
    child_open: bool,
    children: usize,
    has_value: bool,
    inferred: Option<ValueType>,
    /// Text length before this frame emitted its prefix.
    text_start: usize,
    /// Present on Assignment frames only.
    pending: Option<PendingDeleteSet>,
}

/// A finished Assignment, ready to be sent.
#[derive(Debug)]
pub struct Statement {
    pub target: String,
    pub ty: ValueType,
    pub text: String,
    pub pending: PendingDeleteSet,
}

/// Outcome of closing a frame.
#[derive(Debug)]
pub enum Closed {
    Nested(Option<ValueType>),
    Statement(Statement),
}

/// Single stack of open scopes for one statement.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
    text: String,
    next_serial: u64,
    produced: bool,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statement text emitted so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn innermost(&self) -> Option<&ScopeKind> {
        self.frames.last().map(|f| &f.kind)
    }

    pub fn inferred(&self, id: ScopeId) -> Option<ValueType> {
        self.frame(id).and_then(|f| f.inferred)
    }

    /// Whether `id` names a frame that is still open.
    pub fn is_open(&self, id: ScopeId) -> bool {
        self.frame(id).is_some()
    }

    /// Open a frame under the innermost one.
    pub fn open(&mut self, kind: ScopeKind) -> Result<ScopeId, StateError> {
        let parent = match self.frames.last() {
            None => {
                let ScopeKind::Assignment { .. } = kind else {
                    return Err(StateError::NoParent(kind.name()));
                };
                if self.produced {
                    return Err(StateError::ValueAlreadySet("assignment"));
                }
                None
            }
            Some(parent) => {
                check_nesting(parent, &kind)?;
                Some(self.frames.len() - 1)
            }
        };

        let text_start = self.text.len();
        match &kind {
            ScopeKind::Assignment { target } => self.text.push_str(&protocol::assign_prefix(target)),
            ScopeKind::Expression => self.text.push('('),
            ScopeKind::Function(spec) => self.text.push_str(&spec.open),
            ScopeKind::Parameter => {
                if let Some(p) = parent
                    && let ScopeKind::Function(spec) = &self.frames[p].kind
                {
                    let children = self.frames[p].children;
                    if children > 0 {
                        let sep = spec.separator(children).to_string();
                        self.text.push_str(&sep);
                    }
                }
            }
        }

        if let Some(p) = parent {
            let parent = &mut self.frames[p];
            parent.child_open = true;
            parent.children += 1;
            if parent.kind.holds_value() {
                parent.has_value = true;
            }
        }

        let inferred = match &kind {
            ScopeKind::Function(spec) => match spec.result {
                ResultRule::Fixed(ty) => Some(ty),
                _ => None,
            },
            _ => None,
        };
        let pending = matches!(kind, ScopeKind::Assignment { .. }).then(PendingDeleteSet::new);

        let serial = self.next_serial;
        self.next_serial += 1;
        if pending.is_some() {
            self.produced = true;
        }
        self.frames.push(Frame {
            kind,
            parent,
            serial,
            child_open: false,
            children: 0,
            has_value: false,
            inferred,
            text_start,
            pending,
        });

        Ok(ScopeId {
            index: self.frames.len() - 1,
            serial,
        })
    }

    /// Write a leaf value into the innermost frame.
    pub fn write_value(&mut self, text: &str, ty: ValueType) -> Result<(), StateError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(StateError::NoParent("value"))?;
        if !frame.kind.holds_value() {
            return Err(StateError::NotAValueScope(frame.kind.name()));
        }
        if frame.has_value {
            return Err(StateError::ValueAlreadySet(frame.kind.name()));
        }
        frame.has_value = true;
        // Unknown leaves the kind for a later sibling or fails the assignment
        frame.inferred = (ty != ValueType::Unknown).then_some(ty);
        self.text.push_str(text);
        Ok(())
    }

    /// Register a temp file with the nearest enclosing Assignment.
    pub fn register_pending(&mut self, path: PathBuf) -> Result<(), StateError> {
        let mut index = self.frames.len().checked_sub(1);
        while let Some(i) = index {
            if let Some(pending) = self.frames[i].pending.as_mut() {
                pending.register(path);
                return Ok(());
            }
            index = self.frames[i].parent;
        }
        Err(StateError::NoEnclosingAssignment)
    }

    /// Close the frame `id`, which must be innermost.
    pub fn close(&mut self, id: ScopeId) -> Result<Closed, StateError> {
        self.check_innermost(id)?;
        let Some(frame) = self.frames.last() else {
            return Err(StateError::AlreadyClosed(id.index));
        };

        if frame.child_open {
            return Err(StateError::ChildStillOpen(frame.kind.name()));
        }
        match &frame.kind {
            ScopeKind::Assignment { target } if frame.children == 0 || frame.inferred.is_none() => {
                return Err(StateError::MissingValue(target.clone()));
            }
            ScopeKind::Expression | ScopeKind::Parameter if !frame.has_value => {
                return Err(StateError::MissingValue(frame.kind.name().to_string()));
            }
            ScopeKind::Function(spec) if frame.children < spec.min_params => {
                return Err(StateError::TooFewParameters {
                    function: spec.label.clone(),
                    min: spec.min_params,
                });
            }
            _ => {}
        }

        let Some(mut frame) = self.frames.pop() else {
            return Err(StateError::AlreadyClosed(id.index));
        };
        match frame.kind {
            ScopeKind::Expression | ScopeKind::Function(_) => self.text.push(')'),
            ScopeKind::Assignment { .. } => self.text.push(';'),
            ScopeKind::Parameter => {}
        }

        if let ScopeKind::Assignment { target } = &frame.kind {
            return Ok(Closed::Statement(Statement {
                target: target.clone(),
                ty: frame.inferred.unwrap_or_default(),
                text: std::mem::take(&mut self.text),
                pending: frame.pending.take().unwrap_or_default(),
            }));
        }

        if let Some(p) = frame.parent {
            let parent = &mut self.frames[p];
            parent.child_open = false;
            if let Some(ty) = frame.inferred {
                parent.inferred = match (&parent.kind, parent.inferred) {
                    (ScopeKind::Function(spec), Some(current)) if spec.result == ResultRule::Widest => {
                        Some(current.widen(ty))
                    }
                    (_, None) => Some(ty),
                    (_, current) => current,
                };
            }
        }

        Ok(Closed::Nested(frame.inferred))
    }

    /// Drop `id` and everything above it, undoing the text they emitted.
    ///
    /// Abandoning an Assignment discards the whole statement and deletes
    /// any temp files registered under it.
    pub fn abandon(&mut self, id: ScopeId) {
        if !self.is_open(id) {
            return;
        }
        while let Some(frame) = self.frames.pop() {
            let done = frame.serial == id.serial;
            self.text.truncate(frame.text_start);
            if done {
                if let Some(p) = frame.parent {
                    let parent = &mut self.frames[p];
                    parent.child_open = false;
                    parent.children = parent.children.saturating_sub(1);
                    if parent.kind.holds_value() {
                        parent.has_value = false;
                    }
                }
                tracing::debug!(kind = frame.kind.name(), "scope abandoned");
                break;
            }
        }
    }

    fn frame(&self, id: ScopeId) -> Option<&Frame> {
        self.frames.get(id.index).filter(|f| f.serial == id.serial)
    }

    fn check_innermost(&self, id: ScopeId) -> Result<(), StateError> {
        match self.frame(id) {
            None => Err(StateError::AlreadyClosed(id.index)),
            Some(frame) if id.index + 1 != self.frames.len() => {
                Err(StateError::ChildStillOpen(frame.kind.name()))
            }
            Some(_) => Ok(()),
        }
    }
}

fn check_nesting(parent: &Frame, child: &ScopeKind) -> Result<(), StateError> {
    let illegal = |reason| StateError::IllegalNesting {
        parent: parent.kind.name(),
        child: child.name(),
        reason,
    };

    if parent.child_open {
        return Err(StateError::ChildStillOpen(parent.kind.name()));
    }

    match (&parent.kind, child) {
        (_, ScopeKind::Assignment { .. }) => Err(illegal("assignments only appear at top level")),
        (ScopeKind::Assignment { .. }, ScopeKind::Expression) => {
            if parent.children > 0 {
                Err(illegal("the assignment already has its expression"))
            } else {
                Ok(())
            }
        }
        (ScopeKind::Assignment { .. }, _) => Err(illegal("an assignment holds exactly one expression")),
        (ScopeKind::Function(_), ScopeKind::Parameter) => Ok(()),
        (ScopeKind::Function(_), _) => Err(illegal("functions only take parameters")),
        (ScopeKind::Expression | ScopeKind::Parameter, ScopeKind::Parameter) => {
            Err(illegal("parameters belong to functions"))
        }
        (ScopeKind::Expression | ScopeKind::Parameter, _) => {
            if parent.has_value {
                Err(illegal("the scope already holds a value"))
            } else {
                Ok(())
            }
        }
    }
}
