use std::fmt;

use thiserror::Error;

use crate::core::ast::Pos;
use crate::core::lexer::LexError;
use crate::core::parser::SyntaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnboundName,
    ConstReassignment,
    TypeMismatch,
    DivisionByZero,
    PrimitiveExecution,
    RecursionLimit,
    Halt,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UnboundName => "UnboundName",
            ErrorKind::ConstReassignment => "ConstReassignment",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::DivisionByZero => "DivisionByZero",
            ErrorKind::PrimitiveExecution => "PrimitiveExecution",
            ErrorKind::RecursionLimit => "RecursionLimit",
            ErrorKind::Halt => "Halt",
        }
    }

    /// `halt` unwinds through every `try`.
    pub fn is_catchable(self) -> bool {
        self != ErrorKind::Halt
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime failure. Displays as `"<Kind>: <message>"`, which is also the
/// text a `catch` variable receives.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    pub fn unbound(name: &str) -> Self {
        Self::new(ErrorKind::UnboundName, format!("'{name}' is not defined"))
    }

    pub fn const_reassignment(name: &str) -> Self {
        Self::new(
            ErrorKind::ConstReassignment,
            format!("cannot assign to constant '{name}'"),
        )
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn primitive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PrimitiveExecution, message)
    }

    pub fn halt() -> Self {
        Self::new(ErrorKind::Halt, "program halted")
    }

    /// Attaches a position unless a more precise one is already present.
    pub fn at(mut self, pos: Pos) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }
}

/// Any failure on the source → result path.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Error::Lex(e) => Some(e.position()),
            Error::Syntax(e) => Some((e.line, e.col)),
            Error::Runtime(e) => e.pos.map(|p| (p.line, p.col)),
        }
    }

    /// Message without the position suffix, for diagnostics that print the
    /// location separately.
    pub fn title(&self) -> String {
        match self {
            Error::Lex(e) => format!("lex error: {e}"),
            Error::Syntax(e) => format!("syntax error: {}", e.message),
            Error::Runtime(e) => format!("runtime error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_kind_colon_message() {
        let err = RuntimeError::unbound("x");
        assert_eq!(err.to_string(), "UnboundName: 'x' is not defined");
    }

    #[test]
    fn first_position_wins() {
        let err = RuntimeError::type_mismatch("bad")
            .at(Pos::new(2, 3))
            .at(Pos::new(9, 9));
        assert_eq!(err.pos, Some(Pos::new(2, 3)));
    }

    #[test]
    fn only_halt_is_uncatchable() {
        assert!(!ErrorKind::Halt.is_catchable());
        assert!(ErrorKind::DivisionByZero.is_catchable());
        assert!(ErrorKind::RecursionLimit.is_catchable());
    }

    #[test]
    fn umbrella_error_reports_position() {
        let err: Error = RuntimeError::halt().at(Pos::new(4, 1)).into();
        assert_eq!(err.position(), Some((4, 1)));
        assert_eq!(err.title(), "runtime error: Halt: program halted");
    }
}
