// src/core/token.rs
use crate::core::symbols::{Delimiter, Keyword, Operator};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Operator(Operator),
    Delimiter(Delimiter),
    Number(f64),
    /// Decoded string content.
    String(String),
    /// Decoded identifier name.
    Identifier(String),
    /// Decoded comment text.
    Comment(String),
    EndOfInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The cells exactly as they appear in the source.
    pub raw: String,
    /// Byte offset of the first cell.
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, raw: String, offset: usize, line: usize, col: usize) -> Self {
        Self {
            kind,
            raw,
            offset,
            line,
            col,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::Comment(_))
    }

    /// Operator precedence, when this token is an operator.
    pub fn precedence(&self) -> Option<u8> {
        match self.kind {
            TokenKind::Operator(op) => Some(op.precedence()),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Keyword(k) => write!(f, "'{}'", k.name()),
            TokenKind::Operator(o) => write!(f, "'{}'", o.lexeme()),
            TokenKind::Delimiter(d) => write!(f, "'{}'", d.lexeme()),
            TokenKind::Number(_) => write!(f, "number"),
            TokenKind::String(_) => write!(f, "string"),
            TokenKind::Identifier(_) => write!(f, "identifier"),
            TokenKind::Comment(_) => write!(f, "comment"),
            TokenKind::EndOfInput => write!(f, "end of input"),
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TokenKind::Keyword(k) => write!(f, "Keyword({}) @{}:{}", k.name(), self.line, self.col),
            TokenKind::Operator(o) => write!(
                f,
                "Operator({} prec={}) @{}:{}",
                o.lexeme(),
                o.precedence(),
                self.line,
                self.col
            ),
            TokenKind::Delimiter(d) => write!(f, "Delimiter({}) @{}:{}", d.lexeme(), self.line, self.col),
            TokenKind::Number(v) => write!(f, "Number({}) @{}:{}", v, self.line, self.col),
            TokenKind::String(s) => write!(f, "String({:?}) @{}:{}", s, self.line, self.col),
            TokenKind::Identifier(n) => write!(f, "Identifier('{}') @{}:{}", n, self.line, self.col),
            TokenKind::Comment(c) => write!(f, "Comment({:?}) @{}:{}", c, self.line, self.col),
            TokenKind::EndOfInput => write!(f, "EndOfInput @{}:{}", self.line, self.col),
        }
    }
}
