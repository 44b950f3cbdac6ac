//! Core module tree: alphabet, front end, interpreter and JS back end.

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod symbols;
pub mod token;
pub mod value;

pub use token::TokenKind;
