//! cellscript: a programming language written in braille cells, with a
//! tree-walking interpreter, a JavaScript back end and an instrumentation
//! layer (SAL) that makes AI primitive calls cacheable and replayable.

pub mod ai;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod io;
pub mod sal;

pub use crate::core::error::{Error, ErrorKind, RuntimeError};
pub use crate::core::interpreter::{Execution, Interpreter, InterpreterOptions};
pub use crate::sal::{Sal, SalConfig};
