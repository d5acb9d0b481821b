//! A small, restricted interpreter for the Python subset that code agents emit.
//!
//! Supported: assignments (plain, `+=`, `-=`, item assignment), arithmetic,
//! comparisons, boolean logic, conditional expressions, list and dict
//! literals, f-strings, a handful of builtins and methods, and calls to
//! registered tools. Block statements, imports and function definitions are
//! rejected with [`InterpreterError::Unsupported`].
//!
//! Variables live in a caller-owned map so that later steps of the same run
//! can see what earlier steps stored.
//!
//! Nesting depth, collection sizes and format precision are capped, so code
//! that goes over a limit fails with an [`InterpreterError`] instead of
//! exhausting the stack or memory.

mod ast;
mod error;
mod interpreter;
mod lexer;
mod parser;
mod value;

pub use error::InterpreterError;
pub use interpreter::{Evaluation, Outcome, Sandbox, MAX_COLLECTION_LEN, MAX_FORMAT_PRECISION};
pub use parser::MAX_NESTING_DEPTH;
pub(crate) use interpreter::BUILTINS;
pub use value::Value;
