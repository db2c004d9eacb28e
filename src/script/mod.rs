//! Test script language.
//!
//! A script is a sequence of statements. Each statement is a call into a
//! fixed vocabulary (`Test`, `Window`, `navigate`, `snapshot`, ...), an
//! assignment of a call result to a name, or a bare name. Nothing outside
//! the vocabulary can be reached from a script.

pub mod interpreter;
pub mod lexer;
pub mod parser;

pub use interpreter::{Interpreter, Script, TestDefinition, vocabulary};
pub use lexer::Position;
