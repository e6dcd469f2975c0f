// File: src/lib.rs
//
// Library interface for the IR interpreter.
// Exposes modules for integration testing and embedding.

pub mod config;
pub mod errors;
pub mod interpreter;
pub mod ir;
pub mod module;
pub mod signal;
pub mod value;

pub use interpreter::{Interpreter, InterpreterContext, Runtime, ThreadContext};
pub use signal::Signal;
pub use value::Value;
