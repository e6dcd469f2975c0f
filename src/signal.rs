// File: src/signal.rs
//
// Abrupt control transfers between interpreter frames.
//
// Instructions never unwind the host stack. Anything that is not a plain
// fallthrough or a branch comes back as a Signal in the Err arm of a Result,
// and each frame of the dispatch loop decides whether it consumes the signal,
// routes it to a handler region, or hands it to its caller.

use crate::ir::ScopeId;
use crate::value::{Exception, JumpReason, Value};
use std::fmt;

/// Control signal raised by an instruction or synthesized by the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Guest-visible exception; recovered by rescue regions
    Raise(Value),

    /// Host-level failure; only ensure regions observe it
    Fatal(FatalError),

    /// `return` executed inside a closure, heading for the owning method
    ReturnJump(ReturnJump),

    /// `break` executed inside a block, heading for the frame that called it
    BreakJump(BreakJump),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnJump {
    /// Method frame that must stop propagation
    pub target: Option<ScopeId>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakJump {
    /// Scope lexically invoking the block
    pub target: ScopeId,
    pub value: Value,
    /// Set when a lambda frame claimed the break; the next frame up consumes it
    pub caught_by_lambda: bool,
}

/// Unrecoverable condition that bypasses rescue regions
#[derive(Debug, Clone, PartialEq)]
pub struct FatalError {
    pub message: String,
}

impl FatalError {
    pub fn new(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

impl Signal {
    pub fn raise(exception: Exception) -> Self {
        Signal::Raise(exception.into_value())
    }

    /// `LocalJumpError` raised by the interpreter itself
    pub fn local_jump(reason: JumpReason, exit_value: Value, message: &str, backtrace: Vec<String>) -> Self {
        Signal::raise(Exception::local_jump(reason, exit_value, message).with_backtrace(backtrace))
    }

    pub fn fatal(message: &str) -> Self {
        Signal::Fatal(FatalError::new(message))
    }

    pub fn return_jump(target: Option<ScopeId>, value: Value) -> Self {
        Signal::ReturnJump(ReturnJump { target, value })
    }

    pub fn break_jump(target: ScopeId, value: Value) -> Self {
        Signal::BreakJump(BreakJump { target, value, caught_by_lambda: false })
    }

    /// The raised exception, if this is a guest raise of an exception object
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            Signal::Raise(v) => v.as_exception(),
            _ => None,
        }
    }

    pub fn is_local_jump(&self, reason: JumpReason) -> bool {
        self.exception().is_some_and(|e| e.reason == Some(reason))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Raise(v) => write!(f, "raise {}", v),
            Signal::Fatal(e) => write!(f, "fatal: {}", e.message),
            Signal::ReturnJump(j) => match j.target {
                Some(target) => write!(f, "return {} to {}", j.value, target),
                None => write!(f, "return {}", j.value),
            },
            Signal::BreakJump(j) => {
                write!(f, "break {} to {}", j.value, j.target)?;
                if j.caught_by_lambda {
                    write!(f, " (caught by lambda)")?;
                }
                Ok(())
            }
        }
    }
}
