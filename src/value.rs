// File: src/value.rs
//
// Guest values manipulated by IR instructions.
// Only the handful of shapes the control-flow core needs to move around:
// immediates, strings, and exception objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Runtime value of the guest language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Exception(Arc<Exception>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Guest truthiness: only nil and false are falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Exception(_) => "exception",
        }
    }

    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Value::Exception(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Exception(e) => write!(f, "#<{}: {}>", e.class, e.message),
        }
    }
}

/// Why a local jump was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpReason {
    Break,
    Return,
}

impl fmt::Display for JumpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpReason::Break => write!(f, "break"),
            JumpReason::Return => write!(f, "return"),
        }
    }
}

/// A guest exception object
///
/// `reason` and `exit_value` are only populated for `LocalJumpError`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    pub class: String,
    pub message: String,
    #[serde(default)]
    pub reason: Option<JumpReason>,
    #[serde(default)]
    pub exit_value: Option<Value>,
    #[serde(default)]
    pub backtrace: Vec<String>,
}

impl Exception {
    pub fn new(class: &str, message: &str) -> Self {
        Self {
            class: class.to_string(),
            message: message.to_string(),
            reason: None,
            exit_value: None,
            backtrace: Vec::new(),
        }
    }

    pub fn local_jump(reason: JumpReason, exit_value: Value, message: &str) -> Self {
        Self {
            class: "LocalJumpError".to_string(),
            message: message.to_string(),
            reason: Some(reason),
            exit_value: Some(exit_value),
            backtrace: Vec::new(),
        }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn is_local_jump(&self) -> bool {
        self.reason.is_some()
    }

    pub fn into_value(self) -> Value {
        Value::Exception(Arc::new(self))
    }
}
