// File: src/errors.rs
//
// User-facing error reports.
// Converts signals that escape the top-level entry, and failures while
// loading or building a unit, into structured errors with pretty-printed
// output.

use crate::ir::BuildError;
use crate::signal::Signal;
use crate::value::Value;
use colored::Colorize;
use std::fmt;

/// Types of errors reported to the user
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    LoadError,
    BuildError,
    UncaughtException,
    LocalJumpError,
    FatalError,
    UnhandledJump,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::LoadError => write!(f, "Load Error"),
            ErrorKind::BuildError => write!(f, "Build Error"),
            ErrorKind::UncaughtException => write!(f, "Uncaught Exception"),
            ErrorKind::LocalJumpError => write!(f, "Local Jump Error"),
            ErrorKind::FatalError => write!(f, "Fatal Error"),
            ErrorKind::UnhandledJump => write!(f, "Unhandled Jump"),
        }
    }
}

/// A structured error with backtrace information
#[derive(Debug, Clone)]
pub struct InterpError {
    pub kind: ErrorKind,
    pub message: String,
    /// Innermost frame first
    pub backtrace: Vec<String>,
    pub help: Option<String>,
    pub note: Option<String>,
}

impl InterpError {
    pub fn new(kind: ErrorKind, message: String) -> Self {
        Self { kind, message, backtrace: Vec::new(), help: None, note: None }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.note = Some(note);
        self
    }

    pub fn load_error(message: String) -> Self {
        Self::new(ErrorKind::LoadError, message)
    }

    /// Report a signal that escaped the top-level entry
    pub fn from_signal(signal: &Signal) -> Self {
        match signal {
            Signal::Raise(Value::Exception(e)) if e.is_local_jump() => {
                let mut err = Self::new(ErrorKind::LocalJumpError, e.message.clone())
                    .with_backtrace(e.backtrace.clone());
                if let Some(value) = &e.exit_value {
                    err = err.with_note(format!("exit value: {}", value));
                }
                err
            }
            Signal::Raise(Value::Exception(e)) => {
                Self::new(ErrorKind::UncaughtException, format!("{}: {}", e.class, e.message))
                    .with_backtrace(e.backtrace.clone())
            }
            Signal::Raise(value) => Self::new(ErrorKind::UncaughtException, value.to_string()),
            Signal::Fatal(fatal) => Self::new(ErrorKind::FatalError, fatal.message.clone()),
            Signal::ReturnJump(_) | Signal::BreakJump(_) => Self::new(ErrorKind::UnhandledJump, signal.to_string())
                .with_help("non-local return and break must be consumed by an active frame".to_string()),
        }
    }
}

impl From<BuildError> for InterpError {
    fn from(err: BuildError) -> Self {
        Self::new(ErrorKind::BuildError, err.to_string())
    }
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = format!("{}", self.kind);
        writeln!(f, "{}: {}", kind_str.red().bold(), self.message.bold())?;

        for frame in &self.backtrace {
            writeln!(f, "  {} {}", "from".bright_blue(), frame)?;
        }

        if let Some(ref help) = self.help {
            writeln!(f, "   {} {}", "=".bright_yellow(), format!("help: {}", help).bright_yellow())?;
        }

        if let Some(ref note) = self.note {
            writeln!(f, "   {} {}", "=".bright_cyan(), format!("note: {}", note).bright_cyan())?;
        }

        Ok(())
    }
}

impl std::error::Error for InterpError {}
