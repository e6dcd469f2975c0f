// File: src/interpreter/trace.rs
//
// Call/return event hooks.
// Hooks are observers: they never change control flow, but a hook may fail,
// and the failure is reported to the frame that fired it.

use crate::module::Module;
use crate::signal::Signal;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Call,
    Return,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Call => write!(f, "call"),
            TraceEvent::Return => write!(f, "return"),
        }
    }
}

pub trait EventHooks: Send + Sync {
    fn has_event_hooks(&self) -> bool {
        true
    }

    fn trace(&self, event: TraceEvent, name: &str, module: &Module) -> Result<(), Signal>;
}

/// Emits every event through `tracing`
#[derive(Debug, Default)]
pub struct LogHooks;

impl EventHooks for LogHooks {
    fn trace(&self, event: TraceEvent, name: &str, module: &Module) -> Result<(), Signal> {
        tracing::info!(target: "ir_interp::trace", %event, "{}#{}", module, name);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub event: TraceEvent,
    pub name: String,
    pub module: String,
}

/// Records events in memory
#[derive(Debug, Default)]
pub struct EventLog {
    records: Mutex<Vec<TraceRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventHooks for EventLog {
    fn trace(&self, event: TraceEvent, name: &str, module: &Module) -> Result<(), Signal> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).push(TraceRecord {
            event,
            name: name.to_string(),
            module: module.name().to_string(),
        });
        Ok(())
    }
}
