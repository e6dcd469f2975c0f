// File: src/interpreter/runtime.rs
//
// Process-wide interpreter state shared by every thread: configuration,
// the root object module, event hooks, and an executed-instruction counter.

use super::trace::{EventHooks, TraceEvent};
use crate::config::Config;
use crate::module::Module;
use crate::signal::Signal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Runtime {
    config: Config,
    object: Arc<Module>,
    hooks: Option<Arc<dyn EventHooks>>,
    executed: AtomicU64,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        Self { config, object: Arc::new(Module::new("Object")), hooks: None, executed: AtomicU64::new(0) }
    }

    pub fn with_event_hooks(mut self, hooks: Arc<dyn EventHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn object_module(&self) -> Arc<Module> {
        self.object.clone()
    }

    pub fn has_event_hooks(&self) -> bool {
        self.hooks.as_ref().is_some_and(|h| h.has_event_hooks())
    }

    pub(crate) fn trace(&self, event: TraceEvent, name: &str, module: &Module) -> Result<(), Signal> {
        match &self.hooks {
            Some(hooks) if hooks.has_event_hooks() => hooks.trace(event, name, module),
            _ => Ok(()),
        }
    }

    pub(crate) fn count_instruction(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn instructions_executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
