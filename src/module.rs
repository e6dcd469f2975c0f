// File: src/module.rs
//
// Owning modules for executing scopes.
// The interpreter only needs a module's name, for backtraces and trace
// events; method lookup lives outside this crate.

use std::fmt;

/// Module (or class) a method executes against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Module {
    name: String,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module { name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
