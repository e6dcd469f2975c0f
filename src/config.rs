// File: src/config.rs
//
// Interpreter configuration.
// Defaults come from the environment (read once per process); the CLI and
// embedders override individual settings with the builder methods.

use once_cell::sync::Lazy;

/// `IR_DEBUG=1` logs every executed instruction and caught signal
const DEBUG_VAR: &str = "IR_DEBUG";

/// `IR_TRACE=1` fires call/return trace events for named method calls
const TRACE_VAR: &str = "IR_TRACE";

/// Nested scope invocations allowed per thread before a fatal error
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

static ENV_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    debug: env_flag(DEBUG_VAR),
    trace_calls: env_flag(TRACE_VAR),
    ..Config::default()
});

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(v.trim(), "" | "0" | "false" | "off"),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub debug: bool,
    pub trace_calls: bool,
    /// Source file reported in backtraces
    pub file: String,
    pub max_call_depth: usize,
}

impl Config {
    pub fn from_env() -> Self {
        ENV_CONFIG.clone()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_trace_calls(mut self, trace_calls: bool) -> Self {
        self.trace_calls = trace_calls;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { debug: false, trace_calls: false, file: String::from("-"), max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_defaults() {
        let config = Config::default().with_debug(true).with_file("demo.json");
        assert!(config.debug);
        assert!(!config.trace_calls);
        assert_eq!(config.file, "demo.json");
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.with_max_call_depth(8).max_call_depth, 8);
    }

    #[test]
    fn test_env_flag_values() {
        std::env::set_var("IR_INTERP_TEST_FLAG_ON", "1");
        std::env::set_var("IR_INTERP_TEST_FLAG_OFF", "0");
        assert!(env_flag("IR_INTERP_TEST_FLAG_ON"));
        assert!(!env_flag("IR_INTERP_TEST_FLAG_OFF"));
        assert!(!env_flag("IR_INTERP_TEST_FLAG_UNSET"));
    }
}
