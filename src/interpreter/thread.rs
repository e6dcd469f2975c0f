// File: src/interpreter/thread.rs
//
// Per-thread execution state: the stack of active method scopes (used only to
// validate non-local returns) and the guest backtrace.
//
// Every host thread running guest code owns exactly one ThreadContext and
// passes it down explicitly; nothing here is shared or locked.

use crate::ir::ScopeId;
use std::fmt;

#[derive(Debug, Default, Clone)]
pub struct CallStack {
    scopes: Vec<ScopeId>,
}

impl CallStack {
    pub fn push(&mut self, scope: ScopeId) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) -> Option<ScopeId> {
        self.scopes.pop()
    }

    pub fn contains(&self, scope: ScopeId) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn top(&self) -> Option<ScopeId> {
        self.scopes.last().copied()
    }

    pub(crate) fn truncate(&mut self, depth: usize) {
        self.scopes.truncate(depth);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktraceFrame {
    pub module: String,
    pub method: String,
    pub file: String,
    pub line: u32,
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:in `{}#{}'", self.file, self.line, self.module, self.method)
    }
}

#[derive(Debug)]
pub struct ThreadContext {
    call_stack: CallStack,
    backtrace: Vec<BacktraceFrame>,
    /// Scope invocations (methods and closures) currently executing
    nesting: usize,
    file: String,
    line: u32,
}

impl ThreadContext {
    pub fn new(file: &str) -> Self {
        Self { call_stack: CallStack::default(), backtrace: Vec::new(), nesting: 0, file: file.to_string(), line: 0 }
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn call_stack_mut(&mut self) -> &mut CallStack {
        &mut self.call_stack
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    pub fn push_backtrace(&mut self, module: &str, method: &str) {
        self.backtrace.push(BacktraceFrame {
            module: module.to_string(),
            method: method.to_string(),
            file: self.file.clone(),
            line: self.line,
        });
    }

    pub fn pop_backtrace(&mut self) -> Option<BacktraceFrame> {
        self.backtrace.pop()
    }

    pub fn backtrace(&self) -> &[BacktraceFrame] {
        &self.backtrace
    }

    pub fn backtrace_depth(&self) -> usize {
        self.backtrace.len()
    }

    /// Rendered backtrace, innermost frame first
    pub fn backtrace_lines(&self) -> Vec<String> {
        self.backtrace.iter().rev().map(|f| f.to_string()).collect()
    }

    pub fn nesting(&self) -> usize {
        self.nesting
    }

    pub(crate) fn set_nesting(&mut self, nesting: usize) {
        self.nesting = nesting;
    }

    pub(crate) fn truncate_backtrace(&mut self, depth: usize) {
        self.backtrace.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_stack_membership() {
        let mut stack = CallStack::default();
        stack.push(ScopeId(0));
        stack.push(ScopeId(2));
        assert!(stack.contains(ScopeId(2)));
        assert_eq!(stack.top(), Some(ScopeId(2)));
        assert_eq!(stack.pop(), Some(ScopeId(2)));
        assert!(!stack.contains(ScopeId(2)));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_backtrace_lines_innermost_first() {
        let mut thread = ThreadContext::new("demo.json");
        thread.set_line(1);
        thread.push_backtrace("Object", "outer");
        thread.set_line(7);
        thread.push_backtrace("Object", "inner");
        assert_eq!(
            thread.backtrace_lines(),
            vec!["demo.json:7:in `Object#inner'".to_string(), "demo.json:1:in `Object#outer'".to_string()]
        );
        thread.pop_backtrace();
        assert_eq!(thread.backtrace_depth(), 1);
    }
}
