// File: src/interpreter/context.rs
//
// Per-invocation interpreter state.
// One InterpreterContext is created for every method call or closure call
// and is owned exclusively by the frame executing it.

use crate::ir::{BlockMode, Operand, Reg};
use crate::signal::Signal;
use crate::value::Value;

/// How the executing scope was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Method,
    Block,
    Lambda,
    Proc,
}

impl From<BlockMode> for Invocation {
    fn from(mode: BlockMode) -> Self {
        match mode {
            BlockMode::Block => Invocation::Block,
            BlockMode::Lambda => Invocation::Lambda,
            BlockMode::Proc => Invocation::Proc,
        }
    }
}

#[derive(Debug)]
pub struct InterpreterContext {
    invocation: Invocation,
    registers: Vec<Value>,
    /// Signal handed to rescue or ensure code
    pending: Option<Signal>,
    return_value: Value,
}

impl InterpreterContext {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation, registers: Vec::new(), pending: None, return_value: Value::Nil }
    }

    /// Arguments land in r0, r1, ...
    pub fn with_args(invocation: Invocation, args: Vec<Value>) -> Self {
        Self { registers: args, ..Self::new(invocation) }
    }

    pub fn invocation(&self) -> Invocation {
        self.invocation
    }

    pub fn in_lambda(&self) -> bool {
        self.invocation == Invocation::Lambda
    }

    pub fn in_proc(&self) -> bool {
        self.invocation == Invocation::Proc
    }

    /// Grow the register file to at least `count` slots
    pub fn reserve_registers(&mut self, count: usize) {
        if self.registers.len() < count {
            self.registers.resize(count, Value::Nil);
        }
    }

    pub fn get(&self, reg: Reg) -> Value {
        self.registers.get(reg.index()).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, reg: Reg, value: Value) {
        let index = reg.index();
        if index >= self.registers.len() {
            self.registers.resize(index + 1, Value::Nil);
        }
        self.registers[index] = value;
    }

    pub fn operand(&self, operand: &Operand, self_value: &Value) -> Value {
        match operand {
            Operand::Reg(reg) => self.get(*reg),
            Operand::Const(value) => value.clone(),
            Operand::SelfValue => self_value.clone(),
            Operand::Nil => Value::Nil,
        }
    }

    pub fn set_pending(&mut self, signal: Signal) {
        self.pending = Some(signal);
    }

    pub fn take_pending(&mut self) -> Option<Signal> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&Signal> {
        self.pending.as_ref()
    }

    pub fn return_value(&self) -> &Value {
        &self.return_value
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = value;
    }
}
