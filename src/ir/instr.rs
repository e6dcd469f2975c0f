// File: src/ir/instr.rs
//
// Reference instruction set.
//
// Each instruction either falls through, names a branch label, or returns a
// Signal. Only the control-transfer contract matters to the dispatch loop;
// the data operations here are deliberately small.

use super::cfg::Label;
use super::scope::ScopeId;
use crate::interpreter::{Interpreter, InterpreterContext, ThreadContext};
use crate::signal::Signal;
use crate::value::{Exception, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame-local register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reg(pub u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Reg(Reg),
    Const(Value),
    /// The receiver of the executing frame
    #[serde(rename = "self")]
    SelfValue,
    Nil,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Const(v) => write!(f, "{}", v),
            Operand::SelfValue => write!(f, "self"),
            Operand::Nil => write!(f, "nil"),
        }
    }
}

/// How a closure body is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockMode {
    /// Yielded to by the frame that lexically passed it
    Block,
    Lambda,
    /// Called as a detached proc object
    Proc,
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockMode::Block => write!(f, "block"),
            BlockMode::Lambda => write!(f, "lambda"),
            BlockMode::Proc => write!(f, "proc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    LoadConst {
        value: Value,
        dst: Reg,
    },
    Copy {
        src: Operand,
        dst: Reg,
    },
    Add {
        lhs: Operand,
        rhs: Operand,
        dst: Reg,
    },
    Sub {
        lhs: Operand,
        rhs: Operand,
        dst: Reg,
    },
    LessThan {
        lhs: Operand,
        rhs: Operand,
        dst: Reg,
    },
    Jump {
        target: Label,
    },
    BranchIf {
        cond: Operand,
        target: Label,
    },
    BranchUnless {
        cond: Operand,
        target: Label,
    },
    /// Sets the frame's return value and leaves the scope.
    /// `method` names the frame a non-local return must reach.
    Return {
        value: Operand,
        #[serde(default)]
        method: Option<ScopeId>,
    },
    Break {
        value: Operand,
        target: ScopeId,
    },
    Raise {
        value: Operand,
    },
    Fatal {
        message: String,
    },
    /// Moves the pending raised exception into `dst`
    ReceiveException {
        dst: Reg,
    },
    /// Re-raises whatever signal is pending; ends every ensure body
    ResumePending,
    ClearPending,
    CallMethod {
        method: ScopeId,
        #[serde(default)]
        args: Vec<Operand>,
        #[serde(default)]
        dst: Option<Reg>,
    },
    CallBlock {
        closure: ScopeId,
        mode: BlockMode,
        #[serde(default)]
        args: Vec<Operand>,
        #[serde(default)]
        dst: Option<Reg>,
    },
    Line {
        line: u32,
    },
}

impl Instr {
    pub fn execute(
        &self,
        interp: &Interpreter<'_>,
        thread: &mut ThreadContext,
        ctx: &mut InterpreterContext,
        self_value: &Value,
    ) -> Result<Option<Label>, Signal> {
        match self {
            Instr::LoadConst { value, dst } => {
                ctx.set(*dst, value.clone());
            }
            Instr::Copy { src, dst } => {
                let value = ctx.operand(src, self_value);
                ctx.set(*dst, value);
            }
            Instr::Add { lhs, rhs, dst } => {
                let value = arith(thread, "+", ctx.operand(lhs, self_value), ctx.operand(rhs, self_value))?;
                ctx.set(*dst, value);
            }
            Instr::Sub { lhs, rhs, dst } => {
                let value = arith(thread, "-", ctx.operand(lhs, self_value), ctx.operand(rhs, self_value))?;
                ctx.set(*dst, value);
            }
            Instr::LessThan { lhs, rhs, dst } => {
                let value = arith(thread, "<", ctx.operand(lhs, self_value), ctx.operand(rhs, self_value))?;
                ctx.set(*dst, value);
            }
            Instr::Jump { target } => return Ok(Some(*target)),
            Instr::BranchIf { cond, target } => {
                if ctx.operand(cond, self_value).is_truthy() {
                    return Ok(Some(*target));
                }
            }
            Instr::BranchUnless { cond, target } => {
                if !ctx.operand(cond, self_value).is_truthy() {
                    return Ok(Some(*target));
                }
            }
            Instr::Return { value, .. } => {
                let value = ctx.operand(value, self_value);
                ctx.set_return_value(value);
                return Ok(Some(Label::EXIT));
            }
            Instr::Break { value, target } => {
                return Err(Signal::break_jump(*target, ctx.operand(value, self_value)));
            }
            Instr::Raise { value } => {
                return Err(raise(thread, ctx.operand(value, self_value)));
            }
            Instr::Fatal { message } => return Err(Signal::fatal(message)),
            Instr::ReceiveException { dst } => {
                let exception = match ctx.take_pending() {
                    Some(Signal::Raise(value)) => value,
                    Some(other) => {
                        ctx.set_pending(other);
                        Value::Nil
                    }
                    None => Value::Nil,
                };
                ctx.set(*dst, exception);
            }
            Instr::ResumePending => {
                if let Some(signal) = ctx.take_pending() {
                    return Err(signal);
                }
            }
            Instr::ClearPending => {
                ctx.take_pending();
            }
            Instr::CallMethod { method, args, dst } => {
                let args = args.iter().map(|a| ctx.operand(a, self_value)).collect();
                let value = interp.call_method(thread, *method, args, self_value)?;
                if let Some(dst) = dst {
                    ctx.set(*dst, value);
                }
            }
            Instr::CallBlock { closure, mode, args, dst } => {
                let args = args.iter().map(|a| ctx.operand(a, self_value)).collect();
                let value = interp.call_block(thread, *closure, *mode, args, self_value)?;
                if let Some(dst) = dst {
                    ctx.set(*dst, value);
                }
            }
            Instr::Line { line } => thread.set_line(*line),
        }
        Ok(None)
    }

    /// Register a consumed break value is written into
    pub fn result_slot(&self) -> Option<Reg> {
        match self {
            Instr::LoadConst { dst, .. }
            | Instr::Copy { dst, .. }
            | Instr::Add { dst, .. }
            | Instr::Sub { dst, .. }
            | Instr::LessThan { dst, .. }
            | Instr::ReceiveException { dst } => Some(*dst),
            Instr::CallMethod { dst, .. } | Instr::CallBlock { dst, .. } => *dst,
            _ => None,
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Instr::Break { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instr::Return { .. })
    }

    pub fn branch_target(&self) -> Option<Label> {
        match self {
            Instr::Jump { target } | Instr::BranchIf { target, .. } | Instr::BranchUnless { target, .. } => {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Every register the instruction reads or writes
    pub fn registers(&self) -> Vec<Reg> {
        let operands: Vec<&Operand> = match self {
            Instr::Copy { src, .. } => vec![src],
            Instr::Add { lhs, rhs, .. } | Instr::Sub { lhs, rhs, .. } | Instr::LessThan { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            Instr::BranchIf { cond, .. } | Instr::BranchUnless { cond, .. } => vec![cond],
            Instr::Return { value, .. } | Instr::Break { value, .. } | Instr::Raise { value } => vec![value],
            Instr::CallMethod { args, .. } | Instr::CallBlock { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        };

        let mut regs: Vec<Reg> = operands
            .into_iter()
            .filter_map(|op| match op {
                Operand::Reg(r) => Some(*r),
                _ => None,
            })
            .collect();
        regs.extend(self.result_slot());
        regs
    }
}

fn raise(thread: &ThreadContext, value: Value) -> Signal {
    match value {
        Value::Exception(_) => Signal::Raise(value),
        Value::Str(message) => {
            Signal::raise(Exception::new("RuntimeError", &message).with_backtrace(thread.backtrace_lines()))
        }
        other => Signal::raise(
            Exception::new("TypeError", &format!("exception class/object expected, got {}", other.type_name()))
                .with_backtrace(thread.backtrace_lines()),
        ),
    }
}

fn arith(thread: &ThreadContext, op: &str, lhs: Value, rhs: Value) -> Result<Value, Signal> {
    let value = match (op, &lhs, &rhs) {
        ("+", Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
        ("-", Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
        ("<", Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
        ("+", Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        ("-", Value::Float(a), Value::Float(b)) => Value::Float(a - b),
        ("<", Value::Float(a), Value::Float(b)) => Value::Bool(a < b),
        ("+", Value::Str(a), Value::Str(b)) => Value::str(&format!("{}{}", a, b)),
        _ => {
            let message = format!("undefined operation {} {} {}", lhs.type_name(), op, rhs.type_name());
            return Err(Signal::raise(Exception::new("TypeError", &message).with_backtrace(thread.backtrace_lines())));
        }
    };
    Ok(value)
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::LoadConst { value, dst } => write!(f, "{} = {}", dst, value),
            Instr::Copy { src, dst } => write!(f, "{} = {}", dst, src),
            Instr::Add { lhs, rhs, dst } => write!(f, "{} = {} + {}", dst, lhs, rhs),
            Instr::Sub { lhs, rhs, dst } => write!(f, "{} = {} - {}", dst, lhs, rhs),
            Instr::LessThan { lhs, rhs, dst } => write!(f, "{} = {} < {}", dst, lhs, rhs),
            Instr::Jump { target } => write!(f, "jump {}", target),
            Instr::BranchIf { cond, target } => write!(f, "branch_if {}, {}", cond, target),
            Instr::BranchUnless { cond, target } => write!(f, "branch_unless {}, {}", cond, target),
            Instr::Return { value, method: Some(method) } => write!(f, "return {} from {}", value, method),
            Instr::Return { value, method: None } => write!(f, "return {}", value),
            Instr::Break { value, target } => write!(f, "break {} to {}", value, target),
            Instr::Raise { value } => write!(f, "raise {}", value),
            Instr::Fatal { message } => write!(f, "fatal {:?}", message),
            Instr::ReceiveException { dst } => write!(f, "{} = $!", dst),
            Instr::ResumePending => write!(f, "resume_pending"),
            Instr::ClearPending => write!(f, "clear_pending"),
            Instr::CallMethod { method, args, dst } => {
                if let Some(dst) = dst {
                    write!(f, "{} = ", dst)?;
                }
                write!(f, "call {}(", method)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instr::CallBlock { closure, mode, args, dst } => {
                if let Some(dst) = dst {
                    write!(f, "{} = ", dst)?;
                }
                write!(f, "call_{} {}(", mode, closure)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instr::Line { line } => write!(f, "line {}", line),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Operand]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}
