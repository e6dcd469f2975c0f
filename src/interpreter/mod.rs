// File: src/interpreter/mod.rs
//
// Instruction-level interpreter over per-scope CFGs.
//
// The dispatch loop walks a scope's flat instruction array with a single
// program counter. Branches come back from instructions as labels; every
// abrupt transfer comes back as a Signal. Each frame of the loop decides,
// from the signal kind, the CFG's protected regions and the identity of the
// executing scope, whether it consumes the signal, hands it to rescue or
// ensure code, or passes it to its caller unchanged.

mod context;
mod runtime;
mod thread;
mod trace;

pub use context::{Invocation, InterpreterContext};
pub use runtime::Runtime;
pub use thread::{BacktraceFrame, CallStack, ThreadContext};
pub use trace::{EventHooks, EventLog, LogHooks, TraceEvent, TraceRecord};

use crate::ir::{BlockMode, Cfg, CompilationUnit, Instr, Scope, ScopeId};
use crate::module::Module;
use crate::signal::{BreakJump, ReturnJump, Signal};
use crate::value::{JumpReason, Value};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one dispatch step that did not escape the frame
enum Step {
    Next,
    Goto(usize),
    Finish(Value),
}

/// Interpreter bound to one runtime and one compilation unit
///
/// Holds only shared references; any number of threads may interpret the same
/// unit at once, each with its own ThreadContext.
pub struct Interpreter<'a> {
    runtime: &'a Runtime,
    unit: &'a CompilationUnit,
}

impl<'a> Interpreter<'a> {
    pub fn new(runtime: &'a Runtime, unit: &'a CompilationUnit) -> Self {
        Self { runtime, unit }
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    pub fn unit(&self) -> &'a CompilationUnit {
        self.unit
    }

    /// Run the unit's root method against its root module
    pub fn interpret_top(&self, thread: &mut ThreadContext, self_value: &Value) -> Result<Value, Signal> {
        // A unit evaluated before keeps the module it was first given
        let module = self.unit.root_module_or_init(|| self.runtime.object_module());
        let root = self.unit.root_method();
        let mut ctx = InterpreterContext::new(Invocation::Method);

        let result = self.invoke_method(thread, root, &mut ctx, self_value, "", &module, false);
        if self.runtime.config().debug {
            info!(unit = %self.unit.name(), count = self.runtime.instructions_executed(), "interpreted instructions");
        }

        match result {
            Err(Signal::BreakJump(jump)) => Err(Signal::local_jump(
                JumpReason::Break,
                jump.value,
                "unexpected break",
                thread.backtrace_lines(),
            )),
            other => other,
        }
    }

    /// Invoke `scope` as a method: maintain the call stack, backtrace and
    /// trace events around the dispatch loop
    ///
    /// An empty `name` marks a synthetic invocation, which gets no backtrace
    /// entry. Both stacks are restored to their entry depth on every exit,
    /// including a post-call trace failure or a panic.
    #[allow(clippy::too_many_arguments)]
    pub fn invoke_method(
        &self,
        thread: &mut ThreadContext,
        scope: ScopeId,
        ctx: &mut InterpreterContext,
        self_value: &Value,
        name: &str,
        module: &Module,
        traceable: bool,
    ) -> Result<Value, Signal> {
        let synthetic = name.is_empty();
        let mut frame = FrameGuard::enter(thread);

        frame.call_stack_mut().push(scope);
        if !synthetic {
            frame.push_backtrace(module.name(), name);
        }

        let result = self
            .method_trace(traceable, TraceEvent::Call, name, module)
            .and_then(|()| self.interpret(&mut frame, self_value, scope, ctx));
        // The frame leaves the call stack before the return event; its
        // backtrace entry stays until after it
        frame.pop_call_stack();
        let post = self.method_trace(traceable, TraceEvent::Return, name, module);
        drop(frame);

        match (result, post) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(failure)) => Err(failure),
            (Err(signal), Ok(())) => Err(signal),
            (Err(signal), Err(failure)) => {
                warn!(method = %name, %failure, "return trace failed while unwinding; keeping in-flight signal");
                Err(signal)
            }
        }
    }

    fn method_trace(&self, traceable: bool, event: TraceEvent, name: &str, module: &Module) -> Result<(), Signal> {
        if traceable && self.runtime.has_event_hooks() {
            self.runtime.trace(event, name, module)?;
        }
        Ok(())
    }

    /// Execute one scope's instructions until they run out or a signal escapes
    ///
    /// Nesting deeper than the configured call depth is a Fatal signal, which
    /// the calling frames see through their ensure regions.
    pub fn interpret(
        &self,
        thread: &mut ThreadContext,
        self_value: &Value,
        scope_id: ScopeId,
        ctx: &mut InterpreterContext,
    ) -> Result<Value, Signal> {
        let nesting = thread.nesting();
        if nesting >= self.runtime.config().max_call_depth {
            return Err(Signal::fatal("stack level too deep"));
        }

        thread.set_nesting(nesting + 1);
        let result = self.dispatch(thread, self_value, scope_id, ctx);
        thread.set_nesting(nesting);
        result
    }

    fn dispatch(
        &self,
        thread: &mut ThreadContext,
        self_value: &Value,
        scope_id: ScopeId,
        ctx: &mut InterpreterContext,
    ) -> Result<Value, Signal> {
        let scope = self.scope(scope_id)?;
        let cfg = scope.cfg();
        let in_closure = scope.is_closure();
        let debug = self.runtime.config().debug;
        ctx.reserve_registers(cfg.register_count());

        let instrs = cfg.instructions();
        let n = instrs.len();
        let mut ipc = 0;
        let mut last_instr: Option<&Instr> = None;

        while ipc < n {
            let instr = &instrs[ipc];
            last_instr = Some(instr);
            self.runtime.count_instruction();

            if debug {
                debug!(scope = %scope.name(), ipc, "I: {}", instr);
            }

            let step = match instr.execute(self, thread, ctx, self_value) {
                Ok(None) => Ok(Step::Next),
                Ok(Some(label)) => cfg
                    .target_pc(label)
                    .map(Step::Goto)
                    .ok_or_else(|| Signal::fatal(&format!("branch to unplaced label {}", label))),
                Err(Signal::ReturnJump(jump)) => on_return_jump(scope_id, ctx, jump),
                Err(Signal::BreakJump(jump)) => {
                    self.on_break_jump(thread, scope, in_closure, ipc, instr, ctx, jump)
                }
                Err(signal) => Err(signal),
            };

            // Local jump faults synthesized above are ordinary raises and may be
            // rescued by this very frame.
            ipc = match step {
                Ok(Step::Next) => ipc + 1,
                Ok(Step::Goto(pc)) => pc,
                Ok(Step::Finish(value)) => return Ok(value),
                Err(Signal::Raise(exception)) => {
                    if debug {
                        debug!(scope = %scope.name(), ipc, %exception, "caught raise");
                    }
                    match cfg.rescuer_for(ipc) {
                        Some(pc) => {
                            ctx.set_pending(Signal::Raise(exception));
                            pc
                        }
                        None => return Err(Signal::Raise(exception)),
                    }
                }
                // Fatal conditions are never seen by rescue code
                Err(Signal::Fatal(fatal)) => match cfg.ensurer_for(ipc) {
                    Some(pc) => {
                        ctx.set_pending(Signal::Fatal(fatal));
                        pc
                    }
                    None => return Err(Signal::Fatal(fatal)),
                },
                Err(jump) => return Err(jump),
            };
        }

        let rv = ctx.return_value().clone();

        // A closure that returned (not as a lambda) returns from its method
        if let Some(Instr::Return { method, .. }) = last_instr {
            if !ctx.in_lambda() {
                let method = *method;
                if in_closure && !method.is_some_and(|m| thread.call_stack().contains(m)) {
                    if debug {
                        debug!(scope = %scope.name(), "raising unexpected return local jump error");
                    }
                    return Err(Signal::local_jump(
                        JumpReason::Return,
                        rv,
                        "unexpected return",
                        thread.backtrace_lines(),
                    ));
                } else if in_closure || method.is_some() {
                    // Explicit target on non-closures: returns from class/module bodies
                    return Err(Signal::return_jump(method, rv));
                }
            }
        }

        Ok(rv)
    }

    #[allow(clippy::too_many_arguments)]
    fn on_break_jump(
        &self,
        thread: &ThreadContext,
        scope: &Scope,
        in_closure: bool,
        ipc: usize,
        instr: &Instr,
        ctx: &mut InterpreterContext,
        mut jump: BreakJump,
    ) -> Result<Step, Signal> {
        let cfg: &Cfg = scope.cfg();

        if instr.is_break() {
            if !in_closure || ctx.in_proc() {
                return Err(unexpected_break(thread, jump));
            }
            // Breaking out of a lambda pops exactly one level up
            if ctx.in_lambda() {
                jump.caught_by_lambda = true;
            }
            return Err(Signal::BreakJump(jump));
        }

        if ctx.in_lambda() {
            // Unwound past the frame that should have stopped it
            return Err(unexpected_break(thread, jump));
        }

        if jump.caught_by_lambda || jump.target == scope.id() {
            if let Some(dst) = instr.result_slot() {
                ctx.set(dst, jump.value);
            }
            return Ok(Step::Next);
        }

        // Still breaking upwards: run this frame's ensure code first
        match cfg.ensurer_for(ipc) {
            Some(pc) => {
                ctx.set_pending(Signal::BreakJump(jump));
                Ok(Step::Goto(pc))
            }
            None => Err(Signal::BreakJump(jump)),
        }
    }

    /// Invoke a method scope on behalf of a call instruction
    pub(crate) fn call_method(
        &self,
        thread: &mut ThreadContext,
        method: ScopeId,
        args: Vec<Value>,
        self_value: &Value,
    ) -> Result<Value, Signal> {
        let scope = self.scope(method)?;
        let module = self.owning_module();
        let mut ctx = InterpreterContext::with_args(Invocation::Method, args);
        self.invoke_method(
            thread,
            method,
            &mut ctx,
            self_value,
            scope.name(),
            &module,
            self.runtime.config().trace_calls,
        )
    }

    /// Closures run directly on the caller's thread state; they are not
    /// method frames and never appear on the call stack
    pub(crate) fn call_block(
        &self,
        thread: &mut ThreadContext,
        closure: ScopeId,
        mode: BlockMode,
        args: Vec<Value>,
        self_value: &Value,
    ) -> Result<Value, Signal> {
        let mut ctx = InterpreterContext::with_args(mode.into(), args);
        self.interpret(thread, self_value, closure, &mut ctx)
    }

    fn owning_module(&self) -> Arc<Module> {
        self.unit.root_module().unwrap_or_else(|| self.runtime.object_module())
    }

    fn scope(&self, id: ScopeId) -> Result<&'a Scope, Signal> {
        self.unit
            .scope(id)
            .ok_or_else(|| Signal::fatal(&format!("{} is not part of unit {}", id, self.unit.name())))
    }
}

fn on_return_jump(scope_id: ScopeId, ctx: &InterpreterContext, jump: ReturnJump) -> Result<Step, Signal> {
    if ctx.in_lambda() || jump.target == Some(scope_id) {
        return Ok(Step::Finish(jump.value));
    }
    Err(Signal::ReturnJump(jump))
}

fn unexpected_break(thread: &ThreadContext, jump: BreakJump) -> Signal {
    Signal::local_jump(JumpReason::Break, jump.value, "unexpected break", thread.backtrace_lines())
}

/// Restores call stack, backtrace and nesting depth when a method frame ends
struct FrameGuard<'t> {
    thread: &'t mut ThreadContext,
    call_depth: usize,
    backtrace_depth: usize,
    nesting: usize,
}

impl<'t> FrameGuard<'t> {
    fn enter(thread: &'t mut ThreadContext) -> Self {
        let call_depth = thread.call_stack().depth();
        let backtrace_depth = thread.backtrace_depth();
        let nesting = thread.nesting();
        Self { thread, call_depth, backtrace_depth, nesting }
    }

    fn pop_call_stack(&mut self) {
        self.thread.call_stack_mut().truncate(self.call_depth);
    }
}

impl Deref for FrameGuard<'_> {
    type Target = ThreadContext;

    fn deref(&self) -> &ThreadContext {
        self.thread
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut ThreadContext {
        self.thread
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.thread.truncate_backtrace(self.backtrace_depth);
        self.thread.call_stack_mut().truncate(self.call_depth);
        self.thread.set_nesting(self.nesting);
    }
}
