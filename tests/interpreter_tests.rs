// Integration tests for the IR interpreter
//
// These tests load complete compilation units and run them through the
// top-level entry, checking results and the state left on the thread.
// Tests cover:
// - Straight-line code and branches
// - Rescue and ensure regions
// - Non-local break from blocks, procs and lambdas
// - Non-local return from closures and module bodies
// - Call-frame bookkeeping and trace events
// - Concurrent interpretation of one unit

use ir_interp::config::Config;
use ir_interp::interpreter::{EventHooks, EventLog, Interpreter, Runtime, ThreadContext, TraceEvent};
use ir_interp::ir::{load_unit, CompilationUnit};
use ir_interp::module::Module;
use ir_interp::signal::Signal;
use ir_interp::value::{JumpReason, Value};
use std::sync::Arc;

fn load(source: &str) -> CompilationUnit {
    match load_unit(source) {
        Ok(unit) => unit,
        Err(e) => panic!("failed to load unit: {}", e),
    }
}

fn run_with(runtime: &Runtime, unit: &CompilationUnit) -> (Result<Value, Signal>, ThreadContext) {
    let mut thread = ThreadContext::new("test.json");
    let result = Interpreter::new(runtime, unit).interpret_top(&mut thread, &Value::Nil);
    (result, thread)
}

fn run_code(source: &str) -> (Result<Value, Signal>, ThreadContext) {
    let unit = load(source);
    run_with(&Runtime::default(), &unit)
}

fn assert_clean(thread: &ThreadContext) {
    assert_eq!(thread.call_stack().depth(), 0, "call stack not unwound");
    assert_eq!(thread.backtrace_depth(), 0, "backtrace not unwound");
}

#[test]
fn test_top_level_returns_constant() {
    let (result, thread) = run_code(
        r#"{
            "name": "one",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "load_const", "value": {"int": 1}, "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(1)));
    assert_clean(&thread);
}

#[test]
fn test_lambda_break_returns_break_value() {
    let (result, thread) = run_code(
        r#"{
            "name": "lambda_break",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_block", "closure": 1, "mode": "lambda", "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "lambda in <main>", "kind": "closure", "lexical_method": 0, "code": [
                    {"op": "break", "value": {"const": {"int": 5}}, "target": 1}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(5)));
    assert_clean(&thread);
}

#[test]
fn test_break_from_detached_proc_is_local_jump_error() {
    let (result, thread) = run_code(
        r#"{
            "name": "proc_break",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_block", "closure": 1, "mode": "proc", "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "block in <main>", "kind": "closure", "lexical_method": 0, "code": [
                    {"op": "break", "value": {"const": {"int": 5}}, "target": 0}
                ]}
            ]
        }"#,
    );

    match result {
        Err(signal) => {
            assert!(signal.is_local_jump(JumpReason::Break));
            let exception = signal.exception().unwrap();
            assert_eq!(exception.message, "unexpected break");
            assert_eq!(exception.exit_value, Some(Value::Int(5)));
        }
        Ok(v) => panic!("Expected local jump error, got value {}", v),
    }
    assert_clean(&thread);
}

#[test]
fn test_block_break_lands_in_callers_result_slot() {
    let (result, _) = run_code(
        r#"{
            "name": "block_break",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1, "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "each", "kind": "method", "code": [
                    {"op": "call_block", "closure": 2, "mode": "block", "dst": 0},
                    {"op": "add", "lhs": {"reg": 0}, "rhs": {"const": {"int": 1}}, "dst": 1},
                    {"op": "return", "value": {"reg": 1}}
                ]},
                {"name": "block in each", "kind": "closure", "lexical_method": 1, "code": [
                    {"op": "break", "value": {"const": {"int": 5}}, "target": 1}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(6)));
}

#[test]
fn test_break_runs_intermediate_ensure_code() {
    let (result, thread) = run_code(
        r#"{
            "name": "break_ensure",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1, "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "outer", "kind": "method", "code": [
                    {"op": "call_block", "closure": 2, "mode": "block", "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "block in outer", "kind": "closure", "lexical_method": 1, "code": [
                    {"label": 0},
                    {"op": "call_block", "closure": 3, "mode": "block", "dst": 0},
                    {"label": 1},
                    {"op": "jump", "target": 3},
                    {"label": 2},
                    {"op": "line", "line": 7},
                    {"op": "resume_pending"},
                    {"label": 3}
                ], "regions": [{"start": 0, "end": 1, "ensure": 2}]},
                {"name": "block in block in outer", "kind": "closure", "lexical_method": 1, "code": [
                    {"op": "break", "value": {"const": {"int": 9}}, "target": 1}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(9)));
    assert_eq!(thread.line(), 7, "ensure code did not run");
    assert_clean(&thread);
}

#[test]
fn test_break_escaping_lambda_frame_is_local_jump_error() {
    let (result, _) = run_code(
        r#"{
            "name": "lambda_escape",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_block", "closure": 1, "mode": "lambda", "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "lambda in <main>", "kind": "closure", "lexical_method": 0, "code": [
                    {"op": "call_block", "closure": 2, "mode": "block", "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "block in <main>", "kind": "closure", "lexical_method": 0, "code": [
                    {"op": "break", "value": {"const": {"int": 9}}, "target": 0}
                ]}
            ]
        }"#,
    );
    let signal = result.unwrap_err();
    assert!(signal.is_local_jump(JumpReason::Break));
    assert_eq!(signal.exception().unwrap().exit_value, Some(Value::Int(9)));
}

#[test]
fn test_break_reaching_top_level_is_local_jump_error() {
    let (result, thread) = run_code(
        r#"{
            "name": "top_break",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_block", "closure": 1, "mode": "block"},
                    {"op": "return", "value": {"const": {"int": 0}}}
                ]},
                {"name": "block in other", "kind": "closure", "lexical_method": 2, "code": [
                    {"op": "break", "value": {"const": {"int": 3}}, "target": 2}
                ]},
                {"name": "other", "kind": "method", "code": []}
            ]
        }"#,
    );
    let signal = result.unwrap_err();
    assert!(signal.is_local_jump(JumpReason::Break));
    assert_eq!(signal.exception().unwrap().message, "unexpected break");
    assert_clean(&thread);
}

#[test]
fn test_local_jump_error_is_rescuable() {
    let (result, _) = run_code(
        r#"{
            "name": "rescue_lje",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"label": 0},
                    {"op": "call_block", "closure": 1, "mode": "proc"},
                    {"label": 1},
                    {"op": "return", "value": {"const": {"int": 0}}},
                    {"label": 2},
                    {"op": "receive_exception", "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ], "regions": [{"start": 0, "end": 1, "rescue": 2}]},
                {"name": "block in <main>", "kind": "closure", "lexical_method": 0, "code": [
                    {"op": "break", "value": {"const": {"int": 5}}, "target": 0}
                ]}
            ]
        }"#,
    );
    let value = result.unwrap();
    let exception = value.as_exception().unwrap();
    assert_eq!(exception.class, "LocalJumpError");
    assert_eq!(exception.reason, Some(JumpReason::Break));
}

#[test]
fn test_closure_return_unwinds_to_owning_method() {
    let (result, thread) = run_code(
        r#"{
            "name": "block_return",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1, "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "find", "kind": "method", "code": [
                    {"op": "call_block", "closure": 2, "mode": "block"},
                    {"op": "return", "value": {"const": {"int": 1}}}
                ]},
                {"name": "block in find", "kind": "closure", "lexical_method": 1, "code": [
                    {"op": "return", "value": {"const": {"int": 42}}, "method": 1}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(42)));
    assert_clean(&thread);
}

#[test]
fn test_closure_return_after_method_exit_is_local_jump_error() {
    let (result, thread) = run_code(
        r#"{
            "name": "escaped_return",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_block", "closure": 2, "mode": "proc"},
                    {"op": "return", "value": {"const": {"int": 0}}}
                ]},
                {"name": "make", "kind": "method", "code": []},
                {"name": "block in make", "kind": "closure", "lexical_method": 1, "code": [
                    {"op": "return", "value": {"const": {"int": 1}}, "method": 1}
                ]}
            ]
        }"#,
    );
    let signal = result.unwrap_err();
    assert!(signal.is_local_jump(JumpReason::Return));
    assert_eq!(signal.exception().unwrap().message, "unexpected return");
    assert_clean(&thread);
}

#[test]
fn test_lambda_return_only_leaves_the_lambda() {
    let (result, _) = run_code(
        r#"{
            "name": "lambda_return",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_block", "closure": 1, "mode": "lambda", "dst": 0},
                    {"op": "add", "lhs": {"reg": 0}, "rhs": {"const": {"int": 1}}, "dst": 1},
                    {"op": "return", "value": {"reg": 1}}
                ]},
                {"name": "lambda in <main>", "kind": "closure", "lexical_method": 0, "code": [
                    {"op": "return", "value": {"const": {"int": 1}}, "method": 0}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(2)));
}

#[test]
fn test_module_body_explicit_return_targets_enclosing_method() {
    let (result, _) = run_code(
        r#"{
            "name": "module_return",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1, "dst": 0},
                    {"op": "return", "value": {"const": {"int": 100}}}
                ]},
                {"name": "<module:Config>", "kind": "module_body", "code": [
                    {"op": "return", "value": {"const": {"int": 7}}, "method": 0}
                ]}
            ]
        }"#,
    );
    assert_eq!(result, Ok(Value::Int(7)));
}

#[test]
fn test_raise_captures_backtrace_of_named_frames() {
    let (result, thread) = run_code(
        r#"{
            "name": "backtrace",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "line", "line": 3},
                    {"op": "call_method", "method": 1}
                ]},
                {"name": "helper", "kind": "method", "code": [
                    {"op": "raise", "value": {"const": {"str": "boom"}}}
                ]}
            ]
        }"#,
    );
    let signal = result.unwrap_err();
    let exception = signal.exception().unwrap();
    assert_eq!(exception.class, "RuntimeError");
    assert_eq!(exception.backtrace, vec!["test.json:3:in `Object#helper'".to_string()]);
    assert_clean(&thread);
}

#[test]
fn test_root_module_assignment_is_idempotent() {
    let unit = load(
        r#"{
            "name": "module",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1}
                ]},
                {"name": "fail", "kind": "method", "code": [
                    {"op": "raise", "value": {"const": {"str": "x"}}}
                ]}
            ]
        }"#,
    );
    assert!(unit.set_root_module(Arc::new(Module::new("Custom"))));

    let runtime = Runtime::default();
    for _ in 0..2 {
        let (result, _) = run_with(&runtime, &unit);
        let signal = result.unwrap_err();
        assert_eq!(signal.exception().unwrap().backtrace, vec!["test.json:0:in `Custom#fail'".to_string()]);
    }
    assert_eq!(unit.root_module().unwrap().name(), "Custom");
    assert!(!unit.set_root_module(Arc::new(Module::new("Other"))));
}

const TRACED: &str = r#"{
    "name": "traced",
    "scopes": [
        {"name": "<main>", "kind": "script", "code": [
            {"op": "call_method", "method": 1, "dst": 0},
            {"op": "return", "value": {"reg": 0}}
        ]},
        {"name": "work", "kind": "method", "code": [
            {"op": "return", "value": {"const": {"int": 1}}}
        ]}
    ]
}"#;

#[test]
fn test_trace_events_surround_named_calls_only() {
    let unit = load(TRACED);
    let log = Arc::new(EventLog::new());
    let runtime = Runtime::new(Config::default().with_trace_calls(true)).with_event_hooks(log.clone());

    let (result, thread) = run_with(&runtime, &unit);
    assert_eq!(result, Ok(Value::Int(1)));
    assert_clean(&thread);

    let records = log.records();
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].event, records[0].name.as_str()), (TraceEvent::Call, "work"));
    assert_eq!((records[1].event, records[1].name.as_str()), (TraceEvent::Return, "work"));
    assert_eq!(records[1].module, "Object");
}

#[test]
fn test_no_trace_events_when_tracing_disabled() {
    let unit = load(TRACED);
    let log = Arc::new(EventLog::new());
    let runtime = Runtime::new(Config::default()).with_event_hooks(log.clone());

    let (result, _) = run_with(&runtime, &unit);
    assert_eq!(result, Ok(Value::Int(1)));
    assert!(log.records().is_empty());
}

struct FailingReturnHook;

impl EventHooks for FailingReturnHook {
    fn trace(&self, event: TraceEvent, _name: &str, _module: &Module) -> Result<(), Signal> {
        match event {
            TraceEvent::Call => Ok(()),
            TraceEvent::Return => Err(Signal::fatal("hook failed")),
        }
    }
}

#[test]
fn test_failing_return_hook_still_unwinds_frames() {
    let unit = load(TRACED);
    let runtime =
        Runtime::new(Config::default().with_trace_calls(true)).with_event_hooks(Arc::new(FailingReturnHook));

    let (result, thread) = run_with(&runtime, &unit);
    assert_eq!(result, Err(Signal::fatal("hook failed")));
    assert_clean(&thread);
}

#[test]
fn test_failing_return_hook_does_not_mask_in_flight_signal() {
    let unit = load(
        r#"{
            "name": "traced_raise",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1}
                ]},
                {"name": "work", "kind": "method", "code": [
                    {"op": "raise", "value": {"const": {"str": "boom"}}}
                ]}
            ]
        }"#,
    );
    let runtime =
        Runtime::new(Config::default().with_trace_calls(true)).with_event_hooks(Arc::new(FailingReturnHook));

    let (result, thread) = run_with(&runtime, &unit);
    let signal = result.unwrap_err();
    assert_eq!(signal.exception().unwrap().message, "boom");
    assert_clean(&thread);
}

#[test]
fn test_concurrent_interpretation_of_one_unit() {
    let unit = Arc::new(load(
        r#"{
            "name": "shared",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"op": "call_method", "method": 1, "dst": 0},
                    {"op": "return", "value": {"reg": 0}}
                ]},
                {"name": "find", "kind": "method", "code": [
                    {"op": "call_block", "closure": 2, "mode": "block"},
                    {"op": "return", "value": {"const": {"int": 1}}}
                ]},
                {"name": "block in find", "kind": "closure", "lexical_method": 1, "code": [
                    {"op": "return", "value": {"const": {"int": 42}}, "method": 1}
                ]}
            ]
        }"#,
    ));
    let runtime = Arc::new(Runtime::default());

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let unit = Arc::clone(&unit);
                let runtime = Arc::clone(&runtime);
                s.spawn(move || run_with(&runtime, &unit).0)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(Value::Int(42)));
        }
    });
    assert_eq!(runtime.instructions_executed(), 4 * 4);
}

#[test]
fn test_deep_recursion_is_fatal_instead_of_crashing() {
    let unit = load(
        r#"{
            "name": "recursion",
            "scopes": [
                {"name": "<main>", "kind": "script", "code": [
                    {"label": 0},
                    {"op": "call_method", "method": 1},
                    {"label": 1},
                    {"op": "return", "value": {"const": {"int": 0}}},
                    {"label": 2},
                    {"op": "line", "line": 4},
                    {"op": "resume_pending"}
                ], "regions": [{"start": 0, "end": 1, "ensure": 2}]},
                {"name": "f", "kind": "method", "code": [
                    {"op": "call_method", "method": 1}
                ]}
            ]
        }"#,
    );
    let runtime = Runtime::default();

    // Default depth on a host stack as large as the CLI gives the interpreter
    let (result, thread) = std::thread::scope(|s| {
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn_scoped(s, || run_with(&runtime, &unit))
            .unwrap()
            .join()
            .unwrap()
    });
    assert_eq!(result, Err(Signal::fatal("stack level too deep")));
    assert_eq!(thread.line(), 4, "ensure code did not run");
    assert_clean(&thread);
}
