// File: src/main.rs
//
// Command-line driver for the IR interpreter.
// Loads a JSON compilation unit and either runs it through the top-level
// entry or prints its scopes and CFGs.

use clap::{Parser as ClapParser, Subcommand};
use ir_interp::config::Config;
use ir_interp::errors::{ErrorKind, InterpError};
use ir_interp::interpreter::{Interpreter, LogHooks, Runtime, ThreadContext};
use ir_interp::ir::{load_unit, CompilationUnit};
use ir_interp::value::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Host stack for the interpreter thread; sized for the default call depth
const INTERPRETER_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(ClapParser)]
#[command(
    name = "ir-interp",
    about = "Run CFG-based IR compilation units",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a compilation unit from its top-level entry
    Run {
        /// Path to the .json unit file
        file: PathBuf,

        /// Log every executed instruction
        #[arg(long)]
        debug: bool,

        /// Emit call/return events for named method calls
        #[arg(long)]
        trace: bool,

        /// Maximum nesting of method and block calls
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,
    },

    /// Print the scopes and instruction layout of a unit
    Dump {
        /// Path to the .json unit file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, debug, trace, max_depth } => {
            let env = Config::from_env();
            let config = env
                .clone()
                .with_debug(debug || env.debug)
                .with_trace_calls(trace || env.trace_calls)
                .with_max_call_depth(max_depth.unwrap_or(env.max_call_depth))
                .with_file(&file.display().to_string());
            init_logging(config.debug || config.trace_calls);

            let unit = load_or_exit(&file);
            let mut runtime = Runtime::new(config);
            if runtime.config().trace_calls {
                runtime = runtime.with_event_hooks(Arc::new(LogHooks));
            }

            match run_unit(&runtime, &unit) {
                Ok(value) => println!("{}", value),
                Err(err) => {
                    eprint!("{}", err);
                    process::exit(1);
                }
            }
        }

        Commands::Dump { file } => {
            let unit = load_or_exit(&file);
            print_unit(&unit);
        }
    }
}

fn run_unit(runtime: &Runtime, unit: &CompilationUnit) -> Result<Value, InterpError> {
    let outcome = thread::scope(|s| {
        thread::Builder::new()
            .name("interpreter".to_string())
            .stack_size(INTERPRETER_STACK_SIZE)
            .spawn_scoped(s, || {
                let mut state = ThreadContext::new(runtime.config().file.as_str());
                Interpreter::new(runtime, unit).interpret_top(&mut state, &Value::Nil)
            })
            .map(|handle| handle.join())
    });

    match outcome {
        Ok(Ok(result)) => result.map_err(|signal| InterpError::from_signal(&signal)),
        Ok(Err(_)) => Err(InterpError::new(ErrorKind::FatalError, "interpreter thread panicked".to_string())),
        Err(e) => Err(InterpError::new(ErrorKind::FatalError, format!("failed to start interpreter thread: {}", e))),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_or_exit(file: &Path) -> CompilationUnit {
    let source = match fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprint!("{}", InterpError::load_error(format!("failed to read '{}': {}", file.display(), e)));
            process::exit(1);
        }
    };

    match load_unit(&source) {
        Ok(unit) => unit,
        Err(e) => {
            eprint!("{}", e);
            process::exit(1);
        }
    }
}

fn print_unit(unit: &CompilationUnit) {
    println!("unit {} (root {})", unit.name(), unit.root_method());
    for scope in unit.scopes() {
        print!("{} {} ({})", scope.id(), scope.name(), scope.kind());
        if let Some(method) = scope.lexical_method() {
            print!(" in {}", method);
        }
        println!();
        print!("{}", scope.cfg());
    }
}
