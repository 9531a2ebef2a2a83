//! The compile pipeline: parse, rewrite, bind the sandbox globals, evaluate
//! whitelisted modules, and hand back a runnable handle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::Program;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::harness::TestState;
use crate::interpreter::value::Value;
use crate::interpreter::{Interpreter, RuntimeError};
use crate::parser::{parse_source, ParseError};
use crate::rewriter::rewrite_program;
use crate::sandbox::{self, Globals};
use crate::scheduler::{ExecControl, StopHandle};

/// Host-supplied options for one compile.
pub struct Options {
    /// Sink for `console.log` output.
    pub console_log: Rc<dyn Fn(&str)>,
    /// Invoked by the `version()` global; the host prints its own banner.
    pub version: Option<Rc<dyn Fn()>>,
    /// Module name to source text; each evaluates to that module's exported
    /// object, reachable through `require(name)`.
    pub whitelist_code: HashMap<String, String>,
    /// Silent mode: diagnostics and runtime check failures are logged
    /// through `tracing` and execution continues on a best-effort basis.
    pub silent: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            console_log: Rc::new(|text| println!("{}", text)),
            version: None,
            whitelist_code: HashMap::new(),
            silent: false,
        }
    }
}

/// Compile failure: the ordered diagnostics of one rewriter walk (or a
/// single entry for a syntax error).
#[derive(Debug, Error)]
#[error("{}", render_diagnostics(.errors))]
pub struct CompileError {
    pub errors: Vec<Diagnostic>,
}

impl CompileError {
    /// Newline-joined `Line L: message` rendering.
    pub fn render(&self) -> String {
        render_diagnostics(&self.errors)
    }
}

fn render_diagnostics(errors: &[Diagnostic]) -> String {
    errors
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result payload delivered to `run` / `eval` callbacks.
pub enum RunResult {
    Normal { value: Value },
    Exception { value: Value, stack: Vec<String> },
}

impl RunResult {
    pub fn exception_message(&self) -> Option<String> {
        match self {
            RunResult::Normal { .. } => None,
            RunResult::Exception { value, .. } => Some(value.to_string()),
        }
    }

    pub fn normal_value(&self) -> Option<&Value> {
        match self {
            RunResult::Normal { value } => Some(value),
            RunResult::Exception { .. } => None,
        }
    }
}

/// A compiled program: the rewritten tree plus the runtime state the
/// scheduler, sandbox and test harness share. The handle can run the
/// program, evaluate further snippets in its global environment, and stop
/// execution from another thread.
pub struct CompileOk {
    program: Program,
    globals: Rc<Globals>,
    control: Arc<ExecControl>,
    harness: Rc<RefCell<TestState>>,
    modules: Rc<RefCell<HashMap<String, Value>>>,
    console: Rc<dyn Fn(&str)>,
    version: Option<Rc<dyn Fn()>>,
    silent: bool,
}

impl std::fmt::Debug for CompileOk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOk").finish_non_exhaustive()
    }
}

pub fn compile(code: &str, opts: Options) -> Result<CompileOk, CompileError> {
    let program = parse_source(code).map_err(|err| CompileError {
        errors: vec![parse_diagnostic(&err)],
    })?;

    let mut sink = DiagnosticSink::new();
    let program = rewrite_program(program, &mut sink);
    if sink.has_errors() {
        if opts.silent {
            for diagnostic in sink.diagnostics() {
                tracing::warn!(line = diagnostic.line, message = %diagnostic.message, "compile diagnostic suppressed");
            }
        } else {
            return Err(CompileError {
                errors: sink.into_diagnostics(),
            });
        }
    }

    let compiled = CompileOk {
        program,
        globals: sandbox::build_globals(),
        control: ExecControl::new(),
        harness: Rc::new(RefCell::new(TestState::new())),
        modules: Rc::new(RefCell::new(HashMap::new())),
        console: Rc::clone(&opts.console_log),
        version: opts.version.clone(),
        silent: opts.silent,
    };
    compiled.load_modules(&opts.whitelist_code)?;
    Ok(compiled)
}

fn parse_diagnostic(err: &ParseError) -> Diagnostic {
    Diagnostic {
        line: err.position().line,
        message: err.to_string(),
    }
}

impl CompileOk {
    /// Execute the program from the top. `on_done` receives the result
    /// unless the program was stopped, in which case the pending stop
    /// callbacks fire instead.
    pub fn run(&self, on_done: impl FnOnce(RunResult)) {
        if let Some(result) = self.execute(&self.program) {
            on_done(result);
        }
    }

    /// Compile a snippet through the same rewriter and execute it in the
    /// program's global environment. Static errors are delivered as a
    /// single exception whose value is the newline-joined diagnostic list.
    pub fn eval(&self, code: &str, on_done: impl FnOnce(RunResult)) {
        let program = match parse_source(code) {
            Ok(program) => program,
            Err(err) => {
                on_done(RunResult::Exception {
                    value: Value::string(parse_diagnostic(&err).to_string()),
                    stack: Vec::new(),
                });
                return;
            }
        };
        let mut sink = DiagnosticSink::new();
        let program = rewrite_program(program, &mut sink);
        if sink.has_errors() && !self.silent {
            on_done(RunResult::Exception {
                value: Value::string(sink.render()),
                stack: Vec::new(),
            });
            return;
        }
        if let Some(result) = self.execute(&program) {
            on_done(result);
        }
    }

    /// Request that the running program halt at its next suspension point.
    /// Always succeeds; `on_stopped` fires once the program has yielded (or
    /// immediately if it is not running).
    pub fn stop(&self, on_stopped: impl FnOnce() + Send + 'static) {
        self.control.request_stop(Box::new(on_stopped));
    }

    /// A `Send + Sync` handle for stopping the program from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.control))
    }

    /// Reset the test records and arm the per-test deadline, like the
    /// `enableTests` global.
    pub fn enable_tests(&self, on: bool, timeout_ms: u64) {
        self.harness.borrow_mut().enable(on, timeout_ms);
    }

    /// The live global object: frozen built-ins plus program bindings.
    pub fn g(&self) -> Rc<Globals> {
        Rc::clone(&self.globals)
    }

    fn interpreter(&self, globals: Rc<Globals>) -> Interpreter {
        Interpreter::new(
            globals,
            Arc::clone(&self.control),
            Rc::clone(&self.harness),
            Rc::clone(&self.console),
            self.version.clone(),
            Rc::clone(&self.modules),
            self.silent,
        )
    }

    fn execute(&self, program: &Program) -> Option<RunResult> {
        if self.control.is_stopped() {
            return Some(RunResult::Exception {
                value: Value::string("Execution was stopped."),
                stack: Vec::new(),
            });
        }
        self.control.begin_run();
        let mut interp = self.interpreter(Rc::clone(&self.globals));
        let outcome = interp.eval_program(program);
        let result = match outcome {
            Ok(value) => Some(RunResult::Normal {
                value: value.unwrap_or(Value::Undefined),
            }),
            Err(RuntimeError::Stopped) => None,
            Err(err) => Some(RunResult::Exception {
                stack: interp.capture_stack(err.line()),
                value: Value::string(err.message()),
            }),
        };
        self.control.end_run();
        result
    }

    /// Evaluate each whitelisted module in its own fresh sandbox (sharing
    /// the module table so modules can require each other), then freeze the
    /// exported value.
    fn load_modules(&self, whitelist: &HashMap<String, String>) -> Result<(), CompileError> {
        let mut names: Vec<&String> = whitelist.keys().collect();
        names.sort();
        for name in names {
            let source = &whitelist[name];
            let program = parse_source(source).map_err(|err| CompileError {
                errors: vec![module_diagnostic(name, parse_diagnostic(&err))],
            })?;
            let mut sink = DiagnosticSink::new();
            let program = rewrite_program(program, &mut sink);
            if sink.has_errors() && !self.silent {
                return Err(CompileError {
                    errors: sink
                        .into_diagnostics()
                        .into_iter()
                        .map(|d| module_diagnostic(name, d))
                        .collect(),
                });
            }
            let module_globals = sandbox::build_globals();
            let mut interp = self.interpreter(module_globals);
            let exported = interp.eval_program(&program).map_err(|err| CompileError {
                errors: vec![module_diagnostic(
                    name,
                    Diagnostic {
                        line: err.line(),
                        message: err.message(),
                    },
                )],
            })?;
            let exported = exported.unwrap_or(Value::Undefined);
            sandbox::deep_freeze(&exported);
            self.modules
                .borrow_mut()
                .insert(name.clone(), exported);
        }
        Ok(())
    }
}

fn module_diagnostic(name: &str, diagnostic: Diagnostic) -> Diagnostic {
    Diagnostic {
        line: diagnostic.line,
        message: format!("module '{}': {}", name, diagnostic.message),
    }
}
