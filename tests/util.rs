#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use guardscript::pipeline::{compile, CompileOk, Options, RunResult};
use guardscript::Value;

pub type ConsoleLog = Rc<RefCell<Vec<String>>>;

/// Compile a source text with `console.log` captured into a buffer.
pub fn compile_ok(source: &str) -> (CompileOk, ConsoleLog) {
    compile_with_modules(source, HashMap::new())
}

pub fn compile_with_modules(
    source: &str,
    whitelist_code: HashMap<String, String>,
) -> (CompileOk, ConsoleLog) {
    let log: ConsoleLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let opts = Options {
        console_log: Rc::new(move |text| sink.borrow_mut().push(text.to_string())),
        version: None,
        whitelist_code,
        silent: false,
    };
    let compiled = compile(source, opts)
        .unwrap_or_else(|err| panic!("compile failed:\n{}", err.render()));
    (compiled, log)
}

/// The diagnostic messages a source fails to compile with.
pub fn compile_errors(source: &str) -> Vec<String> {
    match compile(source, Options::default()) {
        Ok(_) => Vec::new(),
        Err(err) => err.errors.into_iter().map(|d| d.message).collect(),
    }
}

pub fn assert_compiles(source: &str) {
    let errors = compile_errors(source);
    assert!(errors.is_empty(), "unexpected diagnostics: {errors:?}");
}

pub fn assert_error_contains(source: &str, needle: &str) {
    let errors = compile_errors(source);
    assert!(
        errors.iter().any(|message| message.contains(needle)),
        "expected a diagnostic containing '{needle}', got: {errors:?}"
    );
}

/// Run a program to completion and hand back the result.
pub fn run(source: &str) -> (RunResult, Vec<String>) {
    let (compiled, log) = compile_ok(source);
    let mut result = None;
    compiled.run(|r| result = Some(r));
    let result = result.expect("program was stopped");
    let output = log.borrow().clone();
    (result, output)
}

/// The completion value of a program expected to succeed.
pub fn run_value(source: &str) -> Value {
    match run(source).0 {
        RunResult::Normal { value } => value,
        RunResult::Exception { value, stack } => {
            panic!("unexpected exception '{}' (stack: {stack:?})", value)
        }
    }
}

/// The exception message of a program expected to fail.
pub fn run_error(source: &str) -> String {
    match run(source).0 {
        RunResult::Exception { value, .. } => value.to_string(),
        RunResult::Normal { value } => panic!("expected an exception, got '{}'", value),
    }
}

/// Everything the program logged through `console.log`.
pub fn run_output(source: &str) -> Vec<String> {
    run(source).1
}
