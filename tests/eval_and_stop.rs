#[path = "util.rs"]
mod util;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use guardscript::RunResult;
use util::compile_ok;

fn eval_value(compiled: &guardscript::CompileOk, code: &str) -> guardscript::Value {
    let mut result = None;
    compiled.eval(code, |r| result = Some(r));
    match result.expect("eval was stopped") {
        RunResult::Normal { value } => value,
        RunResult::Exception { value, stack } => {
            panic!("unexpected exception '{}' (stack: {stack:?})", value)
        }
    }
}

#[test]
fn eval_runs_in_the_program_global_environment() {
    let (compiled, _) = compile_ok("let counter = 10;");
    let mut ran = false;
    compiled.run(|_| ran = true);
    assert!(ran);

    assert!(eval_value(&compiled, "counter + 5;").strict_eq(&guardscript::Value::Number(15.0)));
    // Bindings created by one snippet persist into the next.
    eval_value(&compiled, "let more = counter * 2;");
    assert!(eval_value(&compiled, "more;").strict_eq(&guardscript::Value::Number(20.0)));
}

#[test]
fn eval_reports_static_errors_as_line_prefixed_exceptions() {
    let (compiled, _) = compile_ok("let a = 1;");
    let mut result = None;
    compiled.eval("var bad = 1;\nlet x; x;", |r| result = Some(r));
    match result.expect("eval was stopped") {
        RunResult::Exception { value, stack } => {
            assert_eq!(
                value.to_string(),
                "Line 1: Use 'let' or 'const' to declare a variable.\n\
                 Line 2: You must initialize the variable 'x' before use."
            );
            assert!(stack.is_empty());
        }
        RunResult::Normal { value } => panic!("expected exception, got '{}'", value),
    }
}

#[test]
fn stop_interrupts_an_infinite_loop_from_another_thread() {
    let (compiled, _) = compile_ok("let i = 0; while (true) { i = i + 1; }");
    let stopped = Arc::new(AtomicBool::new(false));
    let observer = Arc::clone(&stopped);
    let handle = compiled.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.stop(move || observer.store(true, Ordering::SeqCst));
    });

    let started = Instant::now();
    let mut done = false;
    compiled.run(|_| done = true);
    stopper.join().expect("stopper thread panicked");

    // The program yielded to the stop instead of completing.
    assert!(!done, "on_done must not fire for a stopped program");
    assert!(stopped.load(Ordering::SeqCst), "on_stopped must fire");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn stop_while_idle_fires_immediately_and_poisons_the_handle() {
    let (compiled, _) = compile_ok("1 + 1;");
    let stopped = Arc::new(AtomicBool::new(false));
    let observer = Arc::clone(&stopped);
    compiled.stop(move || observer.store(true, Ordering::SeqCst));
    assert!(stopped.load(Ordering::SeqCst));

    let mut result = None;
    compiled.run(|r| result = Some(r));
    match result.expect("run delivered nothing") {
        RunResult::Exception { value, .. } => {
            assert_eq!(value.to_string(), "Execution was stopped.");
        }
        RunResult::Normal { value } => panic!("expected stop exception, got '{}'", value),
    }
}

#[test]
fn pending_test_deadline_does_not_outlive_its_test() {
    // A test that finishes in time must not leave its deadline armed for
    // the statements after it.
    let (compiled, log) = compile_ok(
        "test('quick', function() { assert(true); });\n\
         let spin = 0;\n\
         while (spin < 100000) { spin = spin + 1; }\n\
         console.log(summary(false).output);",
    );
    compiled.enable_tests(true, 50);
    let mut result = None;
    compiled.run(|r| result = Some(r));
    match result.expect("program was stopped") {
        RunResult::Normal { .. } => {}
        RunResult::Exception { value, stack } => {
            panic!("unexpected exception '{}' (stack: {stack:?})", value)
        }
    }
    let output = log.borrow().join("\n");
    assert!(output.contains(" OK      quick"), "summary: {output}");
}
