#[path = "util.rs"]
mod util;

use std::time::Instant;

use util::{compile_ok, run_error, run_value};

#[test]
fn infinite_test_times_out_and_later_tests_still_run() {
    let source = "test('loop', function() { while (true) { } });\n\
                  console.log(summary(false).output);";
    let (compiled, log) = compile_ok(source);
    compiled.enable_tests(true, 2000);

    let started = Instant::now();
    let mut finished = false;
    compiled.run(|result| {
        if let guardscript::RunResult::Exception { value, stack } = result {
            panic!("unexpected exception '{}' (stack: {stack:?})", value);
        }
        finished = true;
    });
    assert!(finished);
    let elapsed = started.elapsed();
    assert!(
        elapsed.as_millis() >= 1990 && elapsed.as_millis() < 4000,
        "test deadline not honoured: {elapsed:?}"
    );

    let output = log.borrow().join("\n");
    assert_eq!(
        output,
        " FAILED  loop\n         Time limit exceeded.\nTests:     1 failed, 0 passed, 1 total."
    );

    // The scheduler is healthy again: a subsequent test runs, passes and
    // appears in the next summary.
    compiled.enable_tests(true, 2000);
    let mut second = None;
    compiled.eval(
        "test('ok', function() { });\nsummary(false).output;",
        |result| second = Some(result),
    );
    match second.expect("eval was stopped") {
        guardscript::RunResult::Normal { value } => {
            let output = value.to_string();
            assert!(output.contains(" OK      ok"), "summary: {output}");
            assert!(
                output.contains("Tests:     0 failed, 1 passed, 1 total."),
                "summary: {output}"
            );
        }
        guardscript::RunResult::Exception { value, stack } => {
            panic!("unexpected exception '{}' (stack: {stack:?})", value)
        }
    }
}

#[test]
fn failing_and_passing_tests_are_both_reported() {
    let source = "test('math works', function() { assert(1 + 1 === 2); });\n\
                  test('math is broken', function() { assert(1 + 1 === 3); });\n\
                  summary(false).output;";
    let (compiled, _) = compile_ok(source);
    compiled.enable_tests(true, 2000);
    let mut result = None;
    compiled.run(|r| result = Some(r));
    let output = match result.expect("program was stopped") {
        guardscript::RunResult::Normal { value } => value.to_string(),
        guardscript::RunResult::Exception { value, stack } => {
            panic!("unexpected exception '{}' (stack: {stack:?})", value)
        }
    };
    assert!(output.contains(" OK      math works"), "summary: {output}");
    assert!(
        output.contains(" FAILED  math is broken\n         Assertion failed."),
        "summary: {output}"
    );
    assert!(output.contains("Tests:     1 failed, 1 passed, 2 total."));
}

#[test]
fn assert_demands_a_boolean() {
    assert_eq!(run_error("assert(42);"), "Assertion argument '42' is not a boolean value.");
    assert_eq!(run_error("assert(false);"), "Assertion failed.");
    assert!(run_value("assert(true);").strict_eq(&guardscript::Value::Bool(true)));
}

#[test]
fn tests_are_skipped_when_not_enabled() {
    // Without enableTests, test() does nothing and the loop never runs.
    let value = run_value("let ran = false; test('skipped', function() { ran = true; }); ran;");
    assert!(value.strict_eq(&guardscript::Value::Bool(false)));
}

#[test]
fn summary_without_enabling_reports_not_enabled() {
    let value = run_value("summary(false).output;");
    assert!(value.to_string().contains("Testing is not enabled."));
}

#[test]
fn summary_hints_when_no_tests_written() {
    let (compiled, _) = compile_ok("summary(false).output;");
    compiled.enable_tests(true, 2000);
    let mut result = None;
    compiled.run(|r| result = Some(r));
    let output = match result.expect("program was stopped") {
        guardscript::RunResult::Normal { value } => value.to_string(),
        _ => panic!("expected normal result"),
    };
    assert!(output.starts_with("No tests written."), "summary: {output}");
}

#[test]
fn test_failures_do_not_stop_the_program() {
    let value = run_value(
        "enableTests(true, 2000);\n\
         test('boom', function() { let o = {}; return o.missing; });\n\
         test('fine', function() { assert(true); });\n\
         let s = summary(false);\n\
         s.output;",
    );
    let output = value.to_string();
    assert!(
        output.contains(" FAILED  boom\n         Object does not have member 'missing'."),
        "summary: {output}"
    );
    assert!(output.contains(" OK      fine"), "summary: {output}");
    assert!(output.contains("Tests:     1 failed, 1 passed, 2 total."));
}

#[test]
fn enable_tests_from_script_resets_records() {
    let value = run_value(
        "enableTests(true, 2000);\n\
         test('first', function() { });\n\
         enableTests(true, 2000);\n\
         test('second', function() { });\n\
         summary(false).output;",
    );
    let output = value.to_string();
    assert!(!output.contains("first"), "records were not reset: {output}");
    assert!(output.contains(" OK      second"));
    assert!(output.contains("1 total."));
}
