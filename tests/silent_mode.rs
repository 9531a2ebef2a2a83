use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use guardscript::pipeline::{compile, Options, RunResult};

fn run_silent(source: &str) -> (RunResult, Vec<String>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let opts = Options {
        console_log: Rc::new(move |text| sink.borrow_mut().push(text.to_string())),
        version: None,
        whitelist_code: HashMap::new(),
        silent: true,
    };
    let compiled = compile(source, opts).expect("silent mode never fails the compile");
    let mut result = None;
    compiled.run(|r| result = Some(r));
    let output = log.borrow().clone();
    (result.expect("program was stopped"), output)
}

#[test]
fn diagnostics_are_logged_but_execution_proceeds() {
    let (result, output) = run_silent("var x = 10;\nconsole.log(x + 1);");
    assert!(matches!(result, RunResult::Normal { .. }));
    assert_eq!(output, vec!["11".to_string()]);
}

#[test]
fn check_failures_return_sentinels_and_continue() {
    let (result, output) = run_silent(
        "let o = {x: 1};\nconsole.log(o.missing);\nconsole.log('still running');",
    );
    assert!(matches!(result, RunResult::Normal { .. }));
    assert_eq!(output, vec!["undefined".to_string(), "still running".to_string()]);
}

#[test]
fn non_boolean_tests_fall_back_to_truthiness() {
    let (result, output) = run_silent("if (42) { console.log('taken'); }");
    assert!(matches!(result, RunResult::Normal { .. }));
    assert_eq!(output, vec!["taken".to_string()]);
}

#[test]
fn failed_arithmetic_becomes_nan() {
    let (result, output) = run_silent("console.log('a' * 2);");
    assert!(matches!(result, RunResult::Normal { .. }));
    assert_eq!(output, vec!["NaN".to_string()]);
}
