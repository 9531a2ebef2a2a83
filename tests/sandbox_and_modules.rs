#[path = "util.rs"]
mod util;

use std::collections::HashMap;

use util::{compile_ok, compile_with_modules, run_error, run_output, run_value};

#[test]
fn unknown_globals_are_not_defined() {
    assert_eq!(run_error("mystery;"), "mystery is not defined.");
    assert_eq!(run_error("mystery();"), "mystery is not defined.");
}

#[test]
fn frozen_globals_cannot_be_overwritten() {
    assert_eq!(
        run_error("console = 5;"),
        "console is part of the global library, and cannot be overwritten."
    );
    assert_eq!(
        run_error("let undefined = 1;"),
        "undefined is part of the global library, and cannot be overwritten."
    );
    assert_eq!(
        run_error("Math = 1;"),
        "Math is part of the global library, and cannot be overwritten."
    );
}

#[test]
fn writes_to_new_names_create_program_bindings() {
    assert!(run_value("brandNew = 7; brandNew;").strict_eq(&guardscript::Value::Number(7.0)));
}

#[test]
fn console_log_reaches_the_host_sink() {
    let output = run_output("console.log('hello', 1 + 1, [1, 2], {x: true});");
    assert_eq!(output, vec!["hello 2 [1, 2] {x: true}".to_string()]);
}

#[test]
fn require_returns_frozen_module_values() {
    let mut whitelist = HashMap::new();
    whitelist.insert(
        "geometry".to_string(),
        "let geometry = {origin: {x: 0, y: 0}, dims: 2};\ngeometry;".to_string(),
    );
    let (compiled, log) = compile_with_modules(
        "let g = require('geometry');\nconsole.log(g.dims);\ng.dims = 3;",
        whitelist,
    );
    let mut result = None;
    compiled.run(|r| result = Some(r));
    match result.expect("program was stopped") {
        guardscript::RunResult::Exception { value, .. } => {
            assert_eq!(value.to_string(), "Cannot modify a frozen value.");
        }
        guardscript::RunResult::Normal { value } => {
            panic!("expected frozen-module write to fail, got '{}'", value)
        }
    }
    assert_eq!(log.borrow().as_slice(), ["2".to_string()]);
}

#[test]
fn require_rejects_unknown_modules() {
    assert_eq!(run_error("require('nope');"), "'nope' not found.");
}

#[test]
fn module_internals_do_not_leak_into_the_program() {
    let mut whitelist = HashMap::new();
    whitelist.insert(
        "m".to_string(),
        "let secret = 41;\nlet m = {answer: 42};\nm;".to_string(),
    );
    let (compiled, _) = compile_with_modules("secret;", whitelist);
    let mut result = None;
    compiled.run(|r| result = Some(r));
    match result.expect("program was stopped") {
        guardscript::RunResult::Exception { value, .. } => {
            assert_eq!(value.to_string(), "secret is not defined.");
        }
        guardscript::RunResult::Normal { value } => {
            panic!("module binding leaked: '{}'", value)
        }
    }
}

#[test]
fn array_create_builds_filled_sequences() {
    assert!(run_value("let a = Array.create(3, 7); a[0] + a[1] + a[2];")
        .strict_eq(&guardscript::Value::Number(21.0)));
    // Every slot shares the fill value, so object fills alias.
    assert!(run_value("let a = Array.create(2, {n: 0}); a[0].n = 5; a[1].n;")
        .strict_eq(&guardscript::Value::Number(5.0)));
    assert_eq!(
        run_error("Array.create(0, 1);"),
        "Array size must be a positive integer, instead received '0'."
    );
    assert_eq!(
        run_error("Array.create('x', 1);"),
        "Array size must be a positive integer, instead received 'x'."
    );
}

#[test]
fn direct_array_construction_is_refused() {
    assert_eq!(run_error("new Array(3);"), "Use Array.create(length, init).");
    assert_eq!(run_error("Array(3);"), "Use Array.create(length, init).");
}

#[test]
fn json_round_trips_object_literals() {
    let value = run_value(
        "let o = {name: 'ada', tags: ['math', 'logic'], depth: {level: 2}};\n\
         let back = JSON.parse(JSON.stringify(o));\n\
         back.name + ':' + back.tags[1] + ':' + JSON.stringify(back.depth);",
    );
    assert!(value.strict_eq(&guardscript::Value::string("ada:logic:{\"level\":2}")));
}

#[test]
fn json_parse_produces_ordinary_sequences() {
    assert!(run_value("JSON.parse('[1, 2, 3]').map(function(n) { return n * 2; })[2];")
        .strict_eq(&guardscript::Value::Number(6.0)));
    let message = run_error("JSON.parse('{oops');");
    assert!(message.starts_with("JSON.parse failed:"), "got: {message}");
}

#[test]
fn math_and_numeric_parsing_builtins_work() {
    assert!(run_value("Math.max(1, 9, 4);").strict_eq(&guardscript::Value::Number(9.0)));
    assert!(run_value("Math.floor(2.9);").strict_eq(&guardscript::Value::Number(2.0)));
    assert!(run_value("Math.sqrt(16);").strict_eq(&guardscript::Value::Number(4.0)));
    assert!(run_value("parseInt('42abc');").strict_eq(&guardscript::Value::Number(42.0)));
    assert!(run_value("parseInt('ff', 16);").strict_eq(&guardscript::Value::Number(255.0)));
    assert!(run_value("parseFloat('2.5rest');").strict_eq(&guardscript::Value::Number(2.5)));
    let nan = run_value("parseInt('nope');");
    assert!(matches!(nan, guardscript::Value::Number(n) if n.is_nan()));
    let random = run_value("let r = Math.random(); r >= 0 && r < 1;");
    assert!(random.strict_eq(&guardscript::Value::Bool(true)));
}

#[test]
fn object_introspection_preserves_insertion_order() {
    assert!(run_value("Object.keys({b: 1, a: 2}).join(',');")
        .strict_eq(&guardscript::Value::string("b,a")));
    assert!(run_value("Object.values({b: 1, a: 2})[1];")
        .strict_eq(&guardscript::Value::Number(2.0)));
    assert!(run_value("Object.entries({x: 9})[0][0];")
        .strict_eq(&guardscript::Value::string("x")));
    assert!(run_value("Object.getOwnPropertyNames({q: 1}).length;")
        .strict_eq(&guardscript::Value::Number(1.0)));
}

#[test]
fn the_global_handle_sees_program_bindings() {
    let (compiled, _) = compile_ok("let answer = 42;");
    compiled.run(|_| {});
    let globals = compiled.g();
    let value = globals.get("answer").expect("program binding visible through g");
    assert!(value.strict_eq(&guardscript::Value::Number(42.0)));
    assert!(globals.get("Math").is_some());
    assert!(globals.is_frozen("Math"));
}

#[test]
fn undefined_and_infinity_are_usable_values() {
    assert!(run_value("undefined === undefined;").strict_eq(&guardscript::Value::Bool(true)));
    assert!(run_value("Infinity;").strict_eq(&guardscript::Value::Number(f64::INFINITY)));
    assert!(run_value("let o = {x: undefined}; o.x === undefined;")
        .strict_eq(&guardscript::Value::Bool(true)));
}
