#[path = "util.rs"]
mod util;

use guardscript::Value;
use util::{run_error, run_output, run_value};

#[test]
fn functions_close_over_their_environment() {
    let src = r#"
function makeCounter() {
    let n = 0;
    return function() { n = n + 1; return n; };
}
let tick = makeCounter();
tick(); tick(); tick();
"#;
    assert!(run_value(src).strict_eq(&Value::Number(3.0)));
}

#[test]
fn recursion_works_and_overflow_is_reported() {
    let src = r#"
function fib(n) {
    if (n < 2) { return n; } else { return fib(n - 1) + fib(n - 2); }
}
fib(12);
"#;
    assert!(run_value(src).strict_eq(&Value::Number(144.0)));
    assert_eq!(run_error("function f(n) { return f(n); } f(1);"), "Stack overflow.");
}

#[test]
fn classes_support_constructors_methods_and_new() {
    let src = r#"
class Point {
    constructor(x, y) { this.x = x; this.y = y; }
    norm() { return Math.sqrt(this.x * this.x + this.y * this.y); }
}
let p = new Point(3, 4);
p.norm();
"#;
    assert!(run_value(src).strict_eq(&Value::Number(5.0)));
}

#[test]
fn constructor_arity_is_enforced() {
    let src = r#"
class Point {
    constructor(x, y) { this.x = x; this.y = y; }
}
new Point(3);
"#;
    assert_eq!(
        run_error(src),
        "Function Point.constructor expected 2 arguments but received 1 argument."
    );
}

#[test]
fn member_checks_apply_outside_the_constructor() {
    // Inside the constructor, `this.m = ...` creates members freely; in a
    // method the member must already exist.
    let src = r#"
class Box {
    constructor() { this.v = 0; }
    grow() { this.w = 1; }
}
new Box().grow();
"#;
    assert_eq!(run_error(src), "Object does not have member 'w'.");
}

#[test]
fn arrows_capture_lexical_this() {
    let src = r#"
class Scaler {
    constructor(k) { this.k = k; }
    scale(xs) { return xs.map(x => x * this.k); }
}
new Scaler(2).scale([1, 2, 3])[2];
"#;
    assert!(run_value(src).strict_eq(&Value::Number(6.0)));
}

#[test]
fn calling_a_class_without_new_is_an_error() {
    let src = r#"
class C {
    constructor() { this.x = 1; }
}
C();
"#;
    assert_eq!(
        run_error(src),
        "Class constructor C cannot be invoked without 'new'."
    );
    assert_eq!(run_error("new 5;"), "Expected a class, instead received '5'.");
}

#[test]
fn switch_matches_strictly_and_falls_through() {
    let src = r#"
function label(n) {
    let out = '';
    switch (n) {
        case 1: { out = out + 'one '; }
        case 2: { out = out + 'two '; break; }
        default: { out = 'other '; }
    }
    return out;
}
console.log(label(1));
console.log(label(2));
console.log(label(9));
"#;
    assert_eq!(run_output(src), vec!["one two ", "two ", "other "]);
}

#[test]
fn string_members_cover_length_and_split() {
    assert!(run_value("'a,b,c'.split(',').length;").strict_eq(&Value::Number(3.0)));
    assert!(run_value("'a,b,c'.split(',')[1];").strict_eq(&Value::string("b")));
    assert!(run_value("'abc'.split('')[0];").strict_eq(&Value::string("a")));
    assert!(run_value("'hello'.length;").strict_eq(&Value::Number(5.0)));
    assert!(run_value("'hi'.toUpperCase();").strict_eq(&Value::string("HI")));
    assert!(run_value("'WOW'.toLowerCase();").strict_eq(&Value::string("wow")));
    assert!(run_value("'abc'.charAt(1);").strict_eq(&Value::string("b")));
    assert_eq!(
        run_error("'abc'.reverse();"),
        "Object does not have member 'reverse'."
    );
}

#[test]
fn split_results_accept_sequence_operations() {
    // A split result is an ordinary sequence, so higher-order operations
    // (and their checks) work on it.
    assert!(run_value("'1,2,3'.split(',').map(function(s) { return s + '!'; })[0];")
        .strict_eq(&Value::string("1!")));
    let value = run_value("let f = 'a-b'.split; f('-')[1];");
    assert!(value.strict_eq(&Value::string("b")));
}

#[test]
fn array_methods_mutate_and_iterate() {
    assert!(run_value("let a = [1]; a.push(2, 3); a.length;").strict_eq(&Value::Number(3.0)));
    assert!(run_value("let a = [1, 2]; a.pop();").strict_eq(&Value::Number(2.0)));
    assert!(run_value("[1, 2, 3].filter(function(n) { return n % 2 === 1; }).length;")
        .strict_eq(&Value::Number(2.0)));
    assert!(run_value(
        "let total = 0; [1, 2, 3].forEach(function(n) { total = total + n; }); total;"
    )
    .strict_eq(&Value::Number(6.0)));
    assert!(run_value("[1, 2, 3].reduce(function(acc, n) { return acc + n; }, 10);")
        .strict_eq(&Value::Number(16.0)));
    assert!(run_value("['x', 'y'].join('-');").strict_eq(&Value::string("x-y")));
    assert!(run_value("[4, 5, 6].indexOf(5);").strict_eq(&Value::Number(1.0)));
    assert!(run_value("[1, 2, 3, 4].slice(1, 3).length;").strict_eq(&Value::Number(2.0)));
    assert_eq!(
        run_error("[1].filter(function(n) { return n; });"),
        "The 'filter' callback must return a boolean, instead received '1'."
    );
}

#[test]
fn sequence_callbacks_run_under_test_deadlines() {
    use std::time::Instant;
    let src = r#"
test('spin', function() {
    [1].forEach(function(n) { while (true) { } });
});
summary(false).output;
"#;
    let (compiled, _) = util::compile_ok(src);
    compiled.enable_tests(true, 300);
    let started = Instant::now();
    let mut result = None;
    compiled.run(|r| result = Some(r));
    let output = match result.expect("program was stopped") {
        guardscript::RunResult::Normal { value } => value.to_string(),
        guardscript::RunResult::Exception { value, stack } => {
            panic!("unexpected exception '{}' (stack: {stack:?})", value)
        }
    };
    assert!(started.elapsed().as_millis() < 4000);
    assert!(
        output.contains(" FAILED  spin\n         Time limit exceeded."),
        "summary: {output}"
    );
}

#[test]
fn conditional_expressions_enforce_boolean_tests() {
    assert!(run_value("let v = 1 < 2 ? 'yes' : 'no'; v;").strict_eq(&Value::string("yes")));
    assert_eq!(
        run_error("let v = 1 ? 'yes' : 'no';"),
        "Expected a boolean expression, instead received '1'."
    );
}

#[test]
fn do_while_runs_at_least_once() {
    assert!(run_value("let n = 0; do { n = n + 1; } while (false); n;")
        .strict_eq(&Value::Number(1.0)));
}

#[test]
fn null_is_a_value_but_not_object_shaped() {
    assert!(run_value("null === null;").strict_eq(&Value::Bool(true)));
    assert_eq!(
        run_error("let n = null; n.x;"),
        "Cannot access member 'x' of 'null'."
    );
    assert_eq!(
        run_error("let o = {x: undefined}; o.x.y;"),
        "Cannot access member 'y' of 'undefined'."
    );
}
