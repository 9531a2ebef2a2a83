#[path = "util.rs"]
mod util;

use util::{assert_compiles, assert_error_contains, compile_errors};

#[test]
fn var_declarations_are_rejected() {
    assert_error_contains("var x = 10", "Use 'let' or 'const' to declare a variable.");
}

#[test]
fn loose_equality_suggests_strict_operators() {
    assert_error_contains("1 == 2;", "Do not use the '==' operator. Use '===' instead.");
    assert_error_contains("1 != 2;", "Do not use the '!=' operator. Use '!==' instead.");
    assert_compiles("let a = 1 === 2; let b = 1 !== 2;");
}

#[test]
fn destructuring_is_rejected_everywhere() {
    assert_error_contains("let [a, b] = [1, 2];", "Destructuring patterns are not supported.");
    assert_error_contains("let {x} = {x: 1};", "Destructuring patterns are not supported.");
    assert_error_contains(
        "let a = [1]; let b = [2]; [a] = b;",
        "Destructuring patterns are not supported.",
    );
}

#[test]
fn forbidden_statements_are_rejected() {
    assert_error_contains("throw 1;", "Do not use the 'throw' statement.");
    assert_error_contains("try { } catch (e) { }", "Do not use the 'try' statement.");
    assert_error_contains("with (x) { }", "Do not use the 'with' statement.");
    assert_error_contains("for (let k in o) { }", "Do not use for-in loops.");
    assert_error_contains("for (let v of a) { }", "Do not use for-of loops.");
}

#[test]
fn forbidden_operators_are_rejected() {
    assert_error_contains("let o = {x: 1}; let b = 'x' in o;", "Do not use the 'in' operator.");
    assert_error_contains("let b = 1 instanceof 2;", "Do not use the 'instanceof' operator.");
    assert_error_contains("let o = {x: 1}; delete o.x;", "Do not use the 'delete' operator.");
    assert_error_contains("let t = typeof 1;", "Do not use the 'typeof' operator.");
    assert_error_contains("let v = void 0;", "Do not use the 'void' operator.");
}

#[test]
fn compound_bitwise_assignment_is_rejected() {
    assert_error_contains("let x = 1; x &= 2;", "Do not use the '&=' operator.");
    assert_error_contains("let x = 1; x <<= 2;", "Do not use the '<<=' operator.");
    assert_compiles("let x = 1; x += 2; x -= 1; x *= 3; x /= 2; x %= 2;");
}

#[test]
fn postfix_updates_are_rejected() {
    assert_error_contains(
        "let x = 1; x++;",
        "Do not use post-increment or post-decrement operators.",
    );
    assert_compiles("let x = 1; ++x; --x;");
}

#[test]
fn rest_parameters_are_rejected() {
    assert_error_contains("function f(...args) { }", "Do not use rest parameters.");
}

#[test]
fn object_literal_keys_must_be_unique_identifiers() {
    assert_error_contains(
        "let o = {'a b': 1};",
        "Object member name must be an identifier.",
    );
    assert_error_contains(
        "let o = {x: 1, x: 2};",
        "Object member name 'x' may only be used once.",
    );
}

#[test]
fn branches_and_loop_bodies_must_be_braced() {
    assert_error_contains(
        "let x = 0; if (true) x = 1;",
        "All branches of an if-statement must be enclosed in braces.",
    );
    assert_error_contains(
        "let x = 0; if (true) { x = 1; } else x = 2;",
        "All branches of an if-statement must be enclosed in braces.",
    );
    assert_compiles("let x = 0; if (true) { x = 1; } else if (false) { x = 2; } else { x = 3; }");
    assert_error_contains(
        "let i = 0; while (i < 3) ++i;",
        "The body of a loop must be enclosed in braces.",
    );
    assert_error_contains(
        "let s = 1; switch (s) { case 1: s = 2; }",
        "Each switch case must be enclosed in braces.",
    );
    assert_compiles("let s = 1; switch (s) { case 1: { s = 2; } }");
}

#[test]
fn for_loops_need_complete_headers() {
    assert_error_contains(
        "for (;;) { }",
        "A for-loop must have an initializer, a test, and an update expression.",
    );
    assert_error_contains(
        "let i = 0; for (i; i < 3; ++i) { }",
        "A for-loop initializer must be an assignment or a variable declaration.",
    );
    assert_compiles("for (let i = 0; i < 3; ++i) { }");
    assert_compiles("let i = 0; for (i = 0; i < 3; ++i) { }");
}

#[test]
fn assignments_are_forbidden_in_expression_positions() {
    let cases = [
        "let x = 0; if (x = 1) { }",
        "let x = 0; while (x = 1) { }",
        "let x = 0; do { } while (x = 1);",
        "let x = 0; for (let i = 0; x = 1; ++i) { }",
        "let x = 0; switch (x = 1) { }",
        "let x = 0; let y = (x = 1) && true;",
        "let x = 0; let y = (x = 1) + 2;",
        "let x = 0; let y = (x = 1) ? 1 : 2;",
        "let x = 0; let y = !(x = 1);",
    ];
    for case in cases {
        assert_error_contains(case, "Forbidden assignment expression.");
    }
    // Call arguments are not a forbidden position.
    assert_compiles("let x = 0; function f(a) { return a; } f(x = 1);");
}

#[test]
fn const_bindings_cannot_be_reassigned() {
    assert_error_contains(
        "const x = 1; x = 2;",
        "Cannot assign to 'x' because it is a 'const' variable.",
    );
    assert_error_contains(
        "const x = 1; ++x;",
        "Cannot assign to 'x' because it is a 'const' variable.",
    );
    assert_error_contains("const x;", "A 'const' variable must be initialized.");
    // Shadowing with let makes the inner name assignable again.
    assert_compiles("const x = 1; { let x = 2; x = 3; }");
}

#[test]
fn diagnostics_carry_line_numbers() {
    let errors = compile_errors("let a = 1;\nvar b = 2;");
    assert_eq!(errors, vec!["Use 'let' or 'const' to declare a variable."]);
    match guardscript::compile("let a = 1;\nvar b = 2;", guardscript::Options::default()) {
        Err(err) => assert_eq!(err.errors[0].line, 2),
        Ok(_) => panic!("expected compile error"),
    }
}

#[test]
fn multiple_diagnostics_are_collected_in_one_compile() {
    let errors = compile_errors("var a = 1;\nvar b = 2;\n1 == 2;");
    assert_eq!(errors.len(), 3);
}
