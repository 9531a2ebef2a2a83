#[path = "util.rs"]
mod util;

use util::{assert_compiles, assert_error_contains};

const UNINIT_X: &str = "You must initialize the variable 'x' before use.";

#[test]
fn reading_an_unassigned_variable_is_a_compile_error() {
    assert_error_contains("let x; x;", UNINIT_X);
    assert_compiles("let x; x = 1; x;");
    assert_compiles("let x = 0; x;");
}

#[test]
fn plain_blocks_promote_into_the_enclosing_scope() {
    assert_compiles("let x; { x = 1; } x;");
    assert_error_contains("let x; { let y = 1; } x;", UNINIT_X);
}

#[test]
fn exhaustive_if_chains_promote_only_common_assignments() {
    assert_compiles("let x; if (true) { x = 0; x; } else { x = 1; x; } x;");
    assert_error_contains("let x; if (true) { x = 0; } x;", UNINIT_X);
    assert_error_contains(
        "let x; let y; if (true) { x = 0; y = 0; } else { x = 1; } y;",
        "You must initialize the variable 'y' before use.",
    );
    assert_compiles(
        "let x; if (true) { x = 0; } else if (false) { x = 1; } else { x = 2; } x;",
    );
    // A chain without a final else is not exhaustive.
    assert_error_contains(
        "let x; if (true) { x = 0; } else if (false) { x = 1; } x;",
        UNINIT_X,
    );
}

#[test]
fn branch_reads_before_assignment_are_still_flagged() {
    assert_error_contains("let x; if (true) { x; x = 1; } else { x = 2; } x;", UNINIT_X);
}

#[test]
fn loop_bodies_do_not_promote() {
    assert_error_contains("let x; while (true) { x = 1; } x;", UNINIT_X);
    assert_error_contains("let x; for (let i = 0; i < 3; ++i) { x = 1; } x;", UNINIT_X);
    // Inside the loop body the assignment does count.
    assert_compiles("let x; while (true) { x = 1; x; }");
}

#[test]
fn do_while_bodies_run_once_and_promote() {
    assert_compiles("let x; do { x = 1; } while (false); x;");
}

#[test]
fn switch_promotes_only_with_a_default_and_all_cases() {
    assert_compiles(
        "let x; let s = 1; switch (s) { case 1: { x = 1; break; } default: { x = 0; } } x;",
    );
    assert_error_contains(
        "let x; let s = 1; switch (s) { case 1: { x = 1; break; } case 2: { x = 2; break; } } x;",
        UNINIT_X,
    );
    assert_error_contains(
        "let x; let s = 1; switch (s) { case 1: { x = 1; break; } default: { s = 2; } } x;",
        UNINIT_X,
    );
}

#[test]
fn function_scopes_are_independent() {
    // The body of a nested function does not see the outer uninitialized
    // set, and its assignments do not leak out.
    assert_compiles("let x; function f() { return x; } x = 1; f();");
    assert_error_contains("let x; function f() { x = 1; } x;", UNINIT_X);
}

#[test]
fn parameters_start_initialized() {
    assert_compiles("function f(x) { return x; } f(1);");
}
