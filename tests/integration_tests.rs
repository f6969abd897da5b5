// Integration tests for the bitsh statement engine.
//
// The interesting surface here is the no-tree execution model: skip and
// execute must stay branch-equivalent, while loops re-enter from a cursor
// snapshot, switch clamps its selector, and macro calls must be fully
// transparent to the caller's cursor.

use bitsh::{BitshError, Cursor, Engine, ErrorKind, MacroStore, Number, Symbol};
use std::sync::atomic::Ordering;

/// Evaluate one script in a fresh engine.
fn eval(source: &str) -> Result<Number, BitshError> {
    Engine::new().eval(source)
}

fn eval_ok(source: &str) -> Number {
    match eval(source) {
        Ok(value) => value,
        Err(error) => panic!("script `{}` failed: {}", source, error.message),
    }
}

fn expect_error(source: &str, kind: ErrorKind, contains: &str) {
    match eval(source) {
        Ok(value) => panic!(
            "script `{}` should have failed, but returned {}",
            source, value
        ),
        Err(error) => {
            assert_eq!(error.kind, kind, "wrong error kind for `{}`", source);
            assert!(
                error.message.contains(contains),
                "error `{}` does not mention `{}`",
                error.message,
                contains
            );
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval_ok("2 + 3 * 4"), 14);
    assert_eq!(eval_ok("(2 + 3) * 4"), 20);
    assert_eq!(eval_ok("10 / 3"), 3);
    assert_eq!(eval_ok("7 % 4"), 3);
    assert_eq!(eval_ok("1 << 4"), 16);
    assert_eq!(eval_ok("256 >> 4"), 16);
}

#[test]
fn number_literal_forms() {
    assert_eq!(eval_ok("0x10"), 16);
    assert_eq!(eval_ok("0b101"), 5);
    assert_eq!(eval_ok("'A'"), 65);
    assert_eq!(eval_ok("'\\n'"), 10);
}

#[test]
fn unary_operators() {
    assert_eq!(eval_ok("-5"), -5);
    assert_eq!(eval_ok("-(2 + 3)"), -5);
    assert_eq!(eval_ok("!0"), 1);
    assert_eq!(eval_ok("!7"), 0);
    assert_eq!(eval_ok("~0"), -1);
}

#[test]
fn comparison_and_logic() {
    assert_eq!(eval_ok("1 < 2"), 1);
    assert_eq!(eval_ok("2 <= 1"), 0);
    assert_eq!(eval_ok("3 == 3"), 1);
    assert_eq!(eval_ok("3 != 3"), 0);
    assert_eq!(eval_ok("1 && 2"), 1);
    assert_eq!(eval_ok("1 && 0"), 0);
    assert_eq!(eval_ok("0 || 5"), 1);
    assert_eq!(eval_ok("12 & 10"), 8);
    assert_eq!(eval_ok("12 | 10"), 14);
    assert_eq!(eval_ok("12 ^ 10"), 6);
}

#[test]
fn variables_and_assignment() {
    assert_eq!(eval_ok("x = 5; x + 1"), 6);
    assert_eq!(eval_ok("a = b = 3; a + b"), 6);
    // Unassigned variables read as 0
    assert_eq!(eval_ok("q"), 0);
}

#[test]
fn sequencing_returns_last_statement_value() {
    assert_eq!(eval_ok("1; 2; 3"), 3);
    assert_eq!(eval_ok(""), 0);
    assert_eq!(eval_ok("; ; ;"), 0);
    assert_eq!(eval_ok("// just a comment"), 0);
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    expect_error("1 / 0", ErrorKind::RuntimeError, "Division by zero");
    expect_error("5 % 0", ErrorKind::RuntimeError, "Division by zero");
}

#[test]
fn malformed_expressions() {
    expect_error("(1 + 2", ErrorKind::SyntaxError, "Expected ')'");
    expect_error("1 +", ErrorKind::SyntaxError, "Expected expression");
    expect_error(")", ErrorKind::SyntaxError, "Expected expression");
}

#[test]
fn lexical_errors() {
    expect_error("$", ErrorKind::LexError, "Unexpected character");
    expect_error("\"abc", ErrorKind::LexError, "Unterminated string");
    expect_error("x : 1", ErrorKind::LexError, "Unexpected character");
}

// ============================================================================
// if / else: skip and execute must be branch-equivalent
// ============================================================================

#[test]
fn if_true_executes_then_branch() {
    assert_eq!(eval_ok("if 1 x = 5; else x = 9; x"), 5);
    // Identical to the program with the untaken branch deleted
    assert_eq!(eval_ok("x = 5; x"), 5);
}

#[test]
fn if_false_executes_else_branch() {
    assert_eq!(eval_ok("if 0 x = 5; else x = 9; x"), 9);
}

#[test]
fn if_false_without_else() {
    assert_eq!(eval_ok("x = 1; if 0 x = 5; x"), 1);
}

#[test]
fn nested_if_else_in_blocks() {
    let script = "if 1 { x = 1; if 0 { x = 2 } else { x = 3 } } else { x = 4 } x";
    assert_eq!(eval_ok(script), 3);
}

#[test]
fn skipped_branch_has_no_side_effects() {
    assert_eq!(eval_ok("x = 0; if 1 x = x + 1; else x = x + 100; x"), 1);
    assert_eq!(eval_ok("x = 0; if 0 x = x + 1; else x = x + 100; x"), 100);
}

#[test]
fn skip_scanner_treats_strings_as_opaque() {
    // The "}" inside the string must not terminate the skipped block
    assert_eq!(eval_ok("x = 0; if 0 { print \"}\"; } x = 7; x"), 7);
    // Same for ";" and ")" in single-statement mode
    assert_eq!(eval_ok("if 0 print \");\"; x = 3; x"), 3);
}

// ============================================================================
// while
// ============================================================================

#[test]
fn while_false_skips_body_once() {
    assert_eq!(eval_ok("x = 5; while 0 x = 9; x"), 5);
}

#[test]
fn while_reevaluates_condition_each_iteration() {
    // Condition runs 4 times (3 true + 1 false), body 3 times
    assert_eq!(eval_ok("i = 0; n = 0; while (i = i + 1) < 4 n = n + 10; n"), 30);
    assert_eq!(eval_ok("i = 0; n = 0; while (i = i + 1) < 4 n = n + 10; i"), 4);
}

#[test]
fn while_value_is_last_body_value() {
    assert_eq!(eval_ok("i = 0; while i < 3 i = i + 1"), 3);
}

#[test]
fn while_with_block_body() {
    assert_eq!(eval_ok("i = 0; s = 0; while i < 5 { s = s + i; i = i + 1 } s"), 10);
}

#[test]
fn return_breaks_out_of_while() {
    assert_eq!(eval_ok("i = 0; while 1 { i = i + 1; if i == 3 return i * 10; }"), 30);
}

// ============================================================================
// switch
// ============================================================================

// Cases carry trailing semicolons so the remainder skip stops at the
// closing brace, matching how switch blocks are written in practice.
fn switch_pick(selector: i64) -> i64 {
    let script = format!("x = 0; switch {} {{ x = 10; x = 20; x = 30; }} x", selector);
    eval_ok(&script)
}

#[test]
fn switch_selects_exactly_one_statement() {
    assert_eq!(switch_pick(0), 10);
    assert_eq!(switch_pick(1), 20);
    assert_eq!(switch_pick(2), 30);
}

#[test]
fn switch_clamps_negative_selector_to_first() {
    assert_eq!(switch_pick(-1), 10);
}

#[test]
fn switch_clamps_large_selector_to_last() {
    assert_eq!(switch_pick(5), 30);
    assert_eq!(switch_pick(3), 30);
}

#[test]
fn switch_suppresses_side_effects_of_unchosen_cases() {
    let script = "x = 0; y = 0; z = 0; switch 1 { x = 1; y = 2; z = 3; } x * 100 + y * 10 + z";
    assert_eq!(eval_ok(script), 20);
}

#[test]
fn switch_value_is_the_chosen_statement_value() {
    assert_eq!(eval_ok("switch 1 { 111; 222; 333; }"), 222);
}

#[test]
fn switch_with_block_cases() {
    let script = "x = 0; switch 1 { {x = 1; x = 2} {x = 5; x = 6} } x";
    assert_eq!(eval_ok(script), 6);
}

#[test]
fn switch_on_empty_block() {
    assert_eq!(eval_ok("switch 3 { }"), 0);
}

#[test]
fn switch_requires_brace() {
    expect_error("switch 1 2", ErrorKind::SyntaxError, "Expected '{'");
}

// ============================================================================
// return
// ============================================================================

#[test]
fn return_terminates_the_whole_enclosing_list() {
    assert_eq!(eval_ok("{ { return 5; } 99; }"), 5);
}

#[test]
fn bare_return_yields_zero() {
    assert_eq!(eval_ok("return"), 0);
    assert_eq!(eval_ok("return; 99"), 0);
}

#[test]
fn statements_after_return_never_execute() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval("x = 1; { return 2; x = 9; }").unwrap(), 2);
    assert_eq!(engine.eval("x").unwrap(), 1);
}

// ============================================================================
// Macros
// ============================================================================

#[test]
fn macro_define_and_call() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval("mac := \"42\"").unwrap(), 0);
    assert_eq!(engine.eval("mac").unwrap(), 42);
}

#[test]
fn macro_call_is_transparent_to_the_caller_expression() {
    let mut engine = Engine::new();
    engine.eval("mac := \"42\"").unwrap();
    assert_eq!(engine.eval("1 + mac + 2").unwrap(), 45);
    assert_eq!(engine.eval("x = 10 + mac * 2; x").unwrap(), 94);
    assert_eq!(engine.eval("1 + mac() + 2").unwrap(), 45);
}

#[test]
fn macro_arguments() {
    let mut engine = Engine::new();
    engine.eval("add := \"arg(1) + arg(2)\"").unwrap();
    assert_eq!(engine.eval("add(3, 4) * 10").unwrap(), 70);
    engine.eval("cnt := \"arg(0)\"").unwrap();
    assert_eq!(engine.eval("cnt(9, 8, 7)").unwrap(), 3);
}

#[test]
fn macro_return_is_local_to_the_macro() {
    let mut engine = Engine::new();
    engine.eval("mac := \"return 7; 99\"").unwrap();
    assert_eq!(engine.eval("mac + 1").unwrap(), 8);
}

#[test]
fn macros_can_call_macros() {
    let mut engine = Engine::new();
    engine.eval("inner := \"5\"").unwrap();
    engine.eval("outer := \"inner() + 1\"").unwrap();
    assert_eq!(engine.eval("outer + 1").unwrap(), 7);
}

#[test]
fn macro_redefinition_replaces_the_body() {
    let mut engine = Engine::new();
    engine.eval("mac := \"1\"").unwrap();
    engine.eval("mac := \"2\"").unwrap();
    assert_eq!(engine.eval("mac").unwrap(), 2);
}

#[test]
fn rm_erases_a_macro() {
    let mut engine = Engine::new();
    engine.eval("mac := \"3\"").unwrap();
    engine.eval("rm mac").unwrap();
    let error = engine.eval("mac").unwrap_err();
    assert_eq!(error.kind, ErrorKind::UnknownIdentifier);
}

#[test]
fn rm_star_wipes_store_and_tasks() {
    let mut engine = Engine::new();
    engine.eval("one := \"1\"; two := \"2\"; run one, 50").unwrap();
    assert_eq!(engine.task_count(), 1);
    engine.eval("rm *").unwrap();
    assert_eq!(engine.task_count(), 0);
    assert_eq!(engine.eval("one").unwrap_err().kind, ErrorKind::UnknownIdentifier);
}

#[test]
fn unknown_identifier_is_reported() {
    expect_error("nosuch", ErrorKind::UnknownIdentifier, "Unknown identifier");
}

#[test]
fn macro_definition_requires_a_string_body() {
    expect_error("mac := 5", ErrorKind::SyntaxError, "Expected string literal");
}

#[test]
fn runaway_recursion_fails_cleanly() {
    let mut engine = Engine::new();
    engine.eval("rec := \"rec\"").unwrap();
    let error = engine.eval("rec").unwrap_err();
    assert_eq!(error.kind, ErrorKind::RuntimeError);
    assert!(error.message.contains("too deep"));
}

#[test]
fn macro_error_still_restores_the_caller() {
    let mut engine = Engine::new();
    engine.eval("bad := \"1 / 0\"").unwrap();
    engine.eval("x = 3").unwrap();
    assert_eq!(engine.eval("bad").unwrap_err().kind, ErrorKind::RuntimeError);
    // The engine is still healthy after the failed call
    assert_eq!(engine.eval("x").unwrap(), 3);
}

#[test]
fn arg_outside_a_macro_is_an_error() {
    expect_error("arg(1)", ErrorKind::RuntimeError, "outside a macro");
}

#[test]
fn arg_out_of_range_is_an_error() {
    let mut engine = Engine::new();
    engine.eval("f := \"arg(2)\"").unwrap();
    let error = engine.eval("f(1)").unwrap_err();
    assert_eq!(error.kind, ErrorKind::RuntimeError);
    assert!(error.message.contains("out of range"));
}

// ============================================================================
// Background tasks
// ============================================================================

#[test]
fn run_schedules_a_task() {
    let mut engine = Engine::new();
    engine.eval("blink := \"x = x + 1\"; run blink, 50").unwrap();
    assert_eq!(engine.task_count(), 1);
    engine.eval("run blink").unwrap();
    assert_eq!(engine.task_count(), 2);
    engine.eval("stop *").unwrap();
    assert_eq!(engine.task_count(), 0);
}

#[test]
fn run_requires_a_known_macro() {
    expect_error("run 5", ErrorKind::SyntaxError, "Expected macro name");
    expect_error("run nothere", ErrorKind::UnknownIdentifier, "Unknown macro");
}

#[test]
fn stop_by_id_and_stop_missing_is_a_noop() {
    let mut engine = Engine::new();
    engine.eval("tick := \"1\"; run tick").unwrap();
    engine.eval("stop 99").unwrap(); // no such task, no error
    assert_eq!(engine.task_count(), 1);
    engine.eval("stop 0").unwrap(); // first task id is 0
    assert_eq!(engine.task_count(), 0);
}

#[test]
fn bare_stop_in_foreground_stops_all() {
    let mut engine = Engine::new();
    engine.eval("tick := \"1\"; run tick; run tick").unwrap();
    engine.eval("stop").unwrap();
    assert_eq!(engine.task_count(), 0);
}

#[test]
fn pump_runs_due_tasks() {
    let mut engine = Engine::new();
    engine.eval("x = 0; tick := \"x = x + 1\"; run tick").unwrap();
    engine.pump_background();
    assert_eq!(engine.eval("x").unwrap(), 1);
    engine.pump_background();
    assert_eq!(engine.eval("x").unwrap(), 2);
}

#[test]
fn bare_stop_inside_a_background_task_stops_that_task() {
    let mut engine = Engine::new();
    engine.eval("x = 0; once := \"x = x + 1; stop\"; run once").unwrap();
    engine.pump_background();
    assert_eq!(engine.eval("x").unwrap(), 1);
    assert_eq!(engine.task_count(), 0);
}

#[test]
fn task_for_an_erased_macro_is_dropped() {
    let mut engine = Engine::new();
    engine.eval("tick := \"1\"; run tick; rm tick").unwrap();
    engine.pump_background();
    assert_eq!(engine.task_count(), 0);
}

#[test]
fn failing_task_is_removed_from_the_schedule() {
    let mut engine = Engine::new();
    engine.eval("boom := \"1 / 0\"; run boom").unwrap();
    engine.pump_background();
    assert_eq!(engine.task_count(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn interrupt_aborts_before_the_next_statement() {
    let mut engine = Engine::new();
    engine.interrupt_flag().store(true, Ordering::Relaxed);
    let error = engine.eval("x = 1").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Interrupted);
    // The statement never ran, and the flag was consumed
    assert_eq!(engine.eval("x").unwrap(), 0);
}

// ============================================================================
// Interactive echo classification
// ============================================================================

#[test]
fn shell_echoes_only_bare_expression_lines() {
    let mut engine = Engine::new();
    engine.eval("mac := \"42\"").unwrap();

    assert!(engine.is_bare_expression("1 + 2"));
    assert!(engine.is_bare_expression("mac"));
    assert!(engine.is_bare_expression("mac(3, 4)"));
    assert!(engine.is_bare_expression("q"));

    assert!(!engine.is_bare_expression("x = 5"));
    assert!(!engine.is_bare_expression("mac := \"1\""));
    assert!(!engine.is_bare_expression("newmac := \"1\""));
    assert!(!engine.is_bare_expression("1; 2"));
    assert!(!engine.is_bare_expression("print 1 + 2"));
    assert!(!engine.is_bare_expression("if 1 2"));
    assert!(!engine.is_bare_expression("{ 1 }"));
    assert!(!engine.is_bare_expression("run mac"));
    assert!(!engine.is_bare_expression(""));
}

// ============================================================================
// Cursor: snapshot / restore, string scanning
// ============================================================================

#[test]
fn snapshot_restore_round_trip() {
    let store = MacroStore::new();
    let mut cursor = Cursor::new();
    cursor.enter("1 + 23".into());

    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Number);
    assert_eq!(cursor.val(), 1);

    // Restore with no intervening advance changes nothing
    let snap = cursor.snapshot();
    cursor.restore(snap);
    assert_eq!(cursor.sym(), Symbol::Number);
    assert_eq!(cursor.val(), 1);

    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Plus);
    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Number);
    assert_eq!(cursor.val(), 23);
    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Eof);
}

#[test]
fn string_literals_keep_multibyte_characters() {
    let store = MacroStore::new();
    let mut cursor = Cursor::new();
    cursor.enter("\"héllo wörld\"".into());

    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Str);
    assert_eq!(cursor.text(), "héllo wörld");
    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Eof);
}

#[test]
fn snapshot_rewinds_after_advances() {
    let store = MacroStore::new();
    let mut cursor = Cursor::new();
    cursor.enter("7 * 9".into());

    cursor.advance(&store).unwrap();
    let at_seven = cursor.snapshot();
    cursor.advance(&store).unwrap();
    cursor.advance(&store).unwrap();
    assert_eq!(cursor.val(), 9);

    cursor.restore(at_seven);
    assert_eq!(cursor.sym(), Symbol::Number);
    assert_eq!(cursor.val(), 7);
    cursor.advance(&store).unwrap();
    assert_eq!(cursor.sym(), Symbol::Star);
}

// ============================================================================
// Introspection statements (smoke tests)
// ============================================================================

#[test]
fn introspection_statements_run() {
    let mut engine = Engine::new();
    engine.eval("mac := \"1\"; run mac, 50").unwrap();
    assert_eq!(engine.eval("ls").unwrap(), 0);
    assert_eq!(engine.eval("ps").unwrap(), 0);
    assert_eq!(engine.eval("peek").unwrap(), 0);
    assert_eq!(engine.eval("help").unwrap(), 0);
    assert_eq!(engine.eval("print 1 + 1, \"ok\"").unwrap(), 0);
    assert_eq!(engine.eval("print").unwrap(), 0);
}
