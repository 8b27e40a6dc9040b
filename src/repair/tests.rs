use super::*;

#[test]
fn classifies_execution_errors() {
    let cases = [
        (
            "'Workplane' object has no attribute 'facez'.",
            ErrorCategory::UnknownAttribute,
        ),
        (
            "'box()' result is not callable; missing '.' before 'extrude'?",
            ErrorCategory::NotCallable,
        ),
        (
            "box() expected 3 positional arguments but received a single tuple",
            ErrorCategory::TypeMismatchTuple,
        ),
        (
            "hole() missing required positional arguments: expected at least 1, got 0",
            ErrorCategory::TypeMismatchTuple,
        ),
        (
            "unexpected end of input inside 'box' argument list",
            ErrorCategory::SyntaxMalformed,
        ),
        ("syntax error: unbalanced ')'", ErrorCategory::SyntaxMalformed),
        (
            "script did not bind 'result'",
            ErrorCategory::MissingOutputBinding,
        ),
        (
            "access to 'os' is outside the sandbox capability surface",
            ErrorCategory::Unclassified,
        ),
        ("name 'ghost' is not defined", ErrorCategory::Unclassified),
    ];
    for (message, expected) in cases {
        assert_eq!(classify(message), expected, "message: {message}");
    }
}

#[test]
fn unknown_attribute_repair_prefers_the_hint() {
    let script = "result = cq.Workplane(\"XY\").box(1, 1, 1).filet(2)";
    let error = "'Workplane' object has no attribute 'filet'. Did you mean 'fillet'?";
    let repaired = apply_repair(script, error).unwrap();
    assert!(repaired.contains(".fillet(2)"), "{repaired}");
    assert!(!repaired.contains(".filet("), "{repaired}");
}

#[test]
fn unknown_attribute_repair_falls_back_to_the_fix_table() {
    let script = "result = cq.Workplane(\"XY\").box(1, 1, 1).facez(\">Z\")";
    let error = "'Workplane' object has no attribute 'facez'.";
    let repaired = apply_repair(script, error).unwrap();
    assert!(repaired.contains(".faces(\">Z\")"), "{repaired}");
}

#[test]
fn unknown_attribute_without_any_mapping_is_terminal() {
    let script = "result = cq.Workplane(\"XY\").zzqqxxyy(1)";
    let error = "'Workplane' object has no attribute 'zzqqxxyy'.";
    assert_eq!(apply_repair(script, error), None);
}

#[test]
fn tuple_mismatch_repair_unwraps_the_tuple() {
    let script = "result = cq.Workplane(\"XY\").box((10, 20, 5))";
    let error = "box() expected 3 positional arguments but received a single tuple";
    let repaired = apply_repair(script, error).unwrap();
    assert!(repaired.contains(".box(10, 20, 5)"), "{repaired}");
}

#[test]
fn syntax_repair_balances_brackets() {
    let script = "result = cq.Workplane(\"XY\").box(4, 4, 4";
    let error = "unexpected end of input inside 'box' argument list";
    let repaired = apply_repair(script, error).unwrap();
    assert!(repaired.ends_with(".box(4, 4, 4)"), "{repaired}");
}

#[test]
fn missing_binding_repair_binds_result() {
    let script = "part = cq.Workplane(\"XY\").box(2, 2, 2)";
    let error = "script did not bind 'result'";
    let repaired = apply_repair(script, error).unwrap();
    assert!(repaired.contains("result ="), "{repaired}");
}

#[test]
fn unclassified_errors_have_no_repair() {
    let script = "result = cq.Workplane(\"XY\").box(1, 1, 1)";
    assert_eq!(
        apply_repair(script, "access to 'os' is outside the sandbox capability surface"),
        None
    );
}

#[test]
fn loop_succeeds_first_try_without_repairs() {
    let outcome = run_loop(
        "ok",
        3,
        |s| if s == "ok" { Ok(42u32) } else { Err("boom".into()) },
        |_, _| panic!("repair must not run on success"),
    );
    assert!(outcome.success);
    assert_eq!(outcome.artifact, Some(42));
    assert_eq!(outcome.attempts, 1);
}

#[test]
fn loop_applies_repairs_until_success() {
    let outcome = run_loop(
        "v0",
        3,
        |s| if s == "v2" { Ok(()) } else { Err(format!("bad {s}")) },
        |s, _| match s {
            "v0" => Some("v1".to_string()),
            "v1" => Some("v2".to_string()),
            other => panic!("unexpected script {other}"),
        },
    );
    assert!(outcome.success);
    assert_eq!(outcome.script, "v2");
    assert_eq!(outcome.attempts, 3);
}

#[test]
fn loop_exhausts_the_retry_budget() {
    let mut executions = 0usize;
    let outcome = run_loop(
        "v0",
        3,
        |_| -> Result<(), String> {
            executions += 1;
            Err(format!("fail {executions}"))
        },
        |s, _| Some(format!("{s}x")),
    );
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(executions, 4);
    assert_eq!(outcome.error.as_deref(), Some("fail 4"));
}

#[test]
fn loop_stops_on_a_stagnant_repair() {
    let outcome = run_loop(
        "stuck",
        5,
        |_| -> Result<(), String> { Err("same error".into()) },
        |s, _| Some(s.to_string()),
    );
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.error.as_deref(), Some("same error"));
}

#[test]
fn loop_stops_when_no_repair_applies() {
    let outcome = run_loop(
        "v0",
        5,
        |_| -> Result<(), String> { Err("terminal".into()) },
        |_, _| None,
    );
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.script, "v0");
}

#[test]
fn zero_retries_means_a_single_execution() {
    let mut executions = 0usize;
    let outcome = run_loop(
        "v0",
        0,
        |_| -> Result<(), String> {
            executions += 1;
            Err("nope".into())
        },
        |_, _| panic!("no repair round with a zero budget"),
    );
    assert!(!outcome.success);
    assert_eq!(executions, 1);
    assert_eq!(outcome.attempts, 1);
}
