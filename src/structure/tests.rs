//! Unit tests for the structural validator.

use super::{balance_brackets, ensure_import, ensure_output_binding, validate};

#[test]
fn prepends_canonical_import_when_missing() {
    let src = "result = cq.Workplane(\"XY\").box(1, 2, 3)";
    let out = ensure_import(src);
    assert!(out.starts_with("import cadquery as cq\n"));
}

#[test]
fn keeps_existing_import() {
    let src = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 2, 3)";
    assert_eq!(ensure_import(src), src);
}

#[test]
fn rewrites_last_chain_line_as_output_binding() {
    let src = "import cadquery as cq\ncq.Workplane(\"XY\").box(30, 20, 10).edges().fillet(2)";
    let out = ensure_output_binding(src);
    assert!(out.contains("result = cq.Workplane(\"XY\").box(30, 20, 10).edges().fillet(2)"));
}

#[test]
fn rebinds_misnamed_assignment() {
    let src = "import cadquery as cq\nshape = cq.Workplane(\"XY\").box(10, 10, 10)";
    let out = ensure_output_binding(src);
    assert!(out.contains("result = cq.Workplane(\"XY\").box(10, 10, 10)"));
    assert!(!out.contains("shape ="));
}

#[test]
fn existing_binding_is_untouched() {
    let src = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 1, 1)";
    assert_eq!(ensure_output_binding(src), src);
}

#[test]
fn appends_missing_closing_brackets() {
    let src = "result = cq.Workplane(\"XY\").box(10, 10, 10).faces(\">Z\"";
    let out = balance_brackets(src);
    assert!(out.ends_with(".faces(\">Z\")"));
}

#[test]
fn strips_exactly_the_surplus_closing_brackets() {
    let src = "result = cq.Workplane(\"XY\").box(10, 10, 10)))";
    assert_eq!(
        balance_brackets(src),
        "result = cq.Workplane(\"XY\").box(10, 10, 10)"
    );
}

#[test]
fn appended_closer_lands_before_a_trailing_comment() {
    let src = "result = cq.Workplane(\"XY\").box(10, 10, 10  # a box";
    assert_eq!(
        balance_brackets(src),
        "result = cq.Workplane(\"XY\").box(10, 10, 10)  # a box"
    );
}

#[test]
fn brackets_inside_comments_are_not_counted() {
    let src = "result = cq.Workplane(\"XY\").box(10, 10, 10)  # a tuple (x, y";
    assert_eq!(balance_brackets(src), src);
}

#[test]
fn closes_nested_square_and_round_delimiters_innermost_first() {
    let src = "result = cq.Workplane(\"XY\").pushPoints([(5, 5), (0, 0";
    assert_eq!(
        balance_brackets(src),
        "result = cq.Workplane(\"XY\").pushPoints([(5, 5), (0, 0)])"
    );
}

#[test]
fn brackets_inside_strings_are_not_counted() {
    let src = "result = cq.Workplane(\"XY\").tag(\"a ) stray\").box(1, 1, 1)";
    assert_eq!(balance_brackets(src), src);
}

#[test]
fn full_pass_never_fails_and_is_idempotent() {
    let src = "cq.Workplane(\"XY\").box(10, 10, 10";
    let once = validate(src);
    assert_eq!(validate(&once), once);
    assert!(once.starts_with("import cadquery as cq"));
    assert!(once.contains("result = cq.Workplane"));
    assert!(once.ends_with(')'));
}
