//! Unit tests for the fix-table rewriter.

use super::{apply_fix_table, normalize_selector_case, reverse_fix};

#[test]
fn fixes_entry_point_capitalization() {
    let src = "result = cq.workplane(\"XY\").box(10, 10, 10)";
    assert_eq!(
        apply_fix_table(src),
        "result = cq.Workplane(\"XY\").box(10, 10, 10)"
    );
}

#[test]
fn fixes_hallucinated_method_names() {
    let src = "result = cq.Workplane(\"XY\").make_box(10, 10, 10).drill(5).round(2)";
    assert_eq!(
        apply_fix_table(src),
        "result = cq.Workplane(\"XY\").box(10, 10, 10).hole(5).fillet(2)"
    );
}

#[test]
fn chained_workplane_call_is_lowercased_but_entry_is_not() {
    let src = "result = cq.Workplane(\"XY\").faces(\">Z\").Workplane().hole(5)";
    assert_eq!(
        apply_fix_table(src),
        "result = cq.Workplane(\"XY\").faces(\">Z\").workplane().hole(5)"
    );
}

#[test]
fn unmatched_patterns_are_noops() {
    let src = "result = cq.Workplane(\"XY\").box(1, 2, 3)";
    assert_eq!(apply_fix_table(src), src);
}

#[test]
fn fix_table_is_idempotent() {
    let src = "x = cq.workplane(\"XY\").make_box(1, 2, 3).counterbore(2, 4, 1).subtract(y)";
    let once = apply_fix_table(src);
    let twice = apply_fix_table(&once);
    assert_eq!(once, twice);
}

#[test]
fn reverse_fix_maps_wrong_names_to_canonical() {
    assert_eq!(reverse_fix("facez"), Some("faces"));
    assert_eq!(reverse_fix("drill"), Some("hole"));
    assert_eq!(reverse_fix("Box"), Some("box"));
    assert_eq!(reverse_fix("box"), None);
    assert_eq!(reverse_fix("no_such_op"), None);
}

#[test]
fn selector_axis_is_uppercased() {
    let src = "result = cq.Workplane(\"XY\").faces('>z').workplane().hole(5)";
    assert_eq!(
        normalize_selector_case(src),
        "result = cq.Workplane(\"XY\").faces('>Z').workplane().hole(5)"
    );
}

#[test]
fn workplane_name_is_uppercased() {
    let src = "result = cq.Workplane(\"xy\").box(1, 1, 1)";
    assert_eq!(
        normalize_selector_case(src),
        "result = cq.Workplane(\"XY\").box(1, 1, 1)"
    );
}

#[test]
fn selector_case_is_idempotent() {
    let src = "result = cq.Workplane(\"xz\").faces('<z').edges('|y').fillet(1)";
    let once = normalize_selector_case(src);
    assert_eq!(normalize_selector_case(&once), once);
    assert!(once.contains("'<Z'"));
    assert!(once.contains("'|Y'"));
    assert!(once.contains("\"XZ\""));
}
