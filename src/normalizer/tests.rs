//! Unit tests for the syntax normalizer.

use super::{insert_chain_dots, normalize, unwrap_tuples};

#[test]
fn unwraps_tuple_arguments_for_multi_arg_ops() {
    let src = "result = cq.Workplane(\"XY\").box((10, 20, 30))";
    assert_eq!(
        unwrap_tuples(src),
        "result = cq.Workplane(\"XY\").box(10, 20, 30)"
    );
}

#[test]
fn leaves_flat_arguments_alone() {
    let src = "result = cq.Workplane(\"XY\").box(10, 20, 30)";
    assert_eq!(unwrap_tuples(src), src);
}

#[test]
fn inserts_missing_chain_dot() {
    let src = "box(10,10,10)faces(\">Z\")";
    assert_eq!(insert_chain_dots(src), "box(10,10,10).faces(\">Z\")");
}

#[test]
fn collapses_duplicate_workplane_calls() {
    let src = "result = cq.Workplane(\"XY\").faces(\">Z\").workplane().workplane().hole(5)";
    assert_eq!(
        normalize(src),
        "result = cq.Workplane(\"XY\").faces(\">Z\").workplane().hole(5)"
    );
}

#[test]
fn collapses_triplicate_workplane_calls() {
    let src = "x.workplane().workplane().workplane().hole(5)";
    assert_eq!(normalize(src), "x.workplane().hole(5)");
}

#[test]
fn collapses_repeated_dots() {
    let src = "result = cq.Workplane(\"XY\")..box(1, 2, 3)";
    assert_eq!(normalize(src), "result = cq.Workplane(\"XY\").box(1, 2, 3)");
}

#[test]
fn joins_wrapped_chains() {
    let src = "result = cq.Workplane(\"XY\").box(30, 20, 10)\n    .edges()\n    .fillet(2)";
    assert_eq!(
        normalize(src),
        "result = cq.Workplane(\"XY\").box(30, 20, 10).edges().fillet(2)"
    );
}

#[test]
fn adds_dot_after_constructor() {
    let src = "result = cq.Workplane(\"XY\")box(10, 10, 10)";
    assert_eq!(normalize(src), "result = cq.Workplane(\"XY\").box(10, 10, 10)");
}

#[test]
fn every_rule_is_idempotent_on_its_own_output() {
    let cases = [
        "result = cq.Workplane(\"XY\").box((10, 20, 30))",
        "box(10,10,10)faces(\">Z\")",
        "x.workplane().workplane().hole(5)",
        "result = cq.Workplane(\"XY\")..box(1, 2, 3)",
        "result = cq.Workplane(\"XY\").box(1, 1, 1)\n    .fillet(2)",
        "result = cq.Workplane(\"XY\")box(10, 10, 10)",
    ];
    for src in cases {
        let once = normalize(src);
        let twice = normalize(&once);
        assert_eq!(once, twice, "normalize not idempotent for {src:?}");
    }
}
