//! Fix-table rewriter.
//!
//! A static, ordered table of known-wrong → known-correct substitutions for
//! the systematic mistakes generators make: wrong capitalization of known
//! identifiers, hallucinated method names, lower-case selector tokens.
//! The table is process-wide, read-only and applied in order, single pass —
//! later rules may re-match text produced by earlier rules, and that is an
//! accepted source of incompleteness rather than a reason to loop to a
//! fixed point.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// A single correction entry: a literal substring or a structural regex.
pub enum FixPattern {
    Literal(&'static str),
    Pattern(&'static str),
}

pub struct FixRule {
    pub pattern: FixPattern,
    pub replacement: &'static str,
}

const fn lit(pattern: &'static str, replacement: &'static str) -> FixRule {
    FixRule {
        pattern: FixPattern::Literal(pattern),
        replacement,
    }
}

const fn re(pattern: &'static str, replacement: &'static str) -> FixRule {
    FixRule {
        pattern: FixPattern::Pattern(pattern),
        replacement,
    }
}

/// Order matters: earlier entries win the reverse lookup, and later entries
/// may re-match text produced by earlier ones.
pub static FIX_TABLE: &[FixRule] = &[
    // Entry-point spelling.
    lit("cadquery.Workplane(", "cq.Workplane("),
    lit("cq.workplane(", "cq.Workplane("),
    lit("CQ.Workplane(", "cq.Workplane("),
    lit("Cq.Workplane(", "cq.Workplane("),
    // Chained `.Workplane()` is the lower-case face-local one. The leading
    // `)` keeps this from touching `cq.Workplane(`.
    re(r"\)\s*\.Workplane\(", ").workplane("),
    // Capitalization slips on known methods.
    lit(".Box(", ".box("),
    lit(".Circle(", ".circle("),
    lit(".Extrude(", ".extrude("),
    lit(".Revolve(", ".revolve("),
    lit(".Fillet(", ".fillet("),
    lit(".Chamfer(", ".chamfer("),
    lit(".Faces(", ".faces("),
    lit(".Edges(", ".edges("),
    lit(".Hole(", ".hole("),
    lit(".Cut(", ".cut("),
    lit(".Union(", ".union("),
    lit(".Shell(", ".shell("),
    lit(".Translate(", ".translate("),
    lit(".Rotate(", ".rotate("),
    // Hallucinated method names → canonical vocabulary.
    lit(".facez(", ".faces("),
    lit(".face(", ".faces("),
    lit(".edge(", ".edges("),
    lit(".make_box(", ".box("),
    lit(".makeBox(", ".box("),
    lit(".create_box(", ".box("),
    lit(".add_box(", ".box("),
    lit(".make_cylinder(", ".cylinder("),
    lit(".drill_hole(", ".hole("),
    lit(".drill(", ".hole("),
    lit(".through_hole(", ".hole("),
    lit(".counterbore(", ".cboreHole("),
    lit(".cbore(", ".cboreHole("),
    lit(".countersink(", ".cskHole("),
    lit(".round_edges(", ".fillet("),
    lit(".round(", ".fillet("),
    lit(".bevel(", ".chamfer("),
    lit(".subtract(", ".cut("),
    lit(".difference(", ".cut("),
    lit(".fuse(", ".union("),
    lit(".combine_with(", ".union("),
    lit(".boolean_union(", ".union("),
    lit(".intersection(", ".intersect("),
    lit(".extrude_linear(", ".extrude("),
    lit(".rotate_extrude(", ".revolve("),
    lit(".twist_extrude(", ".twistExtrude("),
    lit(".offset(", ".offset2D("),
];

static COMPILED: OnceLock<Vec<Option<Regex>>> = OnceLock::new();

fn compiled() -> &'static [Option<Regex>] {
    COMPILED.get_or_init(|| {
        FIX_TABLE
            .iter()
            .map(|rule| match rule.pattern {
                FixPattern::Literal(_) => None,
                FixPattern::Pattern(p) => Some(Regex::new(p).expect("fix-table regex")),
            })
            .collect()
    })
}

/// Apply every rule in table order across the whole script text. Total:
/// unmatched patterns are no-ops.
pub fn apply_fix_table(script: &str) -> String {
    let regexes = compiled();
    let mut text = script.to_string();
    for (idx, rule) in FIX_TABLE.iter().enumerate() {
        text = match rule.pattern {
            FixPattern::Literal(pat) => text.replace(pat, rule.replacement),
            FixPattern::Pattern(_) => regexes[idx]
                .as_ref()
                .expect("compiled regex")
                .replace_all(&text, rule.replacement)
                .into_owned(),
        };
    }
    text
}

/// Reverse lookup: a wrong operation name → its canonical correction, taken
/// from the literal `.wrong(` → `.right(` entries. First match in table
/// order wins when several entries correct the same name.
pub fn reverse_fix(name: &str) -> Option<&'static str> {
    for rule in FIX_TABLE {
        if let FixPattern::Literal(pat) = rule.pattern {
            let (Some(wrong), Some(right)) = (method_name(pat), method_name(rule.replacement))
            else {
                continue;
            };
            if wrong == name && wrong != right {
                return Some(right);
            }
        }
    }
    None
}

/// `".faces("` → `Some("faces")`; anything not of that shape → None.
fn method_name(pat: &'static str) -> Option<&'static str> {
    let inner = pat.strip_prefix('.')?.strip_suffix('(')?;
    inner
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        .then_some(inner)
}

static SELECTOR_RE: OnceLock<Regex> = OnceLock::new();
static PLANE_RE: OnceLock<Regex> = OnceLock::new();

/// Upper-case selector axis tokens (`'>z'` → `'>Z'`) and workplane names
/// (`"xy"` → `"XY"` when passed to `Workplane`).
pub fn normalize_selector_case(script: &str) -> String {
    let sel = SELECTOR_RE
        .get_or_init(|| Regex::new(r#"(["'])([<>|+-]{1,2}\s*)([xyz])(["'])"#).expect("selector regex"));
    let out = sel.replace_all(script, |c: &Captures| {
        format!("{}{}{}{}", &c[1], &c[2], c[3].to_ascii_uppercase(), &c[4])
    });

    let plane = PLANE_RE.get_or_init(|| {
        Regex::new(r#"Workplane\(\s*(["'])(xy|yz|xz|zx|yx|zy)(["'])\s*\)"#).expect("plane regex")
    });
    plane
        .replace_all(&out, |c: &Captures| {
            format!("Workplane({}{}{})", &c[1], c[2].to_ascii_uppercase(), &c[3])
        })
        .into_owned()
}

#[cfg(test)]
mod tests;
