//! Vocabulary validator.
//!
//! Closed-world allow-list of operation names. Every call-style token in the
//! script is checked; unknown names are first run through the fix table's
//! reverse mapping, and whatever remains is reported as a soft warning — the
//! vocabulary may be incomplete, so unknown operations never block
//! execution.

use crate::fixes;
use regex::Regex;
use std::sync::OnceLock;

/// Known-valid operation names (CadQuery fluent API subset). `Workplane` is
/// the entry constructor; everything else is a chain method.
pub static OPERATIONS: &[&str] = &[
    "Workplane",
    "box",
    "sphere",
    "cylinder",
    "circle",
    "ellipse",
    "rect",
    "polygon",
    "polyline",
    "moveTo",
    "lineTo",
    "close",
    "extrude",
    "revolve",
    "twistExtrude",
    "sweep",
    "loft",
    "cut",
    "union",
    "intersect",
    "hole",
    "cboreHole",
    "cskHole",
    "fillet",
    "chamfer",
    "shell",
    "faces",
    "edges",
    "vertices",
    "workplane",
    "translate",
    "rotate",
    "mirror",
    "center",
    "pushPoints",
    "rarray",
    "offset2D",
    "tag",
];

pub fn is_known(name: &str) -> bool {
    OPERATIONS.contains(&name)
}

/// Result of a vocabulary pass over one script.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyReport {
    pub is_fully_valid: bool,
    pub unknown_operations: Vec<String>,
    pub fixed_script: String,
}

static CALL_RE: OnceLock<Regex> = OnceLock::new();

fn call_re() -> &'static Regex {
    CALL_RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call regex"))
}

/// Collect the distinct operation names invoked in the script, in order of
/// first appearance.
pub fn called_operations(script: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in call_re().captures_iter(script) {
        let name = caps[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Check every invoked operation against the allow-list; substitute
/// corrections from the reverse fix map, report the rest unmodified.
pub fn validate(script: &str) -> VocabularyReport {
    let mut fixed = script.to_string();
    let mut unknown = Vec::new();

    for name in called_operations(script) {
        if is_known(&name) {
            continue;
        }
        match fixes::reverse_fix(&name) {
            Some(canonical) => {
                let re = Regex::new(&format!(r"\b{}\s*\(", regex::escape(&name)))
                    .expect("substitution regex");
                fixed = re.replace_all(&fixed, format!("{canonical}(")).into_owned();
            }
            None => unknown.push(name),
        }
    }

    VocabularyReport {
        is_fully_valid: unknown.is_empty(),
        unknown_operations: unknown,
        fixed_script: fixed,
    }
}
