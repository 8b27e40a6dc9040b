//! Syntax normalizer.
//!
//! Structural pattern repairs that a static replacement table cannot
//! express: missing call-chain dots, tuple-wrapped argument lists, duplicate
//! no-op calls, stray separators. Each rule operates on the whole script
//! text and is safe to re-apply.

use regex::Regex;
use std::sync::OnceLock;

/// Operations that take several positional arguments and therefore attract
/// the "arguments passed as one tuple" mistake.
const MULTI_ARG_OPS: &str = "box|rect|cylinder|translate|rotate|center|moveTo|lineTo|cboreHole|cskHole|rarray";

/// Empty-argument operations where an immediately repeated call is a no-op.
const NOOP_OPS: &[&str] = &["workplane", "edges", "vertices", "close"];

static TUPLE_RE: OnceLock<Regex> = OnceLock::new();
static CHAIN_DOT_RE: OnceLock<Regex> = OnceLock::new();
static NOOP_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static MULTI_DOT_RE: OnceLock<Regex> = OnceLock::new();
static SPACE_DOT_RE: OnceLock<Regex> = OnceLock::new();
static CTOR_DOT_RE: OnceLock<Regex> = OnceLock::new();

/// Rule 1: `.box((10, 20, 30))` → `.box(10, 20, 30)` for known multi-arg
/// operations.
pub fn unwrap_tuples(script: &str) -> String {
    let re = TUPLE_RE.get_or_init(|| {
        Regex::new(&format!(
            r"\.({MULTI_ARG_OPS})\(\s*\(\s*([^()]*?)\s*\)\s*\)"
        ))
        .expect("tuple-unwrap regex")
    });
    re.replace_all(script, ".${1}(${2})").into_owned()
}

/// Rule 2: `)faces(` → `).faces(` — an omitted chain dot between a closing
/// delimiter and the next call.
pub fn insert_chain_dots(script: &str) -> String {
    let re = CHAIN_DOT_RE.get_or_init(|| {
        Regex::new(r"\)\s*([A-Za-z_][A-Za-z0-9_]*\s*\()").expect("chain-dot regex")
    });
    re.replace_all(script, ").${1}").into_owned()
}

/// Rule 3: `.workplane().workplane()` → `.workplane()`. Collapsed to a local
/// fixed point so triplicates fold too (bounded: each pass shrinks the text).
fn collapse_noop_pairs(script: &str) -> String {
    let res = NOOP_RES.get_or_init(|| {
        NOOP_OPS
            .iter()
            .map(|op| {
                Regex::new(&format!(r"\.{op}\(\)\s*\.{op}\(\)")).expect("noop-pair regex")
            })
            .collect()
    });
    let mut text = script.to_string();
    for (op, re) in NOOP_OPS.iter().zip(res) {
        loop {
            let next = re.replace_all(&text, format!(".{op}()")).into_owned();
            if next == text {
                break;
            }
            text = next;
        }
    }
    text
}

/// Rule 4: collapse runs of chain separators (`..`, `. .`) into one.
fn collapse_repeated_dots(script: &str) -> String {
    let re = MULTI_DOT_RE.get_or_init(|| Regex::new(r"\.(?:\s*\.)+").expect("multi-dot regex"));
    re.replace_all(script, ".").into_owned()
}

/// Rule 5: `) .faces(` / chains wrapped onto the next line → `).faces(`.
fn strip_space_before_dot(script: &str) -> String {
    let re = SPACE_DOT_RE.get_or_init(|| Regex::new(r"\)\s+\.").expect("space-dot regex"));
    re.replace_all(script, ").").into_owned()
}

/// Rule 6: a constructor-style call followed directly by an identifier gets
/// its chain dot (`cq.Workplane("XY")box…`).
fn dot_after_constructor(script: &str) -> String {
    let re = CTOR_DOT_RE
        .get_or_init(|| Regex::new(r"(Workplane\([^)]*\))([A-Za-z_])").expect("ctor-dot regex"));
    re.replace_all(script, "${1}.${2}").into_owned()
}

/// Full normalization pass, rules applied in order.
pub fn normalize(script: &str) -> String {
    let text = unwrap_tuples(script);
    let text = insert_chain_dots(&text);
    let text = collapse_noop_pairs(&text);
    let text = collapse_repeated_dots(&text);
    let text = strip_space_before_dot(&text);
    dot_after_constructor(&text)
}

#[cfg(test)]
mod tests;
