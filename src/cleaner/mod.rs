//! Lexical cleaner.
//!
//! First pipeline stage: takes raw, untrusted generator output and keeps
//! only the code-shaped text. Strips markdown code fences (keeping the
//! enclosed block when one exists) and drops leading conversational lines.
//! Total: the worst case is the trimmed input unchanged.

use regex::Regex;
use std::sync::OnceLock;

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("fence regex"))
}

/// Conversational openers the models like to prepend. Prefix match on the
/// trimmed, lowercased line.
const OPENERS: &[&str] = &[
    "here is",
    "here's",
    "sure",
    "certainly",
    "of course",
    "this code",
    "the following",
    "below is",
    "i have",
    "i've",
    "to create",
    "note:",
];

/// Strip markdown fencing and leading prose from raw model output.
pub fn clean(raw: &str) -> String {
    let text = strip_fences(raw);

    let mut lines: Vec<&str> = Vec::new();
    let mut in_prose_prefix = true;
    for line in text.lines() {
        if in_prose_prefix {
            let t = line.trim();
            if t.is_empty() {
                continue;
            }
            let low = t.to_ascii_lowercase();
            if OPENERS.iter().any(|o| low.starts_with(o)) {
                continue;
            }
            in_prose_prefix = false;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

/// Keep the text inside the first fenced block when a complete fence pair is
/// present; otherwise just remove the fence markers.
fn strip_fences(raw: &str) -> String {
    let re = fence_re();
    let marks: Vec<_> = re.find_iter(raw).collect();
    if marks.len() >= 2 {
        let inner = &raw[marks[0].end()..marks[1].start()];
        return inner.to_string();
    }
    re.replace_all(raw, "").to_string()
}
