//! Structural validator.
//!
//! Repairs rather than rejects: ensures the script has the canonical import
//! line, ends in a binding to `result`, and has balanced grouping delimiters.
//! Always returns a best-effort script, never fails.

use regex::Regex;
use std::sync::OnceLock;

pub const CANONICAL_IMPORT: &str = "import cadquery as cq";

/// The designated output name the sandbox looks for.
pub const OUTPUT_NAME: &str = "result";

static BINDING_RE: OnceLock<Regex> = OnceLock::new();
static ASSIGN_RE: OnceLock<Regex> = OnceLock::new();

fn binding_re() -> &'static Regex {
    BINDING_RE.get_or_init(|| Regex::new(r"(?m)^\s*result\s*=").expect("binding regex"))
}

/// Full structural pass: import, output binding, bracket balance.
pub fn validate(script: &str) -> String {
    let text = ensure_import(script);
    let text = ensure_output_binding(&text);
    balance_brackets(&text)
}

/// Prepend the canonical import when no import/setup statement is present.
pub fn ensure_import(script: &str) -> String {
    let has_import = script
        .lines()
        .any(|l| l.trim_start().starts_with("import cadquery"));
    if has_import {
        script.to_string()
    } else {
        format!("{CANONICAL_IMPORT}\n{script}")
    }
}

/// When no top-level `result =` binding exists, scan lines in reverse for
/// the last one that looks like a terminal call-chain expression and rewrite
/// it as the output binding. Stops at the first match.
pub fn ensure_output_binding(script: &str) -> String {
    if binding_re().is_match(script) {
        return script.to_string();
    }

    let assign = ASSIGN_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("assign regex")
    });

    let mut lines: Vec<String> = script.lines().map(|l| l.to_string()).collect();
    for line in lines.iter_mut().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("import ") {
            continue;
        }
        if trimmed.starts_with("cq.") {
            *line = format!("{OUTPUT_NAME} = {trimmed}");
            break;
        }
        if let Some(caps) = assign.captures(trimmed) {
            let rhs = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if rhs.starts_with("cq.") || rhs.contains('.') {
                *line = format!("{OUTPUT_NAME} = {rhs}");
                break;
            }
        }
    }
    lines.join("\n")
}

/// Open-delimiter stack over the whole script, tracking the three grouping
/// kinds and skipping string literals (quote character and escape state) and
/// `#` comments. Returns the still-open delimiters in nesting order plus the
/// count of surplus closers.
fn open_delimiters(script: &str) -> (Vec<char>, usize) {
    let mut open = Vec::new();
    let mut surplus = 0usize;
    let mut in_str: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;

    for c in script.chars() {
        if let Some(quote) = in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_str = None;
            }
            continue;
        }
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_str = Some(c),
            '#' => in_comment = true,
            '(' | '[' | '{' => open.push(c),
            ')' | ']' | '}' => {
                let opener = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open.last() == Some(&opener) {
                    open.pop();
                } else {
                    surplus += 1;
                }
            }
            _ => {}
        }
    }
    (open, surplus)
}

fn closer_for(opener: char) -> char {
    match opener {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Byte offset of the first `#` on a single line that is outside any string
/// literal, i.e. where the trailing comment starts.
fn comment_start(line: &str) -> Option<usize> {
    let mut in_str: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if let Some(quote) = in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_str = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_str = Some(c),
            '#' => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_code(line: &str) -> (&str, &str) {
    match comment_start(line) {
        Some(idx) => (&line[..idx], &line[idx..]),
        None => (line, ""),
    }
}

/// Rewrite the last line that carries code (not just a comment), keeping any
/// trailing comment in place.
fn edit_last_code_line(lines: &mut [String], edit: impl FnOnce(&str) -> String) {
    for line in lines.iter_mut().rev() {
        let (code, comment) = split_code(line);
        if code.trim().is_empty() {
            continue;
        }
        let code = edit(code.trim_end());
        *line = if comment.is_empty() {
            code
        } else {
            format!("{code}  {comment}")
        };
        return;
    }
}

/// Append missing closing delimiters (innermost first), or strip surplus
/// trailing ones, on the last code line. Delimiters inside string literals
/// and `#` comments never count.
pub fn balance_brackets(script: &str) -> String {
    let (open, surplus) = open_delimiters(script);
    if open.is_empty() && surplus == 0 {
        return script.to_string();
    }

    let mut lines: Vec<String> = script.lines().map(|l| l.to_string()).collect();

    if surplus > 0 {
        edit_last_code_line(&mut lines, |code| {
            let mut code = code.to_string();
            let mut left = surplus;
            while left > 0 && code.ends_with([')', ']', '}']) {
                code.pop();
                left -= 1;
            }
            code
        });
    }

    if !open.is_empty() {
        let closers: String = open.iter().rev().map(|&c| closer_for(c)).collect();
        edit_last_code_line(&mut lines, |code| format!("{code}{closers}"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests;
