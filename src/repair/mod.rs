//! Execution-feedback repair loop.
//!
//! When a script fails in the sandbox, the error message is classified
//! into a category, a category-specific rewrite is applied, and the
//! script is re-executed. The loop is bounded by a retry budget and
//! stops early when a repair produces the exact same script that just
//! failed (stagnation) or when no repair applies at all.

use std::sync::OnceLock;

use regex::Regex;

use crate::fixes;
use crate::normalizer;
use crate::structure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    UnknownAttribute,
    NotCallable,
    TypeMismatchTuple,
    SyntaxMalformed,
    MissingOutputBinding,
    Unclassified,
}

/// Map an execution error message to a repair category. Checks are
/// ordered: attribute errors outrank argument errors, which outrank
/// plain syntax errors.
pub fn classify(message: &str) -> ErrorCategory {
    if message.contains("no attribute") {
        ErrorCategory::UnknownAttribute
    } else if message.contains("is not callable") {
        ErrorCategory::NotCallable
    } else if message.contains("tuple") || message.contains("positional argument") {
        ErrorCategory::TypeMismatchTuple
    } else if message.contains("unexpected end of input")
        || message.contains("unbalanced")
        || message.contains("syntax")
    {
        ErrorCategory::SyntaxMalformed
    } else if message.contains("did not bind 'result'") {
        ErrorCategory::MissingOutputBinding
    } else {
        ErrorCategory::Unclassified
    }
}

fn bad_attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"no attribute '([A-Za-z_][A-Za-z0-9_]*)'").unwrap())
}

fn suggestion_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Did you mean '([A-Za-z_][A-Za-z0-9_]*)'").unwrap())
}

/// Fix-table and normalizer passes every repaired script goes back
/// through before re-execution.
fn finish(script: &str) -> String {
    normalizer::normalize(&fixes::apply_fix_table(script))
}

/// Produce a repaired script for a failed execution, or `None` when the
/// error category has no deterministic rewrite.
pub fn apply_repair(script: &str, error: &str) -> Option<String> {
    match classify(error) {
        ErrorCategory::UnknownAttribute => {
            let bad = bad_attribute_re().captures(error)?.get(1)?.as_str();
            let replacement = suggestion_re()
                .captures(error)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .or_else(|| fixes::reverse_fix(bad))?;
            let call_re = Regex::new(&format!(r"\b{}\s*\(", regex::escape(bad))).ok()?;
            let swapped = call_re
                .replace_all(script, format!("{replacement}("))
                .into_owned();
            Some(finish(&swapped))
        }
        ErrorCategory::NotCallable => Some(finish(script)),
        ErrorCategory::TypeMismatchTuple => {
            Some(finish(&normalizer::unwrap_tuples(script)))
        }
        ErrorCategory::SyntaxMalformed => Some(finish(&structure::balance_brackets(script))),
        ErrorCategory::MissingOutputBinding => {
            Some(finish(&structure::ensure_output_binding(script)))
        }
        ErrorCategory::Unclassified => None,
    }
}

/// Final state of a repair loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome<T> {
    pub success: bool,
    pub script: String,
    pub artifact: Option<T>,
    pub error: Option<String>,
    pub attempts: usize,
}

/// Drive execute/repair rounds until success, a terminal error, a
/// stagnant repair, or an exhausted retry budget. `max_retries` counts
/// repair rounds, so at most `max_retries + 1` executions happen.
pub fn run_loop<T, E, R>(initial: &str, max_retries: usize, mut execute: E, repair: R) -> LoopOutcome<T>
where
    E: FnMut(&str) -> Result<T, String>,
    R: Fn(&str, &str) -> Option<String>,
{
    let mut script = initial.to_string();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        let error = match execute(&script) {
            Ok(artifact) => {
                return LoopOutcome {
                    success: true,
                    script,
                    artifact: Some(artifact),
                    error: None,
                    attempts,
                };
            }
            Err(e) => e,
        };

        if attempts > max_retries {
            return LoopOutcome {
                success: false,
                script,
                artifact: None,
                error: Some(error),
                attempts,
            };
        }

        match repair(&script, &error) {
            Some(next) if next != script => script = next,
            _ => {
                return LoopOutcome {
                    success: false,
                    script,
                    artifact: None,
                    error: Some(error),
                    attempts,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests;
