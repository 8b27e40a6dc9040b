//! Pipeline facade.
//!
//! `validate_static` runs the deterministic text passes (clean, fix
//! table, normalizer, selector casing, structure, vocabulary) and
//! reports what remains unknown. `repair_raw` continues into the
//! sandbox with the bounded execution-feedback loop.

use serde::Serialize;

use crate::cleaner;
use crate::config::PipelineConfig;
use crate::fixes;
use crate::normalizer;
use crate::repair;
use crate::sandbox::{self, SolidModel};
use crate::structure;
use crate::vocab;

/* ───────────────────────── static pass ───────────────────────── */

/// Result of the text-only passes, before any execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticValidation {
    pub fixed_script: String,
    pub unknown_operations: Vec<String>,
}

impl StaticValidation {
    pub fn is_fully_valid(&self) -> bool {
        self.unknown_operations.is_empty()
    }
}

/// Run every deterministic pass in pipeline order. Never executes the
/// script and never fails; whatever cannot be fixed is reported in
/// `unknown_operations`.
pub fn validate_static(raw: &str) -> StaticValidation {
    let cleaned = cleaner::clean(raw);
    let fixed = fixes::apply_fix_table(&cleaned);
    let normalized = normalizer::normalize(&fixed);
    let cased = fixes::normalize_selector_case(&normalized);
    let structured = structure::validate(&cased);
    let report = vocab::validate(&structured);

    StaticValidation {
        fixed_script: report.fixed_script,
        unknown_operations: report.unknown_operations,
    }
}

/* ───────────────────────── full pipeline ───────────────────────── */

/// Result of the full pipeline including execution and repairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub success: bool,
    pub final_script: String,
    pub artifact: Option<SolidModel>,
    pub diagnostic: Option<String>,
    pub unknown_operations: Vec<String>,
    pub attempts: usize,
}

/// Repair raw generator output end to end: static passes first, then
/// sandbox execution with up to `max_retries` repair rounds.
pub fn repair_raw(raw: &str, cfg: &PipelineConfig) -> RepairOutcome {
    let static_pass = validate_static(raw);
    let trace = cfg.trace;

    if trace {
        eprintln!(
            "--- STATIC PASS ---\n{}\n-------------------",
            static_pass.fixed_script
        );
    }

    let outcome = repair::run_loop(
        &static_pass.fixed_script,
        cfg.max_retries,
        sandbox::run,
        |script, error| {
            if trace {
                eprintln!("repair round: {error}");
            }
            repair::apply_repair(script, error)
        },
    );

    if trace {
        if outcome.success {
            eprintln!("execution succeeded after {} attempt(s)", outcome.attempts);
        } else if let Some(err) = &outcome.error {
            eprintln!(
                "execution failed after {} attempt(s): {err}",
                outcome.attempts
            );
        }
    }

    if let Some(path) = &cfg.trace_log {
        append_trace_log(path, &outcome);
    }

    RepairOutcome {
        success: outcome.success,
        final_script: outcome.script,
        artifact: outcome.artifact,
        diagnostic: outcome.error,
        unknown_operations: static_pass.unknown_operations,
        attempts: outcome.attempts,
    }
}

/// Best effort: a failing trace log must never fail the pipeline.
fn append_trace_log(path: &std::path::Path, outcome: &repair::LoopOutcome<SolidModel>) {
    use std::io::Write;

    let entry = format!(
        "=== run: success={} attempts={}\n{}\n{}\n",
        outcome.success,
        outcome.attempts,
        outcome.script,
        outcome.error.as_deref().unwrap_or("ok"),
    );
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(entry.as_bytes());
    }
}
