use std::env;
use std::fs;
use std::io::{self, Write};

use cadmend::banner;
use cadmend::config::PipelineConfig;
use cadmend::{repair_raw, validate_static, RepairOutcome};

const CADMEND_VERSION: &str = env!("CARGO_PKG_VERSION");
const CADMEND_ABOUT: &str = "CadMend CLI – repairs what the model broke.";

fn print_version() {
    println!("🛠 CadMend version {}", CADMEND_VERSION);
}

fn print_about() {
    println!("🧩 {}", CADMEND_ABOUT);
}

fn print_help() {
    println!(
        r#"
CadMend — help

What it does:
────────────────────────────────
Takes raw LLM output that is supposed to be a CadQuery-style script,
deterministically repairs it (markdown fences, prose, misspelled and
hallucinated operations, tuple arguments, broken chains, missing
`result` binding), executes it in a capability-restricted sandbox, and
repairs again from the execution errors — up to a bounded number of
rounds.

Usage:
────────────────────────────────
cadmend <file>                 → Repair + execute a script, print the outcome as JSON
cadmend --lint <file>          → Static passes only, print fixed script + unknown operations
cadmend                        → Interactive mode (paste a transcript, finish with an empty line)

Options:
────────────────────────────────
help, --help, -h               → This text
--version, -v                  → Version
--about                        → One-liner

Environment:
────────────────────────────────
CADMEND_MAX_RETRIES            → Repair rounds after the first execution (default 3, max 8)
CADMEND_TRACE=1                → Print the normalized script and repair rounds to stderr

# REST API server
cargo run --bin cadmend-server
"#
    );
}

fn print_outcome(outcome: &RepairOutcome) {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing outcome: {e}"),
    }
}

fn run_file(path: &str, cfg: &PipelineConfig) {
    match fs::read_to_string(path) {
        Ok(contents) => {
            println!("Repairing script: {path}");
            let outcome = repair_raw(&contents, cfg);
            print_outcome(&outcome);
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error reading file: {e}");
            std::process::exit(1);
        }
    }
}

fn lint_file(path: &str) {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let report = validate_static(&contents);
            println!("{}", report.fixed_script);
            if !report.unknown_operations.is_empty() {
                eprintln!("Unknown operations: {}", report.unknown_operations.join(", "));
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error reading file: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    banner::print_banner();
    let cfg = PipelineConfig::from_env();

    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "help" | "--help" | "-h" => print_help(),
            "--version" | "-v" => print_version(),
            "--about" => print_about(),
            "--lint" => {
                if let Some(path) = args.get(2) {
                    lint_file(path);
                } else {
                    eprintln!("Usage: cadmend --lint <file>");
                    std::process::exit(2);
                }
            }
            path => run_file(path, &cfg),
        }
        return;
    }

    // Interactive mode
    loop {
        println!("Paste a transcript (finish with an empty line):");

        let mut input_block = String::new();
        loop {
            print!("... ");
            io::stdout().flush().unwrap();

            let mut line = String::new();
            if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
                println!("Exiting...");
                return;
            }
            if line.trim().is_empty() {
                break;
            }
            input_block.push_str(&line);
        }

        let trimmed = input_block.trim();
        match trimmed {
            "exit" => {
                println!("Exiting...");
                break;
            }
            "help" => {
                print_help();
                continue;
            }
            "version" | "--version" | "-v" => {
                print_version();
                continue;
            }
            "about" | "--about" => {
                print_about();
                continue;
            }
            "" => continue,
            _ => {}
        }

        print_outcome(&repair_raw(trimmed, &cfg));
    }
}
