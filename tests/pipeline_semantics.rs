use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

const MESSY_TRANSCRIPT: &str = "Here is the code you asked for:\n\
```python\n\
result = cq.Workplane(\"xy\").box((30, 20, 10)).facez(\">z\").hole(5)\n\
```\n";

fn write_script(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write script");
    path
}

#[test]
fn lint_repairs_a_messy_transcript() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "messy.txt", MESSY_TRANSCRIPT);

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cadmend").expect("bin build");
    cmd.arg("--lint")
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("import cadquery as cq"))
        .stdout(contains("cq.Workplane(\"XY\")"))
        .stdout(contains(".box(30, 20, 10)"))
        .stdout(contains(".faces(\">Z\")"));
}

#[test]
fn lint_flags_operations_it_cannot_fix() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        &dir,
        "unknown.py",
        "result = cq.Workplane(\"XY\").box(10, 10, 4).filet(2)",
    );

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cadmend").expect("bin build");
    cmd.arg("--lint")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("Unknown operations: filet"));
}

#[test]
fn run_executes_a_statically_repaired_script() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "messy.txt", MESSY_TRANSCRIPT);

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cadmend").expect("bin build");
    cmd.arg(&path)
        .assert()
        .success()
        .stdout(contains("\"success\": true"))
        .stdout(contains("\"attempts\": 1"))
        .stdout(contains("\"plane\": \"XY\""));
}

#[test]
fn run_uses_execution_feedback_for_near_miss_names() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        &dir,
        "near_miss.py",
        "result = cq.Workplane(\"XY\").box(10, 10, 4).filet(2)",
    );

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cadmend").expect("bin build");
    cmd.arg(&path)
        .assert()
        .success()
        .stdout(contains("\"success\": true"))
        .stdout(contains("\"attempts\": 2"))
        .stdout(contains(".fillet(2)"));
}

#[test]
fn run_fails_cleanly_on_unrepairable_scripts() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "hostile.py", "import os\nresult = os.getcwd()");

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cadmend").expect("bin build");
    cmd.arg(&path)
        .assert()
        .failure()
        .stdout(contains("\"success\": false"))
        .stdout(contains("outside the sandbox capability surface"));
}

#[test]
fn retry_budget_is_configurable() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        &dir,
        "near_miss.py",
        "result = cq.Workplane(\"XY\").box(10, 10, 4).filet(2)",
    );

    // With a zero budget the hint-driven repair never gets a chance.
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cadmend").expect("bin build");
    cmd.env("CADMEND_MAX_RETRIES", "0")
        .arg(&path)
        .assert()
        .failure()
        .stdout(contains("\"success\": false"))
        .stdout(contains("\"attempts\": 1"));
}
