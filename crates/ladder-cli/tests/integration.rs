#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn ladder() -> Command {
    let mut cmd = Command::cargo_bin("ladder").unwrap();
    cmd.env_remove("LADDER_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

const MOTOR: &str = r#"{
    "program_name": "Motor",
    "rungs": [
        {"rung_id": 0, "comment": "run while start held", "instructions": [
            {"type": "XIC", "tag": "START"},
            {"type": "OTE", "tag": "MOTOR"}
        ]},
        {"rung_id": 1, "instructions": [
            {"type": "XIC", "tag": "MOTOR"},
            {"type": "CTU", "tag": "RUNS", "preset": 100}
        ]}
    ]
}"#;

const IO: &str = r#"{
    "inputs": [{"tag": "START", "pin": 17}],
    "outputs": [{"tag": "MOTOR", "pin": 22}]
}"#;

// ---------------------------------------------------------------------------
// ladder check
// ---------------------------------------------------------------------------

#[test]
fn check_prints_rung_table() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    ladder()
        .arg("check")
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("Motor: 2 rungs, 4 instructions"))
        .stdout(predicate::str::contains("XIC(START) OTE(MOTOR)"))
        .stdout(predicate::str::contains("run while start held"));
}

#[test]
fn check_json_summary() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let output = ladder()
        .args(["check", "--json"])
        .arg(&program)
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["name"], "Motor");
    assert_eq!(summary["rung_count"], 2);
    assert_eq!(summary["instruction_count"], 4);
    assert_eq!(summary["rungs"][1]["instructions"][1], "CTU(RUNS, 100)");
}

#[test]
fn check_fails_on_missing_preset() {
    let dir = TempDir::new().unwrap();
    let program = write(
        &dir,
        "bad.json",
        r#"{"rungs": [{"rung_id": 4, "instructions": [{"type": "TON", "tag": "T"}]}]}"#,
    );
    ladder()
        .arg("check")
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required field 'preset'"));
}

#[test]
fn check_warns_on_unknown_instruction_but_loads() {
    let dir = TempDir::new().unwrap();
    let program = write(
        &dir,
        "lenient.json",
        r#"{"rungs": [{"rung_id": 0, "instructions": [
            {"type": "XIC", "tag": "A"}, {"type": "MOV", "tag": "B"}, {"type": "OTE", "tag": "C"}
        ]}]}"#,
    );
    ladder()
        .arg("check")
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("XIC(A) OTE(C)"))
        .stderr(predicate::str::contains("unknown instruction type: MOV"));
}

#[test]
fn check_logs_load_summary_at_info_by_default() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    ladder()
        .arg("check")
        .arg(&program)
        .assert()
        .success()
        .stderr(predicate::str::contains("loaded program"));
}

#[test]
fn check_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    ladder()
        .arg("check")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load program"));
}

#[test]
fn demo_programs_load() {
    for name in ["motor_control.json", "conveyor.yaml"] {
        ladder()
            .arg("check")
            .arg(demos().join(name))
            .assert()
            .success();
    }
}

// ---------------------------------------------------------------------------
// ladder run
// ---------------------------------------------------------------------------

#[test]
fn run_bounded_cycles_prints_statistics() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    ladder()
        .args(["run", "--cycles", "3", "--scan-time", "5"])
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("Total cycles: 3"))
        .stdout(predicate::str::contains("Overruns:"));
}

#[test]
fn run_json_summary() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let output = ladder()
        .args(["run", "--json", "--cycles", "2", "--scan-time", "1"])
        .arg(&program)
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["program"], "Motor");
    assert_eq!(summary["cycles"], 2);
    assert_eq!(summary["faulted"], false);
}

#[test]
fn run_with_simulated_io() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let io = write(&dir, "io.json", IO);
    ladder()
        .args(["run", "--cycles", "2", "--scan-time", "1", "--io-config"])
        .arg(&io)
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("Total cycles: 2"));
}

#[test]
fn run_rejects_bad_io_config_unless_disabled() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let io = write(
        &dir,
        "io.json",
        r#"{"inputs": [{"tag": "A", "pin": 1}, {"tag": "B", "pin": 1}]}"#,
    );

    ladder()
        .args(["run", "--cycles", "1", "--io-config"])
        .arg(&io)
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("pin 1 is bound more than once"));

    ladder()
        .args(["run", "--cycles", "1", "--no-io", "--io-config"])
        .arg(&io)
        .arg(&program)
        .assert()
        .success();
}

#[test]
fn run_rejects_zero_scan_time() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    ladder()
        .args(["run", "--cycles", "1", "--scan-time", "0"])
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("scan period must be greater than 0"));
}

#[test]
fn run_reads_runtime_config() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let config = write(&dir, "runtime.yaml", "scan_period_ms: 1\nmax_cycles: 4\n");
    ladder()
        .args(["run", "--config"])
        .arg(&config)
        .arg(&program)
        .assert()
        .success()
        .stdout(predicate::str::contains("Total cycles: 4"));
}

#[test]
fn state_file_carries_tags_across_runs() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let state = dir.path().join("state.json");

    for _ in 0..2 {
        ladder()
            .args(["run", "--cycles", "3", "--scan-time", "1", "--state-file"])
            .arg(&state)
            .arg(&program)
            .assert()
            .success();
    }

    ladder()
        .arg("tags")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("from 'Motor'"))
        .stdout(predicate::str::is_match(r"_SYSTEM\.CYCLE_COUNT\s+int\s+6").unwrap())
        .stdout(predicate::str::is_match(r"_SYSTEM\.RUNNING\s+bool\s+false").unwrap());
}

#[test]
fn console_injects_tags_and_quits() {
    let dir = TempDir::new().unwrap();
    let program = write(&dir, "motor.json", MOTOR);
    let state = dir.path().join("state.json");

    ladder()
        .args(["run", "--console", "--scan-time", "5", "--state-file"])
        .arg(&state)
        .arg(&program)
        .write_stdin("set START 1\nget START\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("START = true"));

    let output = ladder()
        .args(["tags", "--json"])
        .arg(&state)
        .output()
        .unwrap();
    let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(snapshot["tags"]["START"], true);
}

// ---------------------------------------------------------------------------
// ladder tags
// ---------------------------------------------------------------------------

#[test]
fn tags_missing_snapshot_fails() {
    let dir = TempDir::new().unwrap();
    ladder()
        .arg("tags")
        .arg(dir.path().join("none.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read snapshot"));
}
