//! Basic CLI tests for the osi2ctl command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;

const MISSING_DIR: &str = "/nonexistent/osi2/plugins";

/// `osi2ctl` with the logging and config environment cleared.
fn osi2ctl() -> Command {
    let mut cmd = Command::cargo_bin("osi2ctl").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("OSI2_LOG_LEVEL")
        .env_remove("OSI2_LOG_JSON")
        .env_remove("OSI2_PLUGIN_DIR")
        .env("NO_COLOR", "1");
    cmd
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    osi2ctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("name"));
}

#[test]
fn test_name_prints_conventional_file_name() {
    let expected = format!("libOsi2ClpShim{}\n", std::env::consts::DLL_SUFFIX);
    osi2ctl()
        .args(["name", "clp"])
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn test_name_rejects_empty_short_name() {
    osi2ctl().args(["name", ""]).assert().failure();
}

#[test]
fn test_load_missing_library_fails() {
    osi2ctl()
        .args(["load", "x", "--dir", MISSING_DIR])
        .assert()
        .failure()
        .stdout(predicate::str::contains("load_failed (-2)"));
}

#[test]
fn test_json_records() {
    let output = osi2ctl()
        .args(["--json", "load", "x", "--dir", MISSING_DIR])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["step"], "load");
    assert_eq!(records[0]["status"], "load_failed");
    assert_eq!(records[0]["code"], -2);
    assert!(records[0]["error"].is_string());
}

#[test]
fn test_object_cycle_stops_after_failed_load() {
    osi2ctl()
        .args(["probe", "x", "SolverInterface", "--dir", MISSING_DIR])
        .assert()
        .failure()
        .stdout(predicate::str::contains("load_failed (-2)"))
        .stdout(predicate::str::contains("create").not());
}

#[test]
fn test_verbose_shows_debug_events() {
    osi2ctl()
        .args(["--verbose", "load", "x", "--dir", MISSING_DIR])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Control initialised"));
}

#[test]
fn test_debug_events_hidden_by_default() {
    osi2ctl()
        .args(["load", "x", "--dir", MISSING_DIR])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Control initialised").not())
        .stderr(predicate::str::contains("Failed to load library"));
}
