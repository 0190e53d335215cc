use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

#[allow(deprecated)]
fn get_kestrel_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin("kestrel")
}

#[test]
fn test_run_command_help() {
    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("run").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Run a fixed scenario"))
        .stdout(predicate::str::contains("--report"))
        .stdout(predicate::str::contains("--chrome-path"))
        .stdout(predicate::str::contains("--profile"));
}

#[test]
fn test_run_missing_scenario_file() {
    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("run").arg("/nonexistent/scenario.yaml");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("could not load scenario"));
}

#[test]
fn test_run_invalid_scenario_rejected_before_browser() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.yaml");
    std::fs::write(&path, "name: empty\nstart_url: https://example.com\nsteps: []\n").unwrap();

    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("run").arg(&path);

    // Validation fires without Chrome being involved
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no steps"));
}

#[test]
fn test_run_malformed_yaml_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "name: [unclosed\n").unwrap();

    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("run").arg(&path);

    cmd.assert().failure();
}
