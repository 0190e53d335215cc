use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

#[allow(deprecated)]
fn get_kestrel_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin("kestrel")
}

#[test]
fn test_explore_command_help() {
    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("explore").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("external decision-maker"))
        .stdout(predicate::str::contains("--goal"))
        .stdout(predicate::str::contains("--max-steps"))
        .stdout(predicate::str::contains("--decision-timeout"))
        .stdout(predicate::str::contains("--exchange-dir"))
        .stdout(predicate::str::contains("--chrome-path"))
        .stdout(predicate::str::contains("--headed"));
}

#[test]
fn test_explore_requires_goal() {
    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("explore").arg("https://example.com");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("required"))
        .stderr(predicate::str::contains("--goal"));
}

#[test]
fn test_explore_rejects_username_without_password() {
    let mut cmd = Command::new(get_kestrel_bin());
    cmd.env_remove("KESTREL_PASSWORD");
    cmd.arg("explore")
        .arg("https://example.com")
        .arg("--goal")
        .arg("log in")
        .arg("--username")
        .arg("tester");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be given together"));
}

#[test]
fn test_explore_missing_chrome_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::new(get_kestrel_bin());
    cmd.arg("explore")
        .arg("https://example.com")
        .arg("--goal")
        .arg("reach the dashboard")
        .arg("--exchange-dir")
        .arg(dir.path().join("mailbox"))
        .arg("--chrome-path")
        .arg("/nonexistent/chrome");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Chrome not found"));
}
