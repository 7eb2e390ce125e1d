//! CLI integration tests.

mod support;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn loadseek() -> Command {
    let mut cmd = cargo_bin_cmd!("loadseek");
    cmd.env_remove("CONTROLLER_PASSWORD").arg("--color=never");
    cmd
}

#[test]
fn help_lists_commands() {
    loadseek()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("loadseek"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_is_printed() {
    loadseek()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn check_lists_selected_tests() {
    let dir = tempfile::tempdir().unwrap();
    let config = support::config::config_toml(&[
        support::config::test_entry("tput_nightly", "nightly", 1),
        support::config::test_entry("tput_weekly", "weekly", 2),
    ]);
    let path = support::config::write_config(dir.path(), &config);

    loadseek()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("tput_nightly"))
        .stdout(predicate::str::contains("tput_weekly").not());
}

#[test]
fn check_honours_suite_flag() {
    let dir = tempfile::tempdir().unwrap();
    let config = support::config::config_toml(&[
        support::config::test_entry("tput_nightly", "nightly", 1),
        support::config::test_entry("tput_weekly", "weekly", 2),
    ]);
    let path = support::config::write_config(dir.path(), &config);

    loadseek()
        .arg("--config")
        .arg(&path)
        .args(["check", "--suite", "weekly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tput_weekly"))
        .stdout(predicate::str::contains("tput_nightly").not());
}

#[test]
fn check_json_emits_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = support::config::write_config(
        dir.path(),
        &support::config::config_toml(&[support::config::test_entry("tput", "nightly", 1)]),
    );

    loadseek()
        .arg("--json")
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""type":"success""#));
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();

    loadseek()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn invalid_test_entry_fails_check() {
    let dir = tempfile::tempdir().unwrap();
    let entry = support::config::test_entry("tput", "nightly", 1)
        .replace("capacity_adj = 1", r#"capacity_adj = "plenty""#);
    let path = support::config::write_config(dir.path(), &support::config::config_toml(&[entry]));

    loadseek()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("capacity_adj"));
}

#[test]
fn run_with_no_selected_tests_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = support::config::write_config(dir.path(), support::config::CONTROLLER);

    loadseek()
        .arg("--config")
        .arg(&path)
        .arg("run")
        .arg("--report-dir")
        .arg(dir.path().join("reports"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No tests selected"));
}
