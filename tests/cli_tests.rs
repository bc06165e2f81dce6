//! Integration tests for CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn confstack() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("confstack"));
    // Hermetic: no channel/override/home leakage from the test machine.
    cmd.env_clear();
    cmd
}

#[test]
fn test_cli_version() {
    let mut cmd = confstack();
    cmd.arg("--version");
    cmd.assert().success().stdout(predicate::str::contains("confstack"));
}

#[test]
fn test_cli_help() {
    let mut cmd = confstack();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("channels"));
}

#[test]
fn test_channels_lists_all_with_default() {
    let mut cmd = confstack();
    cmd.arg("channels");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("dev (default)"))
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("beta"))
        .stdout(predicate::str::contains("prod"));
}

#[test]
fn test_show_merges_override_file() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.toml");
    fs::write(&file, "[dev.my_app.server]\nport = 8080\n").expect("write");

    let mut cmd = confstack();
    cmd.args(["show", "my_app", "--file"]).arg(&file);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("8080"))
        .stdout(predicate::str::contains("server"));
}

#[test]
fn test_show_selects_channel() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.toml");
    fs::write(
        &file,
        "[dev.my_app.server]\nport = 8000\n\n[prod.my_app.server]\nport = 80\n",
    )
    .expect("write");

    let mut cmd = confstack();
    cmd.args(["show", "my_app", "--channel", "prod", "--file"]).arg(&file);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("80"))
        .stdout(predicate::str::contains("8000").not());
}

#[test]
fn test_show_rejects_invalid_channel() {
    let mut cmd = confstack();
    cmd.args(["show", "my_app", "--channel", "staging"]);
    cmd.assert().failure().stderr(predicate::str::contains("invalid channel"));
}

#[test]
fn test_show_resolves_templates() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.yaml");
    fs::write(
        &file,
        "dev:\n  my_app:\n    server:\n      run_dir: /srv/run\n      db: \"sqlite://{{my_app.server.run_dir}}/app.db\"\n",
    )
    .expect("write");

    let mut cmd = confstack();
    cmd.args(["show", "my_app", "--file"]).arg(&file);
    cmd.assert().success().stdout(predicate::str::contains("sqlite:///srv/run/app.db"));
}

#[test]
fn test_show_env_var_overrides_file() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.toml");
    fs::write(&file, "[dev.my_app.server]\nport = 8080\n").expect("write");

    let mut cmd = confstack();
    cmd.env("MY_APP_SERVER_PORT", "9999");
    cmd.args(["show", "my_app", "--file"]).arg(&file);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("9999"))
        .stdout(predicate::str::contains("8080").not());
}

#[test]
fn test_check_reports_present_and_absent_channels() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.toml");
    fs::write(
        &file,
        "[dev.my_app.server]\nport = 8000\ntimeout = 30\n\n[prod.my_app.server]\nport = 80\n",
    )
    .expect("write");

    let mut cmd = confstack();
    cmd.arg("check").arg(&file);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("dev: ok (2 parameters)"))
        .stdout(predicate::str::contains("alpha: absent"))
        .stdout(predicate::str::contains("prod: ok (1 parameter)"));
}

#[test]
fn test_check_rejects_malformed_file() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.toml");
    fs::write(&file, "not [valid toml\n").expect("write");

    let mut cmd = confstack();
    cmd.arg("check").arg(&file);
    cmd.assert().failure().stderr(predicate::str::contains("invalid"));
}

#[test]
fn test_check_requires_some_channel_table() {
    let tmp = TempDir::new().expect("tmp");
    let file = tmp.path().join("conf.toml");
    fs::write(&file, "[staging.my_app.server]\nport = 1\n").expect("write");

    let mut cmd = confstack();
    cmd.arg("check").arg(&file);
    cmd.assert().failure().stderr(predicate::str::contains("no channel tables"));
}
