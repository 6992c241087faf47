//! End-to-end tests of the `rift` binary. None of them reach the listening
//! state, so they terminate on their own.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rift() -> Command {
    let mut cmd = Command::cargo_bin("rift").unwrap();
    cmd.env_remove("RIFT_PORT")
        .env_remove("RIFT_HOST")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn write_manifest(root: &Path, dev_script: &str) {
    fs::write(
        root.join("package.json"),
        format!(r#"{{"scripts":{{"dev":"{dev_script}"}}}}"#),
    )
    .unwrap();
}

#[test]
fn test_help_lists_dev() {
    rift()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dev"));
}

#[test]
fn test_dev_help_lists_flags() {
    rift()
        .args(["dev", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--editor-stdio"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_refuses_without_rift_dev_script() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), "vite");

    rift()
        .arg("dev")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not run rift"));
}

#[test]
fn test_refuses_without_manifest() {
    let dir = TempDir::new().unwrap();

    rift()
        .arg("dev")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("scripts.dev is missing"));
}

#[test]
fn test_missing_explicit_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), "rift dev");

    rift()
        .arg("dev")
        .arg(dir.path())
        .args(["--config"])
        .arg(dir.path().join("missing.config.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"))
        .stderr(predicate::str::contains("missing.config.json"));
}

#[test]
fn test_invalid_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), "rift");
    fs::write(dir.path().join("rift.config.json"), "{ not json").unwrap();

    rift()
        .arg("dev")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn test_unknown_stage_aborts_startup() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("rift.config.json"),
        r#"{"configureServer": ["does-not-exist"]}"#,
    )
    .unwrap();

    rift()
        .arg("dev")
        .arg(dir.path())
        .args(["--force", "--host", "127.0.0.1", "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("continuing because of --force"))
        .stderr(predicate::str::contains("does-not-exist"));
}

#[test]
fn test_invalid_env_port_is_reported() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), "rift dev");

    rift()
        .arg("dev")
        .arg(dir.path())
        .env("RIFT_PORT", "eighty")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid server settings"));
}

#[test]
fn test_invalid_mode_rejected_by_parser() {
    rift()
        .args(["dev", "--mode", "../prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Mode can only contain"));
}
