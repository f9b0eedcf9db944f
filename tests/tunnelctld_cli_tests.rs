//! Integration tests for the tunnelctld binary
//!
//! Only flags that exit immediately are exercised; running the daemon
//! itself needs signals and usually root.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn tunnelctld() -> Command {
    Command::cargo_bin("tunnelctld").unwrap()
}

#[test]
fn test_help_command() {
    tunnelctld()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tunnel Control Daemon"))
        .stdout(predicate::str::contains("--check-config"));
}

#[test]
fn test_check_config_defaults_when_missing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    tunnelctld()
        .arg("--config")
        .arg(&path)
        .arg("--check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("adapter_slots = 10"))
        .stdout(predicate::str::contains("platform_timeout_ms = 10000"))
        .stdout(predicate::str::contains("WireGuardTunnel$tunnelctl{slot}"));
}

#[test]
fn test_check_config_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tunnelctld.toml");
    fs::write(
        &path,
        "[logging]\nlevel = \"debug\"\n\n[cleanup]\nadapter_slots = 3\nservice_release_delay_ms = 250\n",
    )
    .unwrap();

    tunnelctld()
        .arg("--config")
        .arg(&path)
        .arg("--check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("adapter_slots = 3"))
        .stdout(predicate::str::contains("service_release_delay_ms = 250"))
        .stdout(predicate::str::contains("level = \"debug\""));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[cleanup]\nadapter_slots = \"ten\"\n").unwrap();

    tunnelctld()
        .arg("--config")
        .arg(&path)
        .arg("--check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}
