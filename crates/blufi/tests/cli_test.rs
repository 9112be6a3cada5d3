//! Integration tests for the `blufi` CLI binary.
//!
//! Argument parsing, help output, completions, error exit codes, and dry
//! runs against the simulated bridge. No radio needed.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `blufi` binary with env isolation.
///
/// Clears all `BLUFI_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn blufi_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("blufi");
    cmd.env("HOME", "/tmp/blufi-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/blufi-cli-test-nonexistent")
        .env_remove("BLUFI_PROFILE")
        .env_remove("BLUFI_OUTPUT")
        .env_remove("BLUFI_SIMULATE")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = blufi_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_flag() {
    blufi_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Bluetooth LE")
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("networks"))
            .and(predicate::str::contains("provision")),
    );
}

#[test]
fn test_version_flag() {
    blufi_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blufi"));
}

#[test]
fn test_completions_zsh() {
    blufi_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blufi"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_prints_toml_location() {
    blufi_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_masks_plaintext_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("blufi");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[profiles.lab]\nssid = \"LabNet\"\nsecret = \"hunter2\"\n",
    )
    .unwrap();

    let output = blufi_cmd()
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();
    let text = combined_output(&output);
    assert!(output.status.success(), "{text}");
    assert!(!text.contains("hunter2"), "{text}");
}

// ── Adapter ─────────────────────────────────────────────────────────

#[test]
fn test_discover_without_radio_is_a_connection_error() {
    let output = blufi_cmd().arg("discover").output().unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert!(combined_output(&output).contains("--simulate"));
}

// ── Simulated dry runs ──────────────────────────────────────────────

#[test]
fn test_simulated_discover_lists_devices() {
    blufi_cmd()
        .args(["--simulate", "--sim-devices", "2", "discover", "-t", "800ms", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("24:0A:C4:00:00:01")
                .and(predicate::str::contains("24:0A:C4:00:00:02")),
        );
}

#[test]
fn test_simulated_discover_filter() {
    blufi_cmd()
        .args(["--simulate", "--sim-devices", "2", "discover", "-t", "800ms", "-f", "DEVICE_2", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("24:0A:C4:00:00:02").and(predicate::str::contains("00:00:01").not()));
}

#[test]
fn test_simulated_networks_lists_scan_results() {
    let output = blufi_cmd()
        .args(["--simulate", "networks", "-d", "24:0A:C4:00:00:01", "-o", "json"])
        .output()
        .unwrap();
    let text = combined_output(&output);
    assert!(output.status.success(), "{text}");
    let networks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(networks[0]["ssid"], "HomeNet");
    assert_eq!(networks.as_array().unwrap().len(), 4);
}

#[test]
fn test_unknown_device_is_not_found() {
    let output = blufi_cmd()
        .args(["--simulate", "networks", "-d", "AA:BB:CC:DD:EE:FF", "--discover-timeout", "500ms"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_provision_without_ssid_is_a_usage_error() {
    let output = blufi_cmd()
        .args(["--simulate", "-y", "provision", "-d", "24:0A:C4:00:00:01"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("ssid"));
}

#[test]
fn test_provision_with_missing_secret_env_is_rejected() {
    let output = blufi_cmd()
        .args([
            "--simulate",
            "-y",
            "provision",
            "-d",
            "24:0A:C4:00:00:01",
            "--ssid",
            "HomeNet",
            "--secret-env",
            "BLUFI_TEST_SECRET_THAT_IS_NOT_SET",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_broker_port_requires_host() {
    let output = blufi_cmd()
        .args(["--simulate", "provision", "-d", "x", "--broker-port", "1883"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}
