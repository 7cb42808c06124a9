//! Integration tests for the `zhaws` CLI binary.
//!
//! Argument parsing, config file handling, and exit codes, all without a
//! running server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `zhaws` binary with env isolation.
///
/// Clears all `ZHAWS_*` env vars and points config directories at `home`
/// so tests never touch the user's real configuration.
fn zhaws_cmd(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("zhaws");
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("ZHAWS_PROFILE")
        .env_remove("ZHAWS_URL")
        .env_remove("ZHAWS_OUTPUT")
        .env_remove("ZHAWS_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn home() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A port nothing listens on: bind, note the port, release it.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = home();
    let output = zhaws_cmd(&home).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = home();
    zhaws_cmd(&home).arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("groups"))
            .and(predicate::str::contains("network"))
            .and(predicate::str::contains("events")),
    );
}

#[test]
fn test_version_flag() {
    let home = home();
    zhaws_cmd(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("zhaws"));
}

#[test]
fn test_completions_bash() {
    let home = home();
    zhaws_cmd(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Usage errors ────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = home();
    zhaws_cmd(&home).arg("foobar").assert().code(2);
}

#[test]
fn test_malformed_ieee_is_rejected_by_the_parser() {
    let home = home();
    zhaws_cmd(&home)
        .args(["devices", "get", "not-an-address"])
        .assert()
        .code(2);
}

#[test]
fn test_entity_requires_an_owner() {
    let home = home();
    zhaws_cmd(&home)
        .args(["entity", "on", "switch_1"])
        .assert()
        .code(2);
}

#[test]
fn test_non_websocket_url_is_a_usage_error() {
    let home = home();
    let output = zhaws_cmd(&home)
        .args(["--url", "http://127.0.0.1:8001", "devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("ws://"));
}

#[test]
fn test_unknown_profile_is_a_usage_error() {
    let home = home();
    let output = zhaws_cmd(&home)
        .args(["--profile", "attic", "devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("attic"));
}

// ── Connection errors ───────────────────────────────────────────────

#[test]
fn test_unreachable_server_exits_with_connection_code() {
    let home = home();
    let url = format!("ws://127.0.0.1:{}", closed_port());
    let output = zhaws_cmd(&home)
        .args(["--url", url.as_str(), "devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert!(combined_output(&output).contains("127.0.0.1"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_lives_under_the_config_home() {
    let home = home();
    zhaws_cmd(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("zhaws").and(predicate::str::contains("config.toml")));
}

#[test]
fn test_config_init_then_show() {
    let home = home();
    zhaws_cmd(&home)
        .args(["config", "init", "--host", "hub.local", "--port", "9001"])
        .assert()
        .success();

    zhaws_cmd(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hub.local").and(predicate::str::contains("9001")));

    let output = zhaws_cmd(&home)
        .args(["config", "show", "--output", "json"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["profiles"]["default"]["port"], 9001);
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let home = home();
    zhaws_cmd(&home).args(["config", "init"]).assert().success();
    zhaws_cmd(&home)
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
    zhaws_cmd(&home)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}
