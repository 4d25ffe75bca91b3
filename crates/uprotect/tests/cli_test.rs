//! Integration tests for the `uprotect` CLI binary.
//!
//! Argument parsing, help output, shell completions, and configuration
//! errors, all without a reachable NVR.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `uprotect` binary with env isolation.
///
/// Clears all `UPROTECT_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn uprotect_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("uprotect");
    cmd.env("HOME", "/tmp/uprotect-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/uprotect-cli-test-nonexistent")
        .env_remove("UPROTECT_PROFILE")
        .env_remove("UPROTECT_CONTROLLER")
        .env_remove("UPROTECT_USERNAME")
        .env_remove("UPROTECT_PASSWORD")
        .env_remove("UPROTECT_OUTPUT")
        .env_remove("UPROTECT_INSECURE")
        .env_remove("UPROTECT_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = uprotect_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    uprotect_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("UniFi Protect")
            .and(predicate::str::contains("bootstrap"))
            .and(predicate::str::contains("device"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    uprotect_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("uprotect"));
}

#[test]
fn test_invalid_subcommand() {
    uprotect_cmd()
        .arg("frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("frobnicate"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    uprotect_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("uprotect"));
}

#[test]
fn test_completions_zsh() {
    uprotect_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_fish() {
    uprotect_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_device_rejects_unknown_kind() {
    uprotect_cmd()
        .args(["device", "toaster", "abc"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("toaster"));
}

#[test]
fn test_device_requires_id() {
    uprotect_cmd().args(["device", "camera"]).assert().code(2);
}

#[test]
fn test_control_chime_volume_is_bounded() {
    uprotect_cmd()
        .args(["control", "chime", "ch-1", "--volume", "101"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("101"));
}

#[test]
fn test_control_light_requires_on_or_off() {
    uprotect_cmd()
        .args(["control", "light", "l-1", "dim"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("dim"));
}

#[test]
fn test_control_help_lists_commands() {
    uprotect_cmd().args(["control", "--help"]).assert().success().stdout(
        predicate::str::contains("patch")
            .and(predicate::str::contains("reboot"))
            .and(predicate::str::contains("unlock"))
            .and(predicate::str::contains("snapshot")),
    );
}

#[test]
fn test_control_without_config_fails() {
    let output = uprotect_cmd().args(["control", "lock", "d-1"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(
        text.contains("Configuration file not found"),
        "Expected missing-config diagnostic:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    uprotect_cmd()
        .args(["--output", "yaml", "bootstrap"])
        .assert()
        .code(2);
}

// ── Configuration errors ────────────────────────────────────────────

#[test]
fn test_bootstrap_without_config_fails() {
    let output = uprotect_cmd().arg("bootstrap").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(
        text.contains("Configuration file not found"),
        "Expected missing-config diagnostic:\n{text}"
    );
}

#[test]
fn test_missing_profile_is_reported() {
    let output = uprotect_cmd()
        .args(["--profile", "attic", "watch"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(text.contains("attic"), "Expected profile name in output:\n{text}");
}

#[test]
fn test_flags_without_username_report_credentials() {
    let output = uprotect_cmd()
        .args(["--controller", "https://10.0.0.1", "bootstrap"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_invalid_controller_url_is_usage_error() {
    uprotect_cmd()
        .args(["--controller", "not a url", "--username", "u", "bootstrap"])
        .assert()
        .code(2);
}

#[test]
fn test_config_path_prints_location() {
    uprotect_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

// ── Config file ─────────────────────────────────────────────────────

/// Write a two-profile config under a temp `XDG_CONFIG_HOME`.
#[cfg(target_os = "linux")]
fn with_config() -> (tempfile::TempDir, assert_cmd::Command) {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("uprotect");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(
        app.join("config.toml"),
        r#"
default_profile = "home"

[profiles.home]
controller = "https://10.0.0.1"
username = "viewer"
password = "hunter2"

[profiles.cabin]
controller = "https://10.9.0.1"
username = "viewer"
"#,
    )
    .unwrap();

    let mut cmd = uprotect_cmd();
    cmd.env("XDG_CONFIG_HOME", dir.path());
    (dir, cmd)
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_show_masks_password() {
    let (_dir, mut cmd) = with_config();
    cmd.args(["config", "show"]).assert().success().stdout(
        predicate::str::contains("[profiles.cabin]")
            .and(predicate::str::contains("password = \"****\""))
            .and(predicate::str::contains("hunter2").not()),
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_profiles_marks_default() {
    let (_dir, mut cmd) = with_config();
    cmd.args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* home").and(predicate::str::contains("  cabin")));
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_use_unknown_profile_fails() {
    let (_dir, mut cmd) = with_config();
    let output = cmd.args(["config", "use", "attic"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(text.contains("cabin, home"), "Expected available profiles:\n{text}");
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_use_switches_default() {
    let (dir, mut cmd) = with_config();
    cmd.args(["config", "use", "cabin"]).assert().success();

    let saved = std::fs::read_to_string(dir.path().join("uprotect/config.toml")).unwrap();
    assert!(saved.contains("default_profile = \"cabin\""), "{saved}");
}
