//! CLI output behavior against an isolated, empty termhive home.
//!
//! The default behavior is quiet (no logs). Use -v/--verbose to enable logs.

use std::path::Path;
use std::process::{Command, Output};

fn termhive(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_termhive"))
        .env("TERMHIVE_HOME", home)
        .current_dir(home)
        .args(args)
        .output()
        .expect("Failed to execute termhive")
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    let output = termhive(home.path(), &["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["daemon", "create", "list", "send", "state", "close", "console"] {
        assert!(stdout.contains(command), "help is missing '{}': {}", command, stdout);
    }
}

#[test]
fn test_completions_generate_script() {
    let home = tempfile::tempdir().unwrap();
    let output = termhive(home.path(), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("termhive"));
}

#[test]
fn test_daemon_status_without_daemon() {
    let home = tempfile::tempdir().unwrap();
    let output = termhive(home.path(), &["daemon", "status"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not running"), "got: {}", stdout);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains(r#""level":"INFO""#),
        "Default mode should suppress INFO logs, got: {}",
        stderr
    );
}

#[test]
fn test_verbose_mode_emits_json_logs_on_stderr() {
    let home = tempfile::tempdir().unwrap();
    let output = termhive(home.path(), &["-v", "daemon", "status"]);
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(r#""event":"core.app.startup_completed""#),
        "verbose mode should log startup, got: {}",
        stderr
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        assert!(
            !line.trim().starts_with('{'),
            "stdout contains JSON line: {}",
            line
        );
    }
}

#[test]
fn test_list_without_daemon_reports_unavailable() {
    let home = tempfile::tempdir().unwrap();
    let output = termhive(home.path(), &["list"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("terminal unavailable"), "got: {}", stderr);
    assert!(stderr.contains("termhive daemon start"), "got: {}", stderr);
    assert!(!String::from_utf8_lossy(&output.stdout).contains(r#""event":"#));
}

#[test]
fn test_resize_without_daemon_reports_unavailable() {
    let home = tempfile::tempdir().unwrap();
    let output = termhive(home.path(), &["resize", "ab12", "120", "40"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("terminal unavailable"), "got: {}", stderr);
}

#[test]
fn test_config_warning_on_invalid_toml() {
    let home = tempfile::tempdir().unwrap();
    let config_dir = home.path().join(".termhive");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "invalid toml [[[").unwrap();

    let output = termhive(home.path(), &["list"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Warning: Could not load config"),
        "Expected warning in stderr, got: {}",
        stderr
    );
    assert!(stderr.contains("Tip: Check"), "got: {}", stderr);
}

#[test]
fn test_no_warning_on_valid_config() {
    let home = tempfile::tempdir().unwrap();
    let config_dir = home.path().join(".termhive");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[pool]\nmax_size = 4\n").unwrap();

    let output = termhive(home.path(), &["list"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("Warning: Could not load config"),
        "Unexpected config warning in stderr: {}",
        stderr
    );
}
