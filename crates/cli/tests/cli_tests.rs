//! CLI integration tests

use std::process::Command;

fn hwctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hwctl"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = hwctl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("hostwatch"), "Should describe the agent");
    for command in ["status", "timeline", "stats", "clear", "export", "config"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = hwctl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("hwctl"), "Should show binary name");
}

/// Test timeline subcommand help
#[test]
fn test_timeline_help() {
    let output = hwctl()
        .args(["timeline", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Timeline help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

/// Test export subcommand help
#[test]
fn test_export_help() {
    let output = hwctl()
        .args(["export", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Export help should succeed");
    assert!(stdout.contains("--output"), "Should show output option");
    assert!(stdout.contains("--csv"), "Should show csv option");
}

/// Export requires an output path
#[test]
fn test_export_requires_output() {
    let output = hwctl()
        .arg("export")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Export without --output should fail");
}

/// Unreachable agent is reported as an error
#[test]
fn test_unreachable_agent_fails() {
    let output = hwctl()
        .args(["--api-url", "http://127.0.0.1:1", "stats"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Stats against a dead agent should fail");
    assert!(stderr.contains("Failed to send request"));
}
