#![allow(clippy::unwrap_used, clippy::expect_used)]

//! CLI smoke tests for the cumulus-dev binary.

use std::io::Write;
use std::process::{Command, Stdio};

fn run_cumulus_dev(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cumulus-dev"))
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to execute cumulus-dev")
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn help_lists_subcommands() {
    let output = run_cumulus_dev(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cumulus-dev"));
    assert!(stdout.contains("start"));
    assert!(stdout.contains("check"));
    assert!(stdout.contains("--print-config"));
}

#[test]
fn check_accepts_a_valid_configuration() {
    let config = write_config(
        "emulators:\n  hosting:\n    public_dir: /tmp\n  database:\n    jar: /opt/database.jar\n  functions:\n    runtime_bin: /opt/functions-runtime\n",
    );

    let output = run_cumulus_dev(&["--config", config.path().to_str().unwrap(), "check"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stdout: {stdout}\nstderr: {stderr}");
    assert!(stdout.contains("Configuration is valid"));
    // functions depends on database, so it must land in a later start group
    assert!(stdout.contains("start group 1"));
    assert!(stdout.contains("start group 2: functions"));
}

#[test]
fn check_rejects_missing_emulators() {
    let config = write_config("suite:\n  host: 127.0.0.1\n");

    let output = run_cumulus_dev(&["--config", config.path().to_str().unwrap(), "check"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no emulators configured"), "stderr: {stderr}");
}

#[test]
fn check_rejects_unsatisfied_dependencies() {
    // functions depends on database by default, but database is absent
    let config = write_config("emulators:\n  functions:\n    runtime_bin: /opt/functions-runtime\n");

    let output = run_cumulus_dev(&["--config", config.path().to_str().unwrap(), "check"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("depends on"), "stderr: {stderr}");
}

#[test]
fn missing_config_file_fails_fast() {
    let output = run_cumulus_dev(&["--config", "/nonexistent/cumulus.yaml", "check"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

#[test]
fn print_config_renders_the_effective_configuration() {
    let config = write_config("suite:\n  stop_grace_ms: 1234\n");

    let output = run_cumulus_dev(&["--config", config.path().to_str().unwrap(), "--print-config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"stop_grace_ms\": 1234"));
    assert!(stdout.contains("\"cache_dir\""));
}
