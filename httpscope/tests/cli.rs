//! Command line behavior that does not need privileges or a Go target.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

fn httpscope(args: &[&str], config: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_httpscope"))
        .arg("--no-log")
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run httpscope")
}

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_lists_options() {
    let output = Command::new(env!("CARGO_BIN_EXE_httpscope"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for option in ["--pid", "--symbol", "--format", "--graph", "--config", "--log-level"] {
        assert!(help.contains(option), "missing {option} in:\n{help}");
    }
}

#[test]
fn test_missing_target() {
    let config = config_file("");
    let output = httpscope(&[], config.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("No target given"), "{}", stderr(&output));
}

#[test]
fn test_nonexistent_target() {
    let config = config_file("");
    let output = httpscope(&["/nonexistent/httpscope-target"], config.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("does not exist"), "{}", stderr(&output));
}

#[test]
fn test_bad_config_is_reported_with_position() {
    let config = config_file("[output]\ngraph = \"yes\"\n");
    let target = tempfile::NamedTempFile::new().unwrap();
    let output = httpscope(&[target.path().to_str().unwrap()], config.path());
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Error at line 2"), "{err}");
    assert!(err.contains("graph = \"yes\""), "{err}");
}

#[test]
fn test_non_elf_target() {
    let config = config_file("");
    let mut target = tempfile::NamedTempFile::new().unwrap();
    target.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
    let output = httpscope(&[target.path().to_str().unwrap()], config.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to parse ELF file"), "{}", stderr(&output));
}

#[test]
fn test_target_without_round_trip() {
    // This test binary is an ELF executable with no Go HTTP client in it
    let config = config_file("");
    let exe = std::env::current_exe().unwrap();
    let output = httpscope(&[exe.to_str().unwrap()], config.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).contains("net/http.(*Transport).RoundTrip not found"),
        "{}",
        stderr(&output)
    );
}
