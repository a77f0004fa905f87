//! Integration tests for the command-line host
//!
//! These run without network access: `--offline` stands in for a dead
//! connection and `--ephemeral` keeps caches out of the user's data directory.

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
  Command::new(env!("CARGO_BIN_EXE_book-club-offline"))
    .args(args)
    .env_remove("BOOK_CLUB_OFFLINE_ORIGIN")
    .env("RUST_LOG", "off")
    .output()
    .expect("Failed to execute book-club-offline")
}

#[test]
fn test_help_lists_lifecycle_commands() {
  let output = run_cli(&["--help"]);
  assert!(output.status.success(), "Expected --help to exit successfully");
  let stdout = String::from_utf8_lossy(&output.stdout);
  for command in ["install", "activate", "fetch", "caches"] {
    assert!(stdout.contains(command), "Help should mention {}", command);
  }
}

#[test]
fn test_offline_get_gets_timeout_response() {
  let output = run_cli(&["fetch", "/reviews", "--offline", "--ephemeral"]);
  assert!(output.status.success());
  assert_eq!(String::from_utf8_lossy(&output.stdout), "Network error occurred");
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("408"), "Should report status 408: {}", stderr);
  assert!(stderr.contains("fallback"), "Should report fallback source: {}", stderr);
}

#[test]
fn test_offline_post_is_not_intercepted() {
  let output = run_cli(&["fetch", "/books", "-X", "POST", "--offline", "--ephemeral"]);
  assert!(!output.status.success(), "POST must reach the (dead) network");
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("network unavailable"), "{}", stderr);
}

#[test]
fn test_offline_install_fails() {
  let output = run_cli(&["install", "--offline", "--ephemeral"]);
  assert!(!output.status.success(), "Install must fail without network");
}

#[test]
fn test_invalid_header_is_rejected() {
  let output = run_cli(&["fetch", "/", "-H", "no-colon", "--ephemeral", "--offline"]);
  assert!(!output.status.success());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("Invalid header"), "{}", stderr);
}

#[test]
fn test_ephemeral_store_starts_empty() {
  let output = run_cli(&["caches", "--ephemeral"]);
  assert!(output.status.success());
  assert!(String::from_utf8_lossy(&output.stdout).contains("(no caches)"));
}
