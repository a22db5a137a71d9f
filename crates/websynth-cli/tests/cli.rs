//! Contract tests for argument parsing and the no-network-configured error
//! path. None of these exercise a real adapter or LLM call: the binary
//! refuses to build `Services` without at least one search source
//! configured, which gives us a deterministic failure mode to assert on
//! without touching the network.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("websynth").unwrap();
    cmd.env_remove("SEARX_URL");
    cmd.env_remove("DIRECT_DDG");
    cmd.env_remove("DIRECT_STARTPAGE");
    cmd
}

#[test]
fn no_search_source_configured_fails_with_a_clear_message() {
    cmd()
        .args(["search", "idiomatic rust error handling"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no search source configured"));
}

#[test]
fn missing_query_argument_is_a_usage_error() {
    cmd()
        .arg("search")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    cmd()
        .args(["frobnicate", "x"])
        .assert()
        .failure();
}

#[test]
fn help_lists_all_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("jobs"))
        .stdout(predicate::str::contains("remote"))
        .stdout(predicate::str::contains("freelance"))
        .stdout(predicate::str::contains("code"));
}

#[test]
fn depth_rejects_invalid_values() {
    cmd()
        .args(["search", "x", "--depth", "turbo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
