//! # Oblivion CLI Integration Test Common Helpers
//!
//! File: cli/tests/common.rs
//!
//! ## Overview
//!
//! Shared helpers for the integration tests in `cli/tests/`. Each test file
//! there is compiled as its own crate and runs the built `oblivion` binary.
//!

// Not every test file uses every helper.
#![allow(dead_code)]

pub use assert_cmd::Command;
use std::path::Path;

/// Returns a `Command` for the compiled `oblivion` binary.
///
/// `OBLIVION_CONFIG` and `RUST_LOG` are cleared so the developer's
/// environment cannot leak into the test.
pub fn oblivion_cmd() -> Command {
    let mut cmd = Command::cargo_bin("oblivion").expect("Failed to find oblivion binary for testing");
    cmd.env_remove("OBLIVION_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// Writes `content` as a config file inside `dir` and returns its path.
pub fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("oblivion.toml");
    std::fs::write(&path, content).expect("Failed to write test config");
    path
}
