//! # External Process Execution (`common::process`)
//!
//! File: cli/src/common/process.rs
//!
//! ## Overview
//!
//! Async wrappers around `tokio::process::Command` for the few host tools the
//! orchestrator shells out to: the 1Password `op` CLI and `setfacl`.
//!
//! - `run_captured` pipes optional input to the child's stdin and returns its
//!   stdout. Only stderr goes into the error on failure, because stdout can
//!   carry secret material.
//! - `run_inherited` lets the child write straight to the terminal.
//!
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `program` with `args`, feeding `input` on stdin, and returns stdout.
///
/// The caller decides what may be logged; `args` are traced, `input` and the
/// output never are.
pub async fn run_captured(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    input: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let cmd_line = describe(program, args);
    debug!("Running: {}", cmd_line);

    let mut child = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn '{}'", program))?;

    if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(data)
            .await
            .with_context(|| format!("Failed to write to stdin of '{}'", program))?;
        // Closing stdin signals end of input.
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("Failed to wait for '{}'", program))?;

    if !output.status.success() {
        return Err(anyhow!(OblivionError::ExternalCommand {
            cmd: cmd_line,
            status: output.status.to_string(),
            output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }));
    }
    Ok(output.stdout)
}

/// Runs `program` with the terminal's stdout/stderr attached.
pub async fn run_inherited(program: &str, args: &[&str]) -> Result<()> {
    let cmd_line = describe(program, args);
    debug!("Running: {}", cmd_line);

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to spawn '{}'", program))?;

    if !status.success() {
        return Err(anyhow!(OblivionError::ExternalCommand {
            cmd: cmd_line,
            status: status.to_string(),
            output: String::new(),
        }));
    }
    Ok(())
}

// --- Unit Tests ---
#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captured_pipes_stdin() -> Result<()> {
        let out = run_captured("cat", &[], &[], Some(b"hello\n")).await?;
        assert_eq!(out, b"hello\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_captured_passes_env() -> Result<()> {
        let out = run_captured("sh", &["-c", "printf %s \"$OBLIVION_X\""], &[("OBLIVION_X", "42")], None)
            .await?;
        assert_eq!(out, b"42");
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_reports_stderr_only() {
        // Both markers come from the environment so neither appears in the
        // command line recorded in the error.
        let err = run_captured(
            "sh",
            &["-c", "printf %s \"$OBLIVION_ERR\" >&2; printf %s \"$OBLIVION_OUT\"; exit 3"],
            &[
                ("OBLIVION_ERR", "diagnostic-on-stderr"),
                ("OBLIVION_OUT", "plaintext-on-stdout"),
            ],
            None,
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("diagnostic-on-stderr"));
        assert!(msg.contains("exit status: 3"));
        assert!(!msg.contains("plaintext-on-stdout"));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        assert!(run_inherited("oblivion-no-such-binary", &[]).await.is_err());
    }
}
