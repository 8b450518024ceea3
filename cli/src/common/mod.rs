//! # Oblivion Common Utilities (`common`)
//!
//! File: cli/src/common/mod.rs
//!
//! ## Overview
//!
//! Shared building blocks the service commands are assembled from:
//!
//! - **`docker`**: the container resource orchestrator (engine seam, existence
//!   checks, idempotent creation, health polling, log streaming, bring-up).
//! - **`archive`**: build context packaging.
//! - **`secrets`**: vault reference resolution through 1Password.
//! - **`process`**: async external command execution.
//!
pub mod archive;
pub mod docker;
pub mod process;
pub mod secrets;
