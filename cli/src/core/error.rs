//! # Oblivion Error Types
//!
//! File: cli/src/core/error.rs
//!
//! ## Overview
//!
//! Error types shared by every part of the orchestrator. The design keeps the
//! same two layers throughout the crate:
//! - `OblivionError`: a `thiserror` enum naming the failure domains the
//!   callers actually branch on (conflicts, missing resources, secret store
//!   failures, bad configuration).
//! - `Result<T>`: an alias for `anyhow::Result<T>` so every layer can attach
//!   the name of the operation that failed with `.context(..)`.
//!
//! Health polling has its own terminal error kinds (`HealthError`, defined in
//! `common::docker::health`) because callers and tests match on them directly.
//!
//! ## Examples
//!
//! ```rust
//! // Wrap an engine error with the operation that produced it
//! let networks = engine
//!     .list_networks(filters)
//!     .await
//!     .map_err(|e| anyhow!(OblivionError::DockerApi { source: e }))
//!     .context("Failed to list networks")?;
//!
//! // Branch on a domain error further up
//! match result {
//!     Err(e) if e.downcast_ref::<OblivionError>().is_some_and(|oe| matches!(oe, OblivionError::ContainerNotFound { .. })) => {
//!         info!("Nothing to stop.");
//!     }
//!     other => other?,
//! }
//! ```
//!
use thiserror::Error;

/// Custom error type for the orchestrator.
#[derive(Error, Debug)]
pub enum OblivionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Docker API interaction failed: {source}")]
    DockerApi {
        #[from]
        source: bollard::errors::Error,
    },

    #[error("Docker operation failed: {0}")]
    DockerOperation(String),

    #[error("Container '{name}' not found.")]
    ContainerNotFound { name: String },

    #[error("Network with name '{name}' not found.")]
    NetworkNotFound { name: String },

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("Build context error: {0}")]
    BuildContext(String),

    #[error("Template rendering error: {source}")]
    Template {
        #[from]
        source: tera::Error,
    },

    #[error("External command failed: {cmd}, Status: {status}, Output:\n{output}")]
    ExternalCommand {
        cmd: String,
        status: String,
        output: String,
    },
}

/// Type alias for Result using anyhow::Error for broad compatibility.
pub type Result<T> = anyhow::Result<T>;

/// Returns true when the engine answered with the given HTTP status.
pub fn is_docker_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}
