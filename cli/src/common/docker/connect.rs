//! # Docker Connection Utility (`common::docker::connect`)
//!
//! File: cli/src/common/docker/connect.rs
//!
//! ## Overview
//!
//! Opens the one engine client a command uses for its whole lifetime. The
//! address comes from `docker.socket` in the configuration (a `unix://` socket,
//! or a `tcp://`/`http://` endpoint); an empty value falls back to the standard
//! local socket. After connecting, the client's API version is negotiated
//! against the daemon so older engines keep working.
//!
//! The returned `Arc<dyn Engine>` is dropped when the command finishes, which
//! releases the underlying connection pool exactly once.
//!
use super::engine::{BollardEngine, Engine};
use crate::core::config::{DockerConfig, DEFAULT_DOCKER_SOCKET};
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use bollard::Docker;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Request timeout handed to bollard, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Resolves the configured socket, warning when it is empty.
pub fn socket_address(cfg: &DockerConfig) -> String {
    let socket = cfg.socket.trim();
    if socket.is_empty() {
        warn!(
            "docker socket is not set, defaulting back to {}",
            DEFAULT_DOCKER_SOCKET
        );
        DEFAULT_DOCKER_SOCKET.to_string()
    } else {
        socket.to_string()
    }
}

/// Connects to the configured engine and negotiates the API version.
#[instrument(skip(cfg))]
pub async fn connect_engine(cfg: &DockerConfig) -> Result<Arc<dyn Engine>> {
    let address = socket_address(cfg);
    debug!("Connecting to Docker at {}", address);

    let docker = if address.starts_with("tcp://") || address.starts_with("http://") {
        Docker::connect_with_http(&address, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_socket(&address, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    }
    .map_err(|e| anyhow!(OblivionError::DockerApi { source: e }))
    .with_context(|| format!("Failed to create docker client for '{}'", address))?;

    let docker = docker
        .negotiate_version()
        .await
        .map_err(|e| anyhow!(OblivionError::DockerApi { source: e }))
        .context("Failed to negotiate Docker API version. Is the daemon running and accessible?")?;

    debug!("Negotiated Docker API {}", docker.client_version());
    Ok(Arc::new(BollardEngine::new(docker)))
}
