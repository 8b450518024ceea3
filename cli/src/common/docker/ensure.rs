//! # Idempotent Resource Creation (`common::docker::ensure`)
//!
//! File: cli/src/common/docker/ensure.rs
//!
//! ## Overview
//!
//! `ensure(kind, name, options)` makes sure a resource exists, creating it
//! only when the existence check says it is absent. Existing resources are left
//! untouched: attributes are never compared or updated.
//!
//! Several bring-up routines share the same networks and may run at the same
//! time, so losing a creation race is expected. A 409 (conflict) from the
//! engine means another caller created the resource first and counts as
//! success. Creation warnings are logged and otherwise ignored.
//!
//! Defaults when `EnsureOptions` leaves them unset: networks use the `bridge`
//! driver, volumes the `local` driver, images are pulled by reference, and
//! containers require an explicit configuration.
//!
use super::engine::Engine;
use super::images::pull_image;
use super::state::{exists, ResourceKind};
use crate::core::error::{is_docker_status, OblivionError, Result};
use anyhow::anyhow;
use bollard::container::Config;
use bollard::network::CreateNetworkOptions;
use bollard::volume::CreateVolumeOptions;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";
pub const DEFAULT_VOLUME_DRIVER: &str = "local";

/// Creation settings used when the resource turns out to be absent.
#[derive(Debug, Clone, Default)]
pub struct EnsureOptions {
    pub driver: Option<String>,
    pub labels: HashMap<String, String>,
    /// Required for `ResourceKind::Container`.
    pub container: Option<Config<String>>,
}

/// Creates the resource if it does not exist yet.
#[instrument(skip(engine, options), fields(kind = %kind, name = %name))]
pub async fn ensure(
    engine: &dyn Engine,
    kind: ResourceKind,
    name: &str,
    options: &EnsureOptions,
) -> Result<()> {
    if exists(engine, kind, name).await? {
        debug!("{} '{}' already exists", kind, name);
        return Ok(());
    }

    info!("Creating {} '{}'", kind, name);
    let created = match kind {
        ResourceKind::Network => {
            engine
                .create_network(CreateNetworkOptions {
                    name: name.to_string(),
                    check_duplicate: true,
                    driver: options
                        .driver
                        .clone()
                        .unwrap_or_else(|| DEFAULT_NETWORK_DRIVER.to_string()),
                    labels: options.labels.clone(),
                    ..Default::default()
                })
                .await
        }
        ResourceKind::Volume => {
            engine
                .create_volume(CreateVolumeOptions {
                    name: name.to_string(),
                    driver: options
                        .driver
                        .clone()
                        .unwrap_or_else(|| DEFAULT_VOLUME_DRIVER.to_string()),
                    driver_opts: HashMap::new(),
                    labels: options.labels.clone(),
                })
                .await
        }
        ResourceKind::Image => return pull_image(engine, name).await,
        ResourceKind::Container => {
            let config = options.container.clone().ok_or_else(|| {
                anyhow!(OblivionError::Config(format!(
                    "no container configuration given for '{}'",
                    name
                )))
            })?;
            engine.create_container(name, config).await
        }
    };

    match created {
        Ok(created) => {
            for warning in &created.warnings {
                warn!("{} '{}' created with warning: {}", kind, name, warning);
            }
            debug!("{} '{}' created with id {}", kind, name, created.id);
            Ok(())
        }
        Err(e) if is_docker_status(&e, 409) => {
            debug!("{} '{}' was created concurrently, treating as success", kind, name);
            Ok(())
        }
        Err(e) => Err(anyhow!(OblivionError::DockerApi { source: e })
            .context(format!("Failed to create {} '{}'", kind, name))),
    }
}

/// Ensures a bridge network with default options.
pub async fn ensure_network(engine: &dyn Engine, name: &str) -> Result<()> {
    ensure(engine, ResourceKind::Network, name, &EnsureOptions::default()).await
}

/// Ensures a named local volume with default options.
pub async fn ensure_volume(engine: &dyn Engine, name: &str) -> Result<()> {
    ensure(engine, ResourceKind::Volume, name, &EnsureOptions::default()).await
}
