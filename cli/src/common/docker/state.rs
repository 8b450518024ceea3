//! # Resource Existence Checking (`common::docker::state`)
//!
//! File: cli/src/common/docker/state.rs
//!
//! ## Overview
//!
//! Answers "does a resource with this name already exist?" for the four
//! resource kinds the orchestrator manages: networks, volumes, images and
//! containers. Queries are read-only. Restarting a stopped container is a
//! separate, explicit repair step (`revive`), with `exists_or_revive` combining
//! the two for callers that want the query-and-repair behaviour.
//!
//! ## Architecture
//!
//! - Each query lists the resource kind with a name filter (`reference` for
//!   images). Docker's name filters match substrings, so results are re-checked
//!   for an exact name before reporting presence.
//! - "Not found" is never an error here: an empty listing means `Ok(false)`.
//!   Transport and API errors are wrapped with the operation and returned.
//! - Container names come back from the engine with a leading `/`, which is
//!   stripped before comparing.
//!
//! ## Usage
//!
//! ```rust
//! if !state::exists(engine, ResourceKind::Network, "database_bridge").await? {
//!     // create it
//! }
//! if let Some(handle) = state::find_container(engine, "cansu.dev-pg-primary").await? {
//!     state::revive(engine, &handle).await?;
//! }
//! ```
//!
use super::engine::{filter, Engine};
use crate::core::error::{is_docker_status, OblivionError, Result};
use anyhow::anyhow;
use bollard::models::{ContainerState, ImageSummary};
use std::fmt;
use tracing::{debug, info, instrument};

/// The kinds of engine resources the orchestrator checks and creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Network,
    Volume,
    Image,
    Container,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
            ResourceKind::Image => "image",
            ResourceKind::Container => "container",
        };
        f.write_str(s)
    }
}

/// A container found in (or created on) the engine, with the state snapshot
/// from its last inspect.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub state: Option<ContainerState>,
}

impl ContainerHandle {
    pub fn is_running(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false)
    }
}

/// Strips the `/` the engine prefixes onto container names.
pub fn bare_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Whether `image` is the one `reference` names.
///
/// Digest references (`repo@sha256:..`) match `repo_digests`. A reference
/// without a tag in its last path segment means `:latest`; a `:` earlier in
/// the reference is a registry port.
fn image_matches(image: &ImageSummary, reference: &str) -> bool {
    if reference.contains('@') {
        return image.repo_digests.iter().any(|d| d == reference);
    }
    let tagged = reference
        .rsplit('/')
        .next()
        .is_some_and(|last| last.contains(':'));
    image.repo_tags.iter().any(|t| {
        t == reference || (!tagged && t.strip_suffix(":latest") == Some(reference))
    })
}

/// Reports whether a resource of `kind` named `name` exists. Never mutates.
#[instrument(skip(engine), fields(kind = %kind, name = %name))]
pub async fn exists(engine: &dyn Engine, kind: ResourceKind, name: &str) -> Result<bool> {
    let found = match kind {
        ResourceKind::Network => engine
            .list_networks(filter("name", name))
            .await
            .map_err(|e| {
                anyhow!(OblivionError::DockerApi { source: e })
                    .context(format!("Failed to list networks named '{}'", name))
            })?
            .iter()
            .any(|n| n.name.as_deref() == Some(name)),
        ResourceKind::Volume => engine
            .list_volumes(filter("name", name))
            .await
            .map_err(|e| {
                anyhow!(OblivionError::DockerApi { source: e })
                    .context(format!("Failed to list volumes named '{}'", name))
            })?
            .iter()
            .any(|v| v.name == name),
        ResourceKind::Image => engine
            .list_images(filter("reference", name))
            .await
            .map_err(|e| {
                anyhow!(OblivionError::DockerApi { source: e })
                    .context(format!("Failed to list images matching '{}'", name))
            })?
            .iter()
            .any(|i| image_matches(i, name)),
        ResourceKind::Container => find_container_id(engine, name).await?.is_some(),
    };
    debug!("{} '{}' exists: {}", kind, name, found);
    Ok(found)
}

async fn find_container_id(engine: &dyn Engine, name: &str) -> Result<Option<String>> {
    let containers = engine
        .list_containers(filter("name", name))
        .await
        .map_err(|e| {
            anyhow!(OblivionError::DockerApi { source: e })
                .context(format!("Failed to list containers named '{}'", name))
        })?;
    Ok(containers
        .into_iter()
        .find(|c| {
            c.names
                .as_ref()
                .map(|names| names.iter().any(|n| bare_name(n) == name))
                .unwrap_or(false)
        })
        .and_then(|c| c.id))
}

/// Inspects a container by name or id and returns a handle for it.
///
/// A missing container maps to `OblivionError::ContainerNotFound`.
#[instrument(skip(engine), fields(container = %name_or_id))]
pub async fn inspect(engine: &dyn Engine, name_or_id: &str) -> Result<ContainerHandle> {
    let response = engine.inspect_container(name_or_id).await.map_err(|e| {
        if is_docker_status(&e, 404) {
            anyhow!(OblivionError::ContainerNotFound {
                name: name_or_id.to_string()
            })
        } else {
            anyhow!(OblivionError::DockerApi { source: e })
                .context(format!("Failed to inspect container '{}'", name_or_id))
        }
    })?;
    Ok(ContainerHandle {
        id: response.id.unwrap_or_else(|| name_or_id.to_string()),
        name: response
            .name
            .as_deref()
            .map(|n| bare_name(n).to_string())
            .unwrap_or_else(|| name_or_id.to_string()),
        state: response.state,
    })
}

/// Finds a container by exact name, returning its inspected handle.
pub async fn find_container(engine: &dyn Engine, name: &str) -> Result<Option<ContainerHandle>> {
    match find_container_id(engine, name).await? {
        Some(id) => inspect(engine, &id).await.map(Some),
        None => Ok(None),
    }
}

/// Starts `handle` if it is not running. Returns `true` when a start was issued.
///
/// An engine reply of 304 (already started) counts as success.
#[instrument(skip(engine, handle), fields(container = %handle.name))]
pub async fn revive(engine: &dyn Engine, handle: &ContainerHandle) -> Result<bool> {
    if handle.is_running() {
        debug!("Container '{}' is already running", handle.name);
        return Ok(false);
    }
    info!("Container '{}' exists but is stopped, starting it", handle.name);
    match engine.start_container(&handle.id).await {
        Ok(()) => Ok(true),
        Err(e) if is_docker_status(&e, 304) => Ok(false),
        Err(e) => Err(anyhow!(OblivionError::DockerApi { source: e })
            .context(format!("Failed to start container '{}'", handle.name))),
    }
}

/// Reports whether the container exists, starting it first if it was stopped.
pub async fn exists_or_revive(engine: &dyn Engine, name: &str) -> Result<bool> {
    match find_container(engine, name).await? {
        Some(handle) => {
            revive(engine, &handle).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::mock::MockEngine;

    #[tokio::test]
    async fn test_exists_false_for_missing_resources() -> Result<()> {
        let engine = MockEngine::new();
        for kind in [
            ResourceKind::Network,
            ResourceKind::Volume,
            ResourceKind::Image,
            ResourceKind::Container,
        ] {
            assert!(!exists(&engine, kind, "nothing-here").await?, "{}", kind);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_exists_requires_exact_name() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_network("database_bridge_old");
        engine.add_container("cansu.dev-pg-primary-2", true);
        assert!(!exists(&engine, ResourceKind::Network, "database_bridge").await?);
        assert!(!exists(&engine, ResourceKind::Container, "cansu.dev-pg-primary").await?);

        engine.add_network("database_bridge");
        assert!(exists(&engine, ResourceKind::Network, "database_bridge").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_image_reference_defaults_to_latest() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_image("edoburu/pgbouncer:latest");
        assert!(exists(&engine, ResourceKind::Image, "edoburu/pgbouncer").await?);
        assert!(exists(&engine, ResourceKind::Image, "edoburu/pgbouncer:latest").await?);
        assert!(!exists(&engine, ResourceKind::Image, "edoburu/pgbouncer:1.22").await?);
        assert!(!exists(&engine, ResourceKind::Image, "edoburu/pg").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_image_reference_with_registry_port() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_image("localhost:5000/app:latest");
        engine.add_image("localhost:5000/worker:2");
        assert!(exists(&engine, ResourceKind::Image, "localhost:5000/app").await?);
        assert!(exists(&engine, ResourceKind::Image, "localhost:5000/app:latest").await?);
        assert!(!exists(&engine, ResourceKind::Image, "localhost:5000/worker").await?);
        assert!(exists(&engine, ResourceKind::Image, "localhost:5000/worker:2").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_image_digest_reference_matches_repo_digests() -> Result<()> {
        let digest = "postgres@sha256:4ec37d2a07a0067f176fdcc9d4bb633a5724d2cc4f892c7a2046d054bb6939e5";
        let engine = MockEngine::new();
        engine.add_image_with_digest("postgres:17", digest);
        assert!(exists(&engine, ResourceKind::Image, digest).await?);
        assert!(!exists(
            &engine,
            ResourceKind::Image,
            "postgres@sha256:0000000000000000000000000000000000000000000000000000000000000000"
        )
        .await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_exists_does_not_start_stopped_container() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_container("kuma", false);
        assert!(exists(&engine, ResourceKind::Container, "kuma").await?);
        assert!(!engine.container("kuma").unwrap().running);
        assert_eq!(engine.count_calls("start_container"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_exists_or_revive_starts_stopped_container() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_container("kuma", false);
        assert!(exists_or_revive(&engine, "kuma").await?);
        assert!(engine.container("kuma").unwrap().running);
        assert!(!exists_or_revive(&engine, "absent").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_revive_skips_running_container() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_container("redis", true);
        let handle = find_container(&engine, "redis").await?.unwrap();
        assert_eq!(handle.name, "redis");
        assert!(!revive(&engine, &handle).await?);
        assert_eq!(engine.count_calls("start_container"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_inspect_missing_container_is_not_found() {
        let engine = MockEngine::new();
        let err = inspect(&engine, "ghost").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OblivionError>(),
            Some(OblivionError::ContainerNotFound { .. })
        ));
    }
}
