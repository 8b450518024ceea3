//! # Container Bring-up & Stop (`common::docker::lifecycle`)
//!
//! File: cli/src/common/docker/lifecycle.rs
//!
//! ## Overview
//!
//! `bring_up` takes a `ContainerSpec` from "maybe nothing exists" to "the
//! container is running and, if it has a health check, healthy":
//!
//! 1. If a container with the name exists, start it when stopped and return.
//!    No attribute of an existing container is compared or changed.
//! 2. Pull the image if absent.
//! 3. Ensure every named volume the container mounts.
//! 4. Ensure every network it joins, then resolve their ids.
//! 5. Create the container. A 409 means another caller won the race; the
//!    existing container is used instead.
//! 6. Start it. With a health check, follow its logs and block on the poller
//!    until it is healthy, then stop following.
//!
//! Dependencies are always created before the container that references them.
//! The same `HealthCheckSpec` value configures the engine's health check and
//! the poller.
//!
//! `stop_by_name` stops a container, treating "already stopped" as success.
//!
use super::engine::Engine;
use super::ensure::{ensure_network, ensure_volume};
use super::health::{wait_healthy, HealthCheckSpec};
use super::images::pull_if_absent;
use super::logs::spawn_log_stream;
use super::state::{find_container, inspect, revive, ContainerHandle};
use crate::core::error::{is_docker_status, OblivionError, Result};
use crate::core::resources::Resources;
use anyhow::{anyhow, Context};
use bollard::container::{Config, NetworkingConfig};
use bollard::models::{
    EndpointSettings, HostConfig, Mount, MountBindOptions, MountBindOptionsPropagationEnum,
    MountTypeEnum, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Seconds the engine waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Host port published for a container port (TCP, all interfaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub container: u16,
    pub host: u16,
}

impl PortSpec {
    pub fn new(container: u16, host: u16) -> Self {
        Self { container, host }
    }

    fn key(&self) -> String {
        format!("{}/tcp", self.container)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    /// Named volume, ensured before the container is created.
    Volume { source: String, target: String },
    /// Host path.
    Bind {
        source: String,
        target: String,
        read_only: bool,
        /// Mount propagation `rslave`, for host-root views.
        rslave: bool,
    },
}

impl MountSpec {
    pub fn volume(source: &str, target: &str) -> Self {
        MountSpec::Volume {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn bind(source: &str, target: &str) -> Self {
        MountSpec::Bind {
            source: source.to_string(),
            target: target.to_string(),
            read_only: false,
            rslave: false,
        }
    }

    pub fn bind_ro(source: &str, target: &str) -> Self {
        MountSpec::Bind {
            source: source.to_string(),
            target: target.to_string(),
            read_only: true,
            rslave: false,
        }
    }

    fn to_bollard(&self) -> Mount {
        match self {
            MountSpec::Volume { source, target } => Mount {
                typ: Some(MountTypeEnum::VOLUME),
                source: Some(source.clone()),
                target: Some(target.clone()),
                ..Default::default()
            },
            MountSpec::Bind {
                source,
                target,
                read_only,
                rslave,
            } => {
                let bind_options = (*read_only || *rslave).then(|| MountBindOptions {
                    read_only_force_recursive: read_only.then_some(true),
                    propagation: rslave.then_some(MountBindOptionsPropagationEnum::RSLAVE),
                    ..Default::default()
                });
                Mount {
                    typ: Some(MountTypeEnum::BIND),
                    source: Some(source.clone()),
                    target: Some(target.clone()),
                    read_only: Some(*read_only),
                    bind_options,
                    ..Default::default()
                }
            }
        }
    }
}

/// Everything needed to create one service container.
///
/// Not `Debug`: `env` and `cmd` routinely carry credentials.
#[derive(Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Pull `image` when absent. Off for images built locally.
    pub pull: bool,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub ports: Vec<PortSpec>,
    pub mounts: Vec<MountSpec>,
    pub networks: Vec<String>,
    pub restart_always: bool,
    pub healthcheck: Option<&'static HealthCheckSpec>,
}

impl ContainerSpec {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            pull: true,
            ..Default::default()
        }
    }

    /// Engine configuration for this spec.
    pub fn to_config(&self, endpoints: HashMap<String, EndpointSettings>) -> Config<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = self
            .ports
            .iter()
            .map(|p| (p.key(), HashMap::new()))
            .collect();
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = self
            .ports
            .iter()
            .map(|p| {
                (
                    p.key(),
                    Some(vec![PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(p.host.to_string()),
                    }]),
                )
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            mounts: (!self.mounts.is_empty())
                .then(|| self.mounts.iter().map(MountSpec::to_bollard).collect()),
            restart_policy: self.restart_always.then(|| RestartPolicy {
                name: Some(RestartPolicyNameEnum::ALWAYS),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        Config {
            image: Some(self.image.clone()),
            cmd: (!self.cmd.is_empty()).then(|| self.cmd.clone()),
            env: (!self.env.is_empty()).then(|| self.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            healthcheck: self.healthcheck.map(HealthCheckSpec::to_bollard),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            networking_config: (!endpoints.is_empty()).then(|| NetworkingConfig {
                endpoints_config: endpoints,
            }),
            ..Default::default()
        }
    }
}

/// Outcome of `bring_up`.
#[derive(Debug, Clone, PartialEq)]
pub struct BringUp {
    pub handle: ContainerHandle,
    /// `false` when an existing container was reused.
    pub created: bool,
}

/// Follows the container's logs while waiting for it to become healthy.
async fn wait_with_logs(
    res: &Resources,
    handle: &ContainerHandle,
    healthcheck: &HealthCheckSpec,
) -> Result<()> {
    let logs = spawn_log_stream(res.engine(), handle, &res.cancel);
    let result = wait_healthy(res.engine(), handle, Some(healthcheck), &res.cancel).await;
    if let Err(e) = logs.stop().await {
        debug!("Log follower for '{}' ended with: {:#}", handle.name, e);
    }
    result.with_context(|| format!("start of '{}' failed", handle.name))
}

/// Brings the container described by `spec` up; see the module docs.
#[instrument(skip(res, spec), fields(container = %spec.name))]
pub async fn bring_up(res: &Resources, spec: &ContainerSpec) -> Result<BringUp> {
    let engine = res.engine();
    if let Some(healthcheck) = spec.healthcheck {
        healthcheck.validate()?;
    }

    if let Some(handle) = find_container(engine, &spec.name).await? {
        return reuse_existing(res, spec, handle).await;
    }

    if spec.pull {
        pull_if_absent(engine, &spec.image).await?;
    }
    for mount in &spec.mounts {
        if let MountSpec::Volume { source, .. } = mount {
            ensure_volume(engine, source).await?;
        }
    }
    for network in &spec.networks {
        ensure_network(engine, network).await?;
    }
    let endpoints = res.networks.endpoints(engine, &spec.networks).await?;

    info!("Creating container '{}' from {}", spec.name, spec.image);
    let created = match engine
        .create_container(&spec.name, spec.to_config(endpoints))
        .await
    {
        Ok(created) => created,
        Err(e) if is_docker_status(&e, 409) => {
            debug!("Container '{}' was created concurrently", spec.name);
            let handle = find_container(engine, &spec.name).await?.ok_or_else(|| {
                anyhow!(OblivionError::ContainerNotFound {
                    name: spec.name.clone()
                })
            })?;
            return reuse_existing(res, spec, handle).await;
        }
        Err(e) => {
            return Err(anyhow!(OblivionError::DockerApi { source: e })
                .context(format!("failed to create container '{}'", spec.name)))
        }
    };
    for warning in &created.warnings {
        warn!("Container '{}' created with warning: {}", spec.name, warning);
    }

    info!("Starting container '{}'", spec.name);
    match engine.start_container(&created.id).await {
        Ok(()) => {}
        // Started by a concurrent bring-up that found it first.
        Err(e) if is_docker_status(&e, 304) => debug!("Container '{}' already started", spec.name),
        Err(e) => {
            return Err(anyhow!(OblivionError::DockerApi { source: e })
                .context(format!("failed to start container '{}'", spec.name)))
        }
    }

    let handle = inspect(engine, &created.id).await?;
    if let Some(healthcheck) = spec.healthcheck {
        wait_with_logs(res, &handle, healthcheck).await?;
    }
    info!("Container '{}' is up", spec.name);
    Ok(BringUp {
        handle,
        created: true,
    })
}

async fn reuse_existing(
    res: &Resources,
    spec: &ContainerSpec,
    handle: ContainerHandle,
) -> Result<BringUp> {
    let started = revive(res.engine(), &handle).await?;
    if started {
        if let Some(healthcheck) = spec.healthcheck {
            wait_with_logs(res, &handle, healthcheck).await?;
        }
    } else {
        info!("Container '{}' already running", spec.name);
    }
    Ok(BringUp {
        handle,
        created: false,
    })
}

/// Runs `cmd` in the container without waiting for it to finish.
///
/// Values that must not appear in the command line go in `env`.
pub async fn exec_detached(
    engine: &dyn Engine,
    handle: &ContainerHandle,
    cmd: Vec<String>,
    env: Vec<String>,
) -> Result<()> {
    engine.exec_detached(&handle.id, cmd, env).await.map_err(|e| {
        anyhow!(OblivionError::DockerApi { source: e })
            .context(format!("failed to exec in container '{}'", handle.name))
    })
}

/// Stops the named container. Returns `false` if it was already stopped.
#[instrument(skip(engine))]
pub async fn stop_by_name(engine: &dyn Engine, name: &str) -> Result<bool> {
    let handle = find_container(engine, name).await?.ok_or_else(|| {
        anyhow!(OblivionError::ContainerNotFound {
            name: name.to_string()
        })
    })?;
    match engine.stop_container(&handle.id, Some(STOP_TIMEOUT_SECS)).await {
        Ok(()) => {
            info!("Stopped container '{}'", name);
            Ok(true)
        }
        Err(e) if is_docker_status(&e, 304) => {
            info!("Container '{}' was already stopped", name);
            Ok(false)
        }
        Err(e) => Err(anyhow!(OblivionError::DockerApi { source: e })
            .context(format!("failed to stop container '{}'", name))),
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::health::{HealthError, POSTGRES_HEALTHCHECK};
    use crate::common::docker::mock::MockEngine;
    use crate::core::resources::tests::mock_resources;
    use bollard::models::HealthStatusEnum;
    use std::sync::Arc;

    fn kuma_spec() -> ContainerSpec {
        ContainerSpec {
            ports: vec![PortSpec::new(3001, 3001)],
            mounts: vec![MountSpec::volume("uptime-kuma", "/app/data")],
            networks: vec!["database_bridge".into(), "uptime_bridge".into()],
            restart_always: true,
            ..ContainerSpec::new("cansu.dev-uptime-kuma", "louislam/uptime-kuma:1")
        }
    }

    fn position(calls: &[String], prefix: &str) -> usize {
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with {}", prefix))
    }

    #[tokio::test]
    async fn test_dependencies_created_before_container() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        let res = mock_resources(engine.clone(), None);

        let up = bring_up(&res, &kuma_spec()).await?;
        assert!(up.created);
        assert_eq!(up.handle.name, "cansu.dev-uptime-kuma");

        let calls = engine.calls();
        let create = position(&calls, "create_container:");
        assert!(position(&calls, "pull_image:") < create);
        assert!(position(&calls, "create_volume:uptime-kuma") < create);
        assert!(position(&calls, "create_network:database_bridge") < create);
        assert!(position(&calls, "create_network:uptime_bridge") < create);
        assert!(create < position(&calls, "start_container:"));
        assert!(engine.container("cansu.dev-uptime-kuma").unwrap().running);
        Ok(())
    }

    #[tokio::test]
    async fn test_container_config_carries_ports_mounts_and_networks() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        let res = mock_resources(engine.clone(), None);
        bring_up(&res, &kuma_spec()).await?;

        let config = engine
            .container("cansu.dev-uptime-kuma")
            .unwrap()
            .config
            .unwrap();
        let host = config.host_config.unwrap();
        let binding = &host.port_bindings.unwrap()["3001/tcp"];
        assert_eq!(
            binding.as_ref().unwrap()[0].host_port.as_deref(),
            Some("3001")
        );
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
        let mounts = host.mounts.unwrap();
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::VOLUME));
        let endpoints = config.networking_config.unwrap().endpoints_config;
        assert!(endpoints["uptime_bridge"].network_id.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_stopped_container_is_started_not_recreated() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        engine.add_container("cansu.dev-uptime-kuma", false);
        let res = mock_resources(engine.clone(), None);

        let up = bring_up(&res, &kuma_spec()).await?;
        assert!(!up.created);
        assert_eq!(engine.count_calls("create_container"), 0);
        assert_eq!(engine.count_calls("pull_image"), 0);
        assert!(engine.container("cansu.dev-uptime-kuma").unwrap().running);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_bring_up_creates_one_container() -> Result<()> {
        let engine = Arc::new(MockEngine::racing());
        let res = mock_resources(engine.clone(), None);
        let spec = kuma_spec();

        let (a, b) = tokio::join!(bring_up(&res, &spec), bring_up(&res, &spec));
        let (a, b) = (a?, b?);
        assert!(a.created != b.created);
        assert_eq!(engine.networks().len(), 2);
        assert!(engine.container("cansu.dev-uptime-kuma").unwrap().running);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthcheck_shared_with_engine_and_awaited() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        engine.script_health(&[HealthStatusEnum::STARTING, HealthStatusEnum::HEALTHY]);
        let res = mock_resources(engine.clone(), None);
        let spec = ContainerSpec {
            healthcheck: Some(&POSTGRES_HEALTHCHECK),
            ..ContainerSpec::new("pg", "postgres:17")
        };

        bring_up(&res, &spec).await?;
        let config = engine.container("pg").unwrap().config.unwrap();
        assert_eq!(config.healthcheck, Some(POSTGRES_HEALTHCHECK.to_bollard()));
        assert_eq!(engine.count_calls("logs:"), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_bring_up_reports_cancelled() {
        let engine = Arc::new(MockEngine::new());
        engine.script_health(&[HealthStatusEnum::STARTING]);
        let res = mock_resources(engine.clone(), None);
        res.cancel.cancel();
        let spec = ContainerSpec {
            healthcheck: Some(&POSTGRES_HEALTHCHECK),
            ..ContainerSpec::new("pg", "postgres:17")
        };

        let err = bring_up(&res, &spec).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HealthError>(),
            Some(HealthError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_by_name() -> Result<()> {
        let engine = MockEngine::new();
        engine.add_container("cansu.dev-uptime-kuma", true);
        assert!(stop_by_name(&engine, "cansu.dev-uptime-kuma").await?);
        assert!(!stop_by_name(&engine, "cansu.dev-uptime-kuma").await?);

        let err = stop_by_name(&engine, "missing").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OblivionError>(),
            Some(OblivionError::ContainerNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_bind_mount_options() {
        let mount = MountSpec::Bind {
            source: "/".into(),
            target: "/host".into(),
            read_only: true,
            rslave: true,
        }
        .to_bollard();
        assert_eq!(mount.read_only, Some(true));
        let opts = mount.bind_options.unwrap();
        assert_eq!(opts.propagation, Some(MountBindOptionsPropagationEnum::RSLAVE));
        assert_eq!(opts.read_only_force_recursive, Some(true));
        assert!(MountSpec::bind("/var/log", "/var/log").to_bollard().bind_options.is_none());
    }
}
