//! # Observability Stack Command (`oblivion observer`)
//!
//! File: cli/src/commands/observer.rs
//!
//! ## Overview
//!
//! `oblivion observer up` ensures the Grafana and Prometheus volumes and then
//! brings up, in order, cAdvisor, Alertmanager, node-exporter, Prometheus,
//! Grafana, Loki and Promtail. Each one is pulled if absent and created once;
//! an existing container is only started if stopped. The first failure stops
//! the sequence.
//!
//! Grafana's admin credentials come from the vault items
//! `/Grafana/Admin/Username` and `/Grafana/Admin/Password`.
//!
use crate::common::docker::ensure::ensure_volume;
use crate::common::docker::lifecycle::{bring_up, ContainerSpec, MountSpec, PortSpec};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::resources::{Needs, Resources};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

const GRAFANA_ADMIN_KEYS: [&str; 2] = ["/Grafana/Admin/Username", "/Grafana/Admin/Password"];

/// Mount points node-exporter must not report on.
const IGNORED_MOUNT_POINTS: &str = "^/(sys|proc|dev|host|etc|rootfs/var/lib/docker/containers|rootfs/var/lib/docker/overlay2|rootfs/run/docker/netns|rootfs/var/lib/docker/aufs)($|/)";

#[derive(Parser, Debug)]
pub struct ObserverArgs {
    #[command(subcommand)]
    command: ObserverCommand,
}

#[derive(Subcommand, Debug)]
enum ObserverCommand {
    /// Start the metrics, dashboard and log shipping containers.
    Up,
}

pub async fn handle_observer(
    args: ObserverArgs,
    cfg: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    match args.command {
        ObserverCommand::Up => {
            let res = Resources::connect(cfg, Needs { secrets: true }, cancel).await?;
            super::report("observer", observer_up(&res, cfg).await);
        }
    }
    Ok(())
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn rslave_ro(source: &str, target: &str) -> MountSpec {
    MountSpec::Bind {
        source: source.to_string(),
        target: target.to_string(),
        read_only: true,
        rslave: true,
    }
}

fn cadvisor(cfg: &Config) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        ports: vec![PortSpec::new(8080, obs.ports.cadvisor)],
        mounts: vec![
            MountSpec::bind_ro("/", "/rootfs"),
            MountSpec::bind("/var/run", "/var/run"),
            MountSpec::bind_ro("/sys", "/sys"),
            MountSpec::bind_ro("/var/lib/docker", "/var/lib/docker"),
        ],
        networks: vec![cfg.networks.grafana_network_name.clone()],
        restart_always: true,
        ..ContainerSpec::new(&obs.container_names.cadvisor, &obs.images.cadvisor)
    }
}

fn alertmanager(cfg: &Config) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        cmd: args(&[
            "--config.file=/etc/alertmanager/config.yml",
            "--storage.path=/alertmanager",
        ]),
        ports: vec![PortSpec::new(9093, obs.ports.alertmanager)],
        mounts: vec![MountSpec::bind(&obs.binds.alertmanager, "/etc/alertmanager/")],
        networks: vec![cfg.networks.grafana_network_name.clone()],
        restart_always: true,
        ..ContainerSpec::new(&obs.container_names.alertmanager, &obs.images.alertmanager)
    }
}

fn node_exporter(cfg: &Config) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        cmd: args(&[
            "--path.rootfs=/host",
            "--collector.filesystem.ignored-mount-points",
            IGNORED_MOUNT_POINTS,
        ]),
        ports: vec![PortSpec::new(9100, obs.ports.node_exporter)],
        mounts: vec![rslave_ro("/", "/host")],
        networks: vec![cfg.networks.grafana_network_name.clone()],
        restart_always: true,
        ..ContainerSpec::new(&obs.container_names.node_exporter, &obs.images.node_exporter)
    }
}

fn prometheus(cfg: &Config) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        cmd: args(&[
            "--config.file=/etc/prometheus/prometheus.yml",
            "--storage.tsdb.path=/prometheus",
            "--web.console.libraries=/usr/share/prometheus/console_libraries",
            "--web.console.templates=/usr/share/prometheus/consoles",
        ]),
        ports: vec![PortSpec::new(9090, obs.ports.prometheus)],
        mounts: vec![
            MountSpec::volume(&obs.volumes.prometheus, "/prometheus"),
            MountSpec::bind(&obs.binds.prometheus, "/etc/prometheus/"),
        ],
        networks: vec![cfg.networks.grafana_network_name.clone()],
        restart_always: true,
        ..ContainerSpec::new(&obs.container_names.prometheus, &obs.images.prometheus)
    }
}

fn grafana(cfg: &Config, admin_user: &str, admin_password: &str) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        env: vec![
            "GF_USERS_ALLOW_SIGN_UP=false".to_string(),
            format!("GF_SECURITY_ADMIN_USER={}", admin_user),
            format!("GF_SECURITY_ADMIN_PASSWORD={}", admin_password),
        ],
        ports: vec![PortSpec::new(3000, obs.ports.grafana)],
        mounts: vec![
            MountSpec::volume(&obs.volumes.grafana, "/var/lib/grafana"),
            MountSpec::bind(&obs.binds.grafana, "/etc/grafana/"),
        ],
        networks: vec![
            cfg.networks.grafana_network_name.clone(),
            cfg.networks.loki_network_name.clone(),
        ],
        restart_always: true,
        ..ContainerSpec::new(&obs.container_names.grafana, &obs.images.grafana)
    }
}

fn loki(cfg: &Config) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        cmd: args(&["-config.file=/etc/loki/config.yaml"]),
        ports: vec![PortSpec::new(3169, obs.ports.loki)],
        mounts: vec![MountSpec::bind(&obs.binds.loki, "/etc/loki/")],
        networks: vec![
            cfg.networks.grafana_network_name.clone(),
            cfg.networks.loki_network_name.clone(),
        ],
        ..ContainerSpec::new(&obs.container_names.loki, &obs.images.loki)
    }
}

fn promtail(cfg: &Config) -> ContainerSpec {
    let obs = &cfg.observer;
    ContainerSpec {
        cmd: args(&["-config.file=/etc/promtail/config.yml"]),
        mounts: vec![MountSpec::bind("/var/log", "/var/log")],
        networks: vec![
            cfg.networks.loki_network_name.clone(),
            cfg.networks.grafana_network_name.clone(),
        ],
        ..ContainerSpec::new(&obs.container_names.promtail, &obs.images.promtail)
    }
}

pub async fn observer_up(res: &Resources, cfg: &Config) -> Result<()> {
    let volumes = &cfg.observer.volumes;
    ensure_volume(res.engine(), &volumes.grafana).await?;
    ensure_volume(res.engine(), &volumes.prometheus).await?;

    let admin = res.secrets()?.resolve(&GRAFANA_ADMIN_KEYS).await?;
    let specs = [
        cadvisor(cfg),
        alertmanager(cfg),
        node_exporter(cfg),
        prometheus(cfg),
        grafana(cfg, admin[0].expose(), admin[1].expose()),
        loki(cfg),
        promtail(cfg),
    ];
    for spec in &specs {
        bring_up(res, spec)
            .await
            .with_context(|| format!("failed to bring up '{}'", spec.name))?;
    }
    info!("Observer stack is up");
    Ok(())
}
