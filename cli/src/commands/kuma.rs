//! # Uptime Kuma Command (`oblivion kuma`)
//!
//! File: cli/src/commands/kuma.rs
//!
//! ## Overview
//!
//! - `up`: runs the Uptime Kuma monitor on the database and uptime networks,
//!   with its data in a named volume and restart policy `always`.
//! - `down`: stops it. A missing container is reported, not treated as a
//!   failure.
//!
use crate::common::docker::lifecycle::{bring_up, stop_by_name, ContainerSpec, MountSpec, PortSpec};
use crate::core::config::Config;
use crate::core::error::{OblivionError, Result};
use crate::core::resources::{Needs, Resources};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser, Debug)]
pub struct KumaArgs {
    #[command(subcommand)]
    command: KumaCommand,
}

#[derive(Subcommand, Debug)]
enum KumaCommand {
    /// Start the Uptime Kuma container.
    Up,
    /// Stop the Uptime Kuma container.
    Down,
}

pub async fn handle_kuma(args: KumaArgs, cfg: &Config, cancel: CancellationToken) -> Result<()> {
    let res = Resources::connect(cfg, Needs::default(), cancel).await?;
    match args.command {
        KumaCommand::Up => super::report("kuma up", kuma_up(&res, cfg).await),
        KumaCommand::Down => super::report("kuma down", kuma_down(&res, cfg).await),
    }
    Ok(())
}

fn kuma_spec(cfg: &Config) -> ContainerSpec {
    let kuma = &cfg.kuma;
    ContainerSpec {
        ports: vec![PortSpec::new(3001, kuma.port)],
        mounts: vec![MountSpec::volume(&kuma.data_volume, "/app/data")],
        networks: vec![
            cfg.networks.database_network_name.clone(),
            cfg.networks.uptime_network_name.clone(),
        ],
        restart_always: true,
        ..ContainerSpec::new(&kuma.container_name, &kuma.image_name)
    }
}

pub async fn kuma_up(res: &Resources, cfg: &Config) -> Result<()> {
    bring_up(res, &kuma_spec(cfg)).await?;
    Ok(())
}

pub async fn kuma_down(res: &Resources, cfg: &Config) -> Result<()> {
    match stop_by_name(res.engine(), &cfg.kuma.container_name).await {
        Ok(_) => Ok(()),
        Err(e)
            if matches!(
                e.downcast_ref::<OblivionError>(),
                Some(OblivionError::ContainerNotFound { .. })
            ) =>
        {
            warn!("Container '{}' does not exist, nothing to stop", cfg.kuma.container_name);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::mock::MockEngine;
    use crate::core::resources::tests::mock_resources;
    use std::sync::Arc;

    #[test]
    fn test_parse_kuma_subcommands() {
        assert!(matches!(
            KumaArgs::try_parse_from(["kuma", "up"]).unwrap().command,
            KumaCommand::Up
        ));
        assert!(matches!(
            KumaArgs::try_parse_from(["kuma", "down"]).unwrap().command,
            KumaCommand::Down
        ));
        assert!(KumaArgs::try_parse_from(["kuma"]).is_err());
    }

    #[tokio::test]
    async fn test_kuma_up_then_down() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        let res = mock_resources(engine.clone(), None);
        let cfg = Config::default();

        kuma_up(&res, &cfg).await?;
        let kuma = engine.container("cansu.dev-uptime-kuma").unwrap();
        assert!(kuma.running);
        assert_eq!(
            kuma.config.unwrap().image.as_deref(),
            Some("louislam/uptime-kuma:1")
        );
        assert!(engine.volumes().contains(&"uptime-kuma".to_string()));

        kuma_down(&res, &cfg).await?;
        assert!(!engine.container("cansu.dev-uptime-kuma").unwrap().running);
        Ok(())
    }

    #[tokio::test]
    async fn test_kuma_down_without_container_is_ok() -> Result<()> {
        let res = mock_resources(Arc::new(MockEngine::new()), None);
        kuma_down(&res, &Config::default()).await
    }

    #[test]
    fn test_kuma_spec_uses_configured_port() {
        let mut cfg = Config::default();
        cfg.kuma.port = 13001;
        let spec = kuma_spec(&cfg);
        assert_eq!(spec.ports, vec![PortSpec::new(3001, 13001)]);
        assert_eq!(spec.networks, vec!["database_bridge", "uptime_bridge"]);
    }
}
