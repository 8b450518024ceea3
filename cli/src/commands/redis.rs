//! # Redis Command (`oblivion redis`)
//!
//! File: cli/src/commands/redis.rs
//!
//! ## Overview
//!
//! `oblivion redis up` runs Dragonfly, a Redis compatible cache, on the
//! database network. The password comes from the vault item
//! `/Redis/password` and is passed both as `--requirepass` and as
//! `REDIS_PASSWORD`.
//!
use crate::common::docker::lifecycle::{bring_up, ContainerSpec, MountSpec, PortSpec};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::resources::{Needs, Resources};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

const PASSWORD_KEY: &str = "/Redis/password";

#[derive(Parser, Debug)]
pub struct RedisArgs {
    #[command(subcommand)]
    command: RedisCommand,
}

#[derive(Subcommand, Debug)]
enum RedisCommand {
    /// Start the Dragonfly cache container.
    Up,
}

pub async fn handle_redis(args: RedisArgs, cfg: &Config, cancel: CancellationToken) -> Result<()> {
    match args.command {
        RedisCommand::Up => {
            let res = Resources::connect(cfg, Needs { secrets: true }, cancel).await?;
            super::report("redis", redis_up(&res, cfg).await);
        }
    }
    Ok(())
}

pub async fn redis_up(res: &Resources, cfg: &Config) -> Result<()> {
    let secrets = res.secrets()?.resolve(&[PASSWORD_KEY]).await?;
    let password = secrets[0].expose();
    let dragonfly = &cfg.dragonfly;

    let spec = ContainerSpec {
        cmd: vec![
            "dragonfly".into(),
            "--requirepass".into(),
            password.to_string(),
        ],
        env: vec![format!("REDIS_PASSWORD={}", password)],
        ports: vec![PortSpec::new(6379, dragonfly.port)],
        mounts: vec![MountSpec::volume(&dragonfly.data_volume, "/data")],
        networks: vec![cfg.networks.database_network_name.clone()],
        restart_always: true,
        ..ContainerSpec::new(&dragonfly.container_name, &dragonfly.image)
    };
    bring_up(res, &spec).await?;
    Ok(())
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::mock::MockEngine;
    use crate::core::resources::tests::mock_resources;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_redis_up_passes_password() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        let res = mock_resources(engine.clone(), Some(&[("op://Server/Redis/password", "hunter2\n")]));
        let cfg = Config::default();

        redis_up(&res, &cfg).await?;
        let config = engine.container("cansu.dev-dragonfly").unwrap().config.unwrap();
        assert_eq!(
            config.cmd.unwrap(),
            vec!["dragonfly", "--requirepass", "hunter2"]
        );
        assert_eq!(config.env.unwrap(), vec!["REDIS_PASSWORD=hunter2"]);
        assert!(engine.volumes().contains(&"dragonflydata".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_redis_up_missing_secret_creates_nothing() {
        let engine = Arc::new(MockEngine::new());
        let res = mock_resources(engine.clone(), Some(&[]));

        assert!(redis_up(&res, &Config::default()).await.is_err());
        assert_eq!(engine.count_calls("create_"), 0);
    }
}
