//! # Networks Command (`oblivion networks`)
//!
//! File: cli/src/commands/networks.rs
//!
//! ## Overview
//!
//! `oblivion networks up` ensures the four bridge networks the services share
//! (database, uptime, grafana, loki). The ensures run concurrently; losing a
//! creation race to another process is fine.
//!
use crate::common::docker::ensure::ensure_network;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::resources::{Needs, Resources};
use clap::{Parser, Subcommand};
use futures_util::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
pub struct NetworksArgs {
    #[command(subcommand)]
    command: NetworksCommand,
}

#[derive(Subcommand, Debug)]
enum NetworksCommand {
    /// Create the shared bridge networks if missing.
    Up,
}

pub async fn handle_networks(args: NetworksArgs, cfg: &Config, cancel: CancellationToken) -> Result<()> {
    match args.command {
        NetworksCommand::Up => {
            let res = Resources::connect(cfg, Needs::default(), cancel).await?;
            super::report("networks", networks_up(&res, cfg).await);
        }
    }
    Ok(())
}

pub async fn networks_up(res: &Resources, cfg: &Config) -> Result<()> {
    let names = [
        &cfg.networks.database_network_name,
        &cfg.networks.uptime_network_name,
        &cfg.networks.grafana_network_name,
        &cfg.networks.loki_network_name,
    ];
    try_join_all(names.iter().map(|name| ensure_network(res.engine(), name))).await?;
    info!("Networks ready");
    Ok(())
}
