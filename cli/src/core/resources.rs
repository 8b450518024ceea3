//! # Command Dependencies (`core::resources`)
//!
//! File: cli/src/core/resources.rs
//!
//! ## Overview
//!
//! Everything a service bring-up needs from the outside world, built once in
//! `main` and passed explicitly to each command handler:
//! - the engine client (one per process, closed when the last `Arc` drops)
//! - the secret resolver, only for commands that read credentials
//! - the network id registry
//! - the root cancellation token, fired on Ctrl-C
//!
//! Commands declare what they need with `Needs`, so a command that never reads
//! secrets does not require a 1Password token.
//!
use crate::common::docker::connect::connect_engine;
use crate::common::docker::engine::Engine;
use crate::common::docker::network::NetworkRegistry;
use crate::common::secrets::onepassword::connect_secrets;
use crate::common::secrets::SecretResolver;
use crate::core::config::Config;
use crate::core::error::{OblivionError, Result};
use anyhow::anyhow;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which external clients a command requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Needs {
    pub secrets: bool,
}

pub struct Resources {
    pub engine: Arc<dyn Engine>,
    pub secrets: Option<SecretResolver>,
    pub networks: NetworkRegistry,
    pub cancel: CancellationToken,
}

impl Resources {
    /// Connects the engine (and the secret store when `needs.secrets`) and
    /// resolves the configured networks.
    pub async fn connect(cfg: &Config, needs: Needs, cancel: CancellationToken) -> Result<Self> {
        let engine = connect_engine(&cfg.docker).await?;
        let secrets = if needs.secrets {
            Some(connect_secrets(&cfg.onepass).await?)
        } else {
            None
        };
        let names = [
            cfg.networks.database_network_name.as_str(),
            cfg.networks.uptime_network_name.as_str(),
            cfg.networks.grafana_network_name.as_str(),
            cfg.networks.loki_network_name.as_str(),
        ];
        let networks = NetworkRegistry::load(engine.as_ref(), &names).await?;
        Ok(Self {
            engine,
            secrets,
            networks,
            cancel,
        })
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// The secret resolver, or a configuration error if none was connected.
    pub fn secrets(&self) -> Result<&SecretResolver> {
        self.secrets.as_ref().ok_or_else(|| {
            anyhow!(OblivionError::Config(
                "this command needs the secret store but none was configured".into()
            ))
        })
    }
}
