//! # Oblivion Configuration System
//!
//! File: cli/src/core/config.rs
//!
//! ## Overview
//!
//! Loads the single TOML configuration file that describes the host's service
//! topology: the Docker socket, the shared bridge networks, the 1Password vault
//! and the names, images, ports and volumes of every managed service.
//!
//! ## Architecture
//!
//! - The file lives at `~/.oblivion.toml` unless `--config` points elsewhere.
//! - A missing file is not an error: the built-in defaults are serialized,
//!   written to that path, and then used, so the user always has a complete
//!   file to edit.
//! - Every section is `#[serde(default)]`, so a partial file only overrides
//!   what it names. Unknown keys are rejected to catch typos early.
//! - Paths are expanded (`~` to the home directory) and the result validated
//!   before any command touches the engine.
//!
//! The loaded `Config` is created once in `main` and passed by reference to
//! every command; nothing in the crate reads configuration from global state.
//!
//! ## Examples
//!
//! ```rust
//! let cfg = config::load_config(None)?;
//! let primary = &cfg.postgres.primary_name;
//! let bridge = &cfg.networks.database_network_name;
//! ```
//!
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// File name of the configuration file inside the home directory.
pub const CONFIG_FILENAME: &str = ".oblivion.toml";

/// Socket used when `docker.socket` is left empty.
pub const DEFAULT_DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";

/// Represents the main configuration structure, loaded from TOML.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub networks: NetworkConfig,
    #[serde(default)]
    pub onepass: OnepassConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub dragonfly: DragonflyConfig,
    #[serde(default)]
    pub kuma: KumaConfig,
    #[serde(default, rename = "static")]
    pub static_site: StaticConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
}

/// Connection settings for the local Docker engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DockerConfig {
    /// Engine address, e.g. `unix:///var/run/docker.sock`.
    pub socket: String,
}

/// Names of the bridge networks shared between services.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub database_network_name: String,
    pub uptime_network_name: String,
    pub grafana_network_name: String,
    pub loki_network_name: String,
}

/// 1Password settings. The service account token itself is read from the
/// `OP_SERVICE_ACCOUNT_TOKEN` environment variable, never from this file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OnepassConfig {
    /// Display name of the vault holding the service secrets.
    pub vault_name: String,
}

/// Primary/replica PostgreSQL cluster and its pgbouncer front.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PostgresConfig {
    pub db: String,
    pub primary_name: String,
    pub replica_name: String,
    pub bouncer_name: String,
    pub primary_image: String,
    pub replica_image: String,
    pub bouncer_image: String,
    pub primary_port: u16,
    pub bouncer_port: u16,
    pub primary_data_vol: String,
    pub replica_data_vol: String,
}

/// Dragonfly (Redis compatible) cache.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DragonflyConfig {
    pub container_name: String,
    pub image: String,
    pub port: u16,
    pub data_volume: String,
}

/// Uptime Kuma monitor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct KumaConfig {
    pub container_name: String,
    pub image_name: String,
    pub port: u16,
    pub data_volume: String,
}

/// Static file server (nginx image built locally).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// Account whose primary group owns the served directory.
    pub uploader_user: String,
    /// Host directory served by nginx (can use ~).
    pub static_path: String,
    /// Host port mapped to the container's port 80.
    pub port: u16,
    pub image_name: String,
    pub container_name: String,
}

/// Observability stack: metrics, dashboards and log shipping.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverConfig {
    pub images: ObserverImages,
    pub container_names: ObserverContainerNames,
    pub ports: ObserverPorts,
    pub volumes: ObserverVolumes,
    pub binds: ObserverBinds,
}

/// Image reference per observer component.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverImages {
    pub cadvisor: String,
    pub alertmanager: String,
    pub node_exporter: String,
    pub prometheus: String,
    pub grafana: String,
    pub loki: String,
    pub promtail: String,
}

/// Container name per observer component.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverContainerNames {
    pub cadvisor: String,
    pub alertmanager: String,
    pub node_exporter: String,
    pub prometheus: String,
    pub grafana: String,
    pub loki: String,
    pub promtail: String,
}

/// Host ports published by the observer components. Promtail publishes none.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverPorts {
    pub cadvisor: u16,
    pub alertmanager: u16,
    pub node_exporter: u16,
    pub prometheus: u16,
    pub grafana: u16,
    pub loki: u16,
}

/// Named volumes holding observer state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverVolumes {
    pub grafana: String,
    pub prometheus: String,
}

/// Host directories with the observer components' configuration files (can use ~).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverBinds {
    pub prometheus: String,
    pub alertmanager: String,
    pub grafana: String,
    pub loki: String,
}

// --- Default values ---

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: DEFAULT_DOCKER_SOCKET.to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            database_network_name: "database_bridge".into(),
            uptime_network_name: "uptime_bridge".into(),
            grafana_network_name: "grafana_bridge".into(),
            loki_network_name: "loki_bridge".into(),
        }
    }
}

impl Default for OnepassConfig {
    fn default() -> Self {
        Self {
            vault_name: "Server".into(),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            db: "postgres".into(),
            primary_name: "cansu.dev-pg-primary".into(),
            replica_name: "cansu.dev-pg-replica".into(),
            bouncer_name: "cansu.dev-pg-bouncer".into(),
            primary_image: "postgres:17".into(),
            replica_image: "postgres:17".into(),
            bouncer_image: "edoburu/pgbouncer:latest".into(),
            primary_port: 5432,
            bouncer_port: 6432,
            primary_data_vol: "pg_primary_data".into(),
            replica_data_vol: "pg_replica_data".into(),
        }
    }
}

impl Default for DragonflyConfig {
    fn default() -> Self {
        Self {
            container_name: "cansu.dev-dragonfly".into(),
            image: "docker.dragonflydb.io/dragonflydb/dragonfly:latest".into(),
            port: 6379,
            data_volume: "dragonflydata".into(),
        }
    }
}

impl Default for KumaConfig {
    fn default() -> Self {
        Self {
            container_name: "cansu.dev-uptime-kuma".into(),
            image_name: "louislam/uptime-kuma:1".into(),
            port: 3001,
            data_volume: "uptime-kuma".into(),
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            uploader_user: "caner".into(),
            static_path: "/var/www/servers/cansu.dev/static".into(),
            port: 44444,
            image_name: "cansu.dev-static-nginx".into(),
            container_name: "file-server".into(),
        }
    }
}

impl Default for ObserverImages {
    fn default() -> Self {
        Self {
            cadvisor: "gcr.io/cadvisor/cadvisor:latest".into(),
            alertmanager: "prom/alertmanager:latest".into(),
            node_exporter: "prom/node-exporter:latest".into(),
            prometheus: "prom/prometheus:latest".into(),
            grafana: "grafana/grafana:latest".into(),
            loki: "grafana/loki:latest".into(),
            promtail: "grafana/promtail:latest".into(),
        }
    }
}

impl Default for ObserverContainerNames {
    fn default() -> Self {
        Self {
            cadvisor: "cansu.dev-cadvisor".into(),
            alertmanager: "cansu.dev-alertmanager".into(),
            node_exporter: "cansu.dev-node-exporter".into(),
            prometheus: "cansu.dev-prometheus".into(),
            grafana: "cansu.dev-grafana".into(),
            loki: "cansu.dev-loki".into(),
            promtail: "cansu.dev-promtail".into(),
        }
    }
}

impl Default for ObserverPorts {
    fn default() -> Self {
        Self {
            cadvisor: 8080,
            alertmanager: 9093,
            node_exporter: 9100,
            prometheus: 9090,
            grafana: 3000,
            loki: 3169,
        }
    }
}

impl Default for ObserverVolumes {
    fn default() -> Self {
        Self {
            grafana: "grafana-storage".into(),
            prometheus: "prometheus-data".into(),
        }
    }
}

impl Default for ObserverBinds {
    fn default() -> Self {
        Self {
            prometheus: "~/.config/oblivion/prometheus".into(),
            alertmanager: "~/.config/oblivion/alertmanager".into(),
            grafana: "~/.config/oblivion/grafana".into(),
            loki: "~/.config/oblivion/loki".into(),
        }
    }
}

// --- Loading ---

/// Returns `~/.oblivion.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!(OblivionError::Config("Could not determine home directory".into())))?;
    Ok(home.join(CONFIG_FILENAME))
}

/// Loads, expands and validates the configuration.
///
/// `path` overrides the default location. When the file does not exist the
/// defaults are written there first.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) => PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned()),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        write_default_config(&config_path)?;
    }

    info!("Loading configuration from: {}", config_path.display());
    let mut cfg = load_config_from_path(&config_path)?;
    expand_config_paths(&mut cfg);
    validate_config(&cfg).context("Configuration validation failed")?;
    debug!("Final loaded configuration: {:?}", cfg);
    Ok(cfg)
}

fn write_default_config(path: &Path) -> Result<()> {
    info!(
        "Configuration file not found, writing defaults to {}",
        path.display()
    );
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory '{}'", parent.display())
            })?;
        }
    }
    let rendered = toml::to_string_pretty(&Config::default())
        .context("Failed to serialize default configuration")?;
    fs::write(path, rendered)
        .with_context(|| format!("Failed to save default config to {}", path.display()))
}

fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML from file: {}", path.display()))
}

fn expand_config_paths(config: &mut Config) {
    debug!("Expanding paths in configuration...");
    let expand = |p: &mut String| *p = shellexpand::tilde(p).into_owned();
    expand(&mut config.static_site.static_path);
    expand(&mut config.observer.binds.prometheus);
    expand(&mut config.observer.binds.alertmanager);
    expand(&mut config.observer.binds.grafana);
    expand(&mut config.observer.binds.loki);
}

fn validate_config(config: &Config) -> Result<()> {
    if config.docker.socket.trim().is_empty() {
        warn!(
            "docker socket is not set, defaulting back to {}",
            DEFAULT_DOCKER_SOCKET
        );
    }

    let required = [
        ("networks.database_network_name", &config.networks.database_network_name),
        ("networks.uptime_network_name", &config.networks.uptime_network_name),
        ("networks.grafana_network_name", &config.networks.grafana_network_name),
        ("networks.loki_network_name", &config.networks.loki_network_name),
        ("onepass.vault_name", &config.onepass.vault_name),
        ("postgres.db", &config.postgres.db),
        ("postgres.primary_name", &config.postgres.primary_name),
        ("postgres.replica_name", &config.postgres.replica_name),
        ("postgres.bouncer_name", &config.postgres.bouncer_name),
        ("postgres.primary_data_vol", &config.postgres.primary_data_vol),
        ("postgres.replica_data_vol", &config.postgres.replica_data_vol),
        ("dragonfly.container_name", &config.dragonfly.container_name),
        ("kuma.container_name", &config.kuma.container_name),
        ("static.static_path", &config.static_site.static_path),
        ("static.image_name", &config.static_site.image_name),
        ("static.container_name", &config.static_site.container_name),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(anyhow!(OblivionError::Config(format!(
                "'{}' must not be empty",
                key
            ))));
        }
    }

    let ports = [
        ("postgres.primary_port", config.postgres.primary_port),
        ("postgres.bouncer_port", config.postgres.bouncer_port),
        ("dragonfly.port", config.dragonfly.port),
        ("kuma.port", config.kuma.port),
        ("static.port", config.static_site.port),
    ];
    for (key, port) in ports {
        if port == 0 {
            return Err(anyhow!(OblivionError::Config(format!(
                "'{}' must be a non-zero port",
                key
            ))));
        }
    }
    debug!("Configuration validation successful.");
    Ok(())
}
