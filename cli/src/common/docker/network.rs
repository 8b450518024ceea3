//! # Network Id Registry (`common::docker::network`)
//!
//! File: cli/src/common/docker/network.rs
//!
//! ## Overview
//!
//! Containers join networks by id. The registry maps network names to ids and
//! is filled once when a command starts. Ids are re-read from the engine
//! whenever endpoints are built, so a network created after startup, or removed
//! and re-created under the same name, attaches by its current id. A name the
//! engine does not know fails with `NetworkNotFound`.
//!
use super::engine::{filter, Engine};
use crate::core::error::{OblivionError, Result};
use anyhow::anyhow;
use bollard::models::EndpointSettings;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

#[derive(Debug, Default)]
pub struct NetworkRegistry {
    ids: Mutex<HashMap<String, String>>,
}

async fn lookup(engine: &dyn Engine, name: &str) -> Result<Option<String>> {
    let networks = engine.list_networks(filter("name", name)).await.map_err(|e| {
        anyhow!(OblivionError::DockerApi { source: e })
            .context(format!("Failed to list networks named '{}'", name))
    })?;
    Ok(networks
        .into_iter()
        .find(|n| n.name.as_deref() == Some(name))
        .and_then(|n| n.id))
}

impl NetworkRegistry {
    /// Resolves the ids of `names` that already exist. Missing ones are skipped.
    #[instrument(skip(engine))]
    pub async fn load(engine: &dyn Engine, names: &[&str]) -> Result<Self> {
        let registry = Self::default();
        for name in names {
            match lookup(engine, name).await? {
                Some(id) => registry.insert(name, &id),
                None => debug!("Network '{}' does not exist yet", name),
            }
        }
        Ok(registry)
    }

    fn insert(&self, name: &str, id: &str) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.insert(name.to_string(), id.to_string());
        }
    }

    fn cached(&self, name: &str) -> Option<String> {
        self.ids.lock().ok().and_then(|ids| ids.get(name).cloned())
    }

    /// Returns the current id of `name` from the engine and records it.
    pub async fn refresh(&self, engine: &dyn Engine, name: &str) -> Result<String> {
        match lookup(engine, name).await? {
            Some(id) => {
                if self.cached(name).is_some_and(|old| old != id) {
                    debug!("Network '{}' changed id since startup", name);
                }
                self.insert(name, &id);
                Ok(id)
            }
            None => {
                warn!("Network '{}' not found", name);
                Err(anyhow!(OblivionError::NetworkNotFound {
                    name: name.to_string()
                }))
            }
        }
    }

    /// Endpoint settings attaching a container to each of `names`.
    pub async fn endpoints(
        &self,
        engine: &dyn Engine,
        names: &[String],
    ) -> Result<HashMap<String, EndpointSettings>> {
        let mut endpoints = HashMap::new();
        for name in names {
            let id = self.refresh(engine, name).await?;
            endpoints.insert(
                name.clone(),
                EndpointSettings {
                    network_id: Some(id),
                    ..Default::default()
                },
            );
        }
        Ok(endpoints)
    }
}
