//! # Secret Resolution (`common::secrets`)
//!
//! File: cli/src/common/secrets/mod.rs
//!
//! ## Overview
//!
//! Service bring-ups ask for credentials by short key, such as
//! `/Postgres/Root/password`. `SecretResolver` prefixes each key with the vault
//! path chosen at startup (`op://<vault>`), resolves the whole batch through a
//! `SecretStore` in one round trip, and returns the cleaned values in the order
//! the keys were given.
//!
//! ## Handling plaintext
//!
//! - Values are wrapped in `Secret`, whose `Debug` output is redacted and
//!   which has no `Display`. Reading the value requires `expose()`.
//! - Only key names and counts are ever logged.
//! - Values live in memory for the duration of one command.
//!
//! ## Architecture
//!
//! - `SecretStore` is the seam to the vault. Production uses `OpCliStore`
//!   (`onepassword` submodule); tests use an in-memory map.
//! - Cleaning trims whitespace and control characters from both ends, which
//!   removes the line feeds vault tools tend to append.
//!
pub mod onepassword;

use crate::core::error::{OblivionError, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A resolved secret value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Resolves fully-qualified vault references to plaintext.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns one value per reference, in the same order.
    async fn resolve_batch(&self, references: &[String]) -> Result<Vec<String>>;
}

/// Strips surrounding whitespace and control characters.
pub fn clean(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}

/// Turns short keys into vault references and resolves them.
#[derive(Clone)]
pub struct SecretResolver {
    prefix: String,
    store: Arc<dyn SecretStore>,
}

impl SecretResolver {
    pub fn new(vault_name: &str, store: Arc<dyn SecretStore>) -> Self {
        Self {
            prefix: format!("op://{}", vault_name),
            store,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully-qualified reference for `key`.
    pub fn reference(&self, key: &str) -> String {
        let key = key.trim();
        if key.starts_with('/') {
            format!("{}{}", self.prefix, key)
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    /// Resolves `keys`, returning cleaned values in input order.
    #[instrument(skip(self))]
    pub async fn resolve(&self, keys: &[&str]) -> Result<Vec<Secret>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let references: Vec<String> = keys.iter().map(|k| self.reference(k)).collect();
        let values = self
            .store
            .resolve_batch(&references)
            .await
            .map_err(|e| e.context("failed to resolve secrets"))?;

        if values.len() != references.len() {
            return Err(anyhow!(OblivionError::SecretStore(format!(
                "expected {} secrets, got {}",
                references.len(),
                values.len()
            ))));
        }
        debug!("Resolved {} secrets", values.len());
        Ok(values.iter().map(|v| Secret::new(clean(v))).collect())
    }
}
