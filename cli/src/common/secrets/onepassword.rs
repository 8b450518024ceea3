//! # 1Password Secret Store (`common::secrets::onepassword`)
//!
//! File: cli/src/common/secrets/onepassword.rs
//!
//! ## Overview
//!
//! `SecretStore` backed by the 1Password `op` CLI, authenticated with a
//! service account token from `OP_SERVICE_ACCOUNT_TOKEN`.
//!
//! - At startup `connect_secrets` checks the token is set and that the
//!   configured vault exists (`op vault get <name> --format json`), failing
//!   before any container is touched.
//! - A batch of references is resolved with a single `op inject` call: the
//!   references are written to stdin as `{{ op://... }}` placeholders joined by
//!   a unit separator, and the rendered output is split on the same separator.
//!
use super::{SecretResolver, SecretStore};
use crate::common::process::run_captured;
use crate::core::config::OnepassConfig;
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const TOKEN_ENV: &str = "OP_SERVICE_ACCOUNT_TOKEN";
const OP_BINARY: &str = "op";
/// ASCII unit separator; never part of a reference or a sane secret.
const SEPARATOR: char = '\u{1f}';

#[derive(Debug, Deserialize)]
struct VaultInfo {
    id: String,
    name: String,
}

/// The `op` CLI as a secret store. The token is held but never printed.
pub struct OpCliStore {
    token: String,
}

impl OpCliStore {
    /// Reads the service account token from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_token(std::env::var(TOKEN_ENV).ok())
    }

    fn from_token(token: Option<String>) -> Result<Self> {
        match token.map(|t| t.trim().to_string()) {
            Some(token) if !token.is_empty() => Ok(Self { token }),
            _ => Err(anyhow!(OblivionError::SecretStore(format!(
                "onepassword service account token not set ({})",
                TOKEN_ENV
            )))),
        }
    }

    async fn op(&self, args: &[&str], input: Option<&[u8]>) -> Result<Vec<u8>> {
        run_captured(OP_BINARY, args, &[(TOKEN_ENV, self.token.as_str())], input).await
    }

    /// Looks the vault up by title and returns its id.
    #[instrument(skip(self))]
    pub async fn verify_vault(&self, name: &str) -> Result<String> {
        let out = self
            .op(&["vault", "get", name, "--format", "json"], None)
            .await
            .with_context(|| format!("cannot find vault id from name {}", name))?;
        let vault: VaultInfo = serde_json::from_slice(&out)
            .context("Failed to parse `op vault get` output")?;
        if vault.name != name {
            return Err(anyhow!(OblivionError::SecretStore(format!(
                "cannot find vault id from name {}",
                name
            ))));
        }
        debug!("Vault '{}' has id {}", vault.name, vault.id);
        Ok(vault.id)
    }
}

/// `op inject` template for `references`.
fn inject_template(references: &[String]) -> String {
    references
        .iter()
        .map(|r| format!("{{{{ {} }}}}", r))
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// Splits rendered `op inject` output back into one value per reference.
fn split_injected(output: &str, expected: usize) -> Result<Vec<String>> {
    let values: Vec<String> = output.split(SEPARATOR).map(str::to_string).collect();
    if values.len() != expected {
        return Err(anyhow!(OblivionError::SecretStore(format!(
            "op inject returned {} values for {} references",
            values.len(),
            expected
        ))));
    }
    Ok(values)
}

#[async_trait]
impl SecretStore for OpCliStore {
    async fn resolve_batch(&self, references: &[String]) -> Result<Vec<String>> {
        let template = inject_template(references);
        let out = self
            .op(&["inject"], Some(template.as_bytes()))
            .await
            .context("op inject failed")?;
        let rendered = String::from_utf8(out)
            .map_err(|_| anyhow!(OblivionError::SecretStore("op inject returned non UTF-8 output".into())))?;
        split_injected(&rendered, references.len())
    }
}

/// Authenticates against 1Password and returns a resolver for the configured vault.
pub async fn connect_secrets(cfg: &OnepassConfig) -> Result<SecretResolver> {
    let store = OpCliStore::from_env()?;
    store.verify_vault(&cfg.vault_name).await?;
    info!("Using 1Password vault '{}'", cfg.vault_name);
    Ok(SecretResolver::new(&cfg.vault_name, Arc::new(store)))
}
