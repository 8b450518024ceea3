//! # Version Command (`oblivion version`)
//!
//! File: cli/src/commands/version.rs
//!
//! Prints the tool version, the Docker API version the client negotiated and
//! the engine's own version.
//!
use crate::common::docker::engine::Engine;
use crate::core::config::Config;
use crate::core::error::{OblivionError, Result};
use crate::core::resources::{Needs, Resources};
use anyhow::anyhow;
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
pub struct VersionArgs {}

pub async fn handle_version(_args: VersionArgs, cfg: &Config, cancel: CancellationToken) -> Result<()> {
    let res = Resources::connect(cfg, Needs::default(), cancel).await?;
    for line in version_lines(res.engine()).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn version_lines(engine: &dyn Engine) -> Result<Vec<String>> {
    let server = engine
        .version()
        .await
        .map_err(|e| anyhow!(OblivionError::DockerApi { source: e }))?;
    Ok(vec![
        format!("Oblivion {}", env!("CARGO_PKG_VERSION")),
        format!("Docker API {}", engine.client_version()),
        format!(
            "Docker Engine {} (API {})",
            server.version.as_deref().unwrap_or("unknown"),
            server.api_version.as_deref().unwrap_or("unknown")
        ),
    ])
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::mock::MockEngine;

    #[tokio::test]
    async fn test_version_lines() -> Result<()> {
        let lines = version_lines(&MockEngine::new()).await?;
        assert_eq!(lines[0], format!("Oblivion {}", env!("CARGO_PKG_VERSION")));
        assert_eq!(lines[1], "Docker API 1.47");
        assert_eq!(lines[2], "Docker Engine 27.3.1 (API 1.47)");
        Ok(())
    }
}
