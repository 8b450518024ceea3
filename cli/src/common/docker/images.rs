//! # Image Pull & Build (`common::docker::images`)
//!
//! File: cli/src/common/docker/images.rs
//!
//! ## Overview
//!
//! Gets images onto the engine:
//! - **`pull_if_absent`**: checks for the image by reference and pulls it only
//!   when missing. This single existence check is the only image caching the
//!   orchestrator does.
//! - **`pull_image`**: drives the pull progress stream to completion, reporting
//!   layer status at info/debug level. An error entry in the stream aborts.
//! - **`build_image`**: packages a `VirtualTree` into a gzipped build context
//!   and streams the engine's build output to stdout.
//!
use super::engine::Engine;
use super::state::{exists, ResourceKind};
use crate::common::archive::tar::{package_context, VirtualTree};
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use bollard::image::BuildImageOptions;
use bollard::models::{BuildInfo, CreateImageInfo};
use futures_util::stream::StreamExt;
use std::io::{stdout, Write as IoWrite};
use std::path::Path;
use tracing::{debug, error, info, instrument};

/// Pulls `image` unless the engine already has it. Returns `true` if pulled.
#[instrument(skip(engine), fields(image = %image))]
pub async fn pull_if_absent(engine: &dyn Engine, image: &str) -> Result<bool> {
    if exists(engine, ResourceKind::Image, image).await? {
        debug!("Image '{}' already present, skipping pull", image);
        return Ok(false);
    }
    pull_image(engine, image).await?;
    Ok(true)
}

/// Pulls `image`, consuming the progress stream until it ends.
pub async fn pull_image(engine: &dyn Engine, image: &str) -> Result<()> {
    info!("Pulling image {}", image);
    let mut progress = engine.pull_image(image);

    while let Some(item) = progress.next().await {
        let info = item
            .map_err(|e| anyhow!(OblivionError::DockerApi { source: e }))
            .with_context(|| format!("Failed to pull image '{}'", image))?;
        match info {
            CreateImageInfo {
                error: Some(err), ..
            } => {
                error!("Pull of {} failed: {}", image, err);
                return Err(anyhow!(OblivionError::DockerOperation(format!(
                    "Pull of '{}' failed: {}",
                    image, err
                ))));
            }
            CreateImageInfo {
                id: Some(id),
                status: Some(status),
                progress: Some(p),
                ..
            } => debug!("{}: {} {}", id, status, p),
            CreateImageInfo {
                id: Some(id),
                status: Some(status),
                ..
            } => info!("{}: {}", id, status),
            CreateImageInfo {
                status: Some(status),
                ..
            } => info!("{}", status),
            other => debug!("Unhandled pull progress: {:?}", other),
        }
    }

    info!("Pulled image {}", image);
    Ok(())
}

/// Builds `tag` from the part of `tree` under `root`.
///
/// `dockerfile` is relative to `root`.
#[instrument(skip(engine, tree), fields(tag = %tag))]
pub async fn build_image(
    engine: &dyn Engine,
    tree: &VirtualTree,
    root: &Path,
    tag: &str,
    dockerfile: &str,
) -> Result<()> {
    info!("Creating build context from '{}'", root.display());
    let context = package_context(tree, root).context("Failed to create build context")?;
    debug!("Build context is {} bytes", context.len());

    let options = BuildImageOptions {
        dockerfile: dockerfile.to_string(),
        t: tag.to_string(),
        rm: true,
        ..Default::default()
    };

    info!("Starting image build for tag: {}", tag);
    let mut build_stream = engine.build_image(options, context);
    while let Some(item) = build_stream.next().await {
        let info = item
            .map_err(|e| anyhow!(OblivionError::DockerApi { source: e }))
            .context("Failed to process build stream event")?;
        match info {
            BuildInfo {
                stream: Some(s), ..
            } => print!("{}", s),
            BuildInfo {
                error: Some(err),
                error_detail,
                ..
            } => {
                let detail = error_detail.and_then(|d| d.message).unwrap_or_default();
                error!("Build Error: {} - {}", err, detail);
                return Err(anyhow!(OblivionError::DockerOperation(format!(
                    "Build failed: {}. {}",
                    err, detail
                ))));
            }
            BuildInfo {
                status: Some(s), ..
            } => debug!("Build Status: {}", s),
            other => debug!("Received unhandled build info: {:?}", other),
        }
        let _ = stdout().flush();
    }

    info!("Image build finished for tag: {}", tag);
    Ok(())
}
