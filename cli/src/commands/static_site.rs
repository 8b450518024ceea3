//! # Static File Server Command (`oblivion static`)
//!
//! File: cli/src/commands/static_site.rs
//!
//! ## Overview
//!
//! - `up`: builds the nginx image if it is missing, then runs the file server
//!   with the host's static directory bind-mounted, port 80 published on the
//!   configured host port, and the nginx health check.
//! - `chmod`: prepares the static directory for uploads: `root:<uploader
//!   group>` ownership, setgid on the top directory, group-writable contents,
//!   and a default ACL so new files inherit the same permissions.
//!
//! ## Build Context
//!
//! By default the image is built from the nginx Dockerfile and config compiled
//! into the binary. `--context DIR` builds from a directory on disk instead;
//! it must contain `nginx.Dockerfile`.
//!
use crate::common::archive::tar::VirtualTree;
use crate::common::docker::health::NGINX_HEALTHCHECK;
use crate::common::docker::images::build_image;
use crate::common::docker::lifecycle::{bring_up, ContainerSpec, MountSpec, PortSpec};
use crate::common::docker::state::{exists, ResourceKind};
use crate::common::process::run_inherited;
use crate::core::config::Config;
use crate::core::error::{OblivionError, Result};
use crate::core::resources::{Needs, Resources};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Where nginx serves from inside the container; matches `nginx.conf`.
const SERVE_ROOT: &str = "/var/www/servers/cansu.dev/static/";
const DOCKERFILE: &str = "nginx.Dockerfile";

const ROOT_MODE: u32 = 0o2775;
const DIR_MODE: u32 = 0o775;
const FILE_MODE: u32 = 0o664;
const DEFAULT_ACL: &str = "u::rwx,g::rwx,o::r-x";

#[derive(Parser, Debug)]
pub struct StaticArgs {
    #[command(subcommand)]
    command: StaticCommand,
}

#[derive(Subcommand, Debug)]
enum StaticCommand {
    /// Build the nginx image if needed and start the file server.
    Up {
        /// Build from this directory instead of the embedded nginx context.
        #[arg(long, value_name = "DIR")]
        context: Option<PathBuf>,
    },
    /// Fix ownership and permissions of the static directory (needs root).
    Chmod,
}

pub async fn handle_static(args: StaticArgs, cfg: &Config, cancel: CancellationToken) -> Result<()> {
    match args.command {
        StaticCommand::Up { context } => {
            let res = Resources::connect(cfg, Needs::default(), cancel).await?;
            super::report("static up", static_up(&res, cfg, context.as_deref()).await);
        }
        StaticCommand::Chmod => super::report("static chmod", static_chmod(cfg).await),
    }
    Ok(())
}

pub async fn static_up(res: &Resources, cfg: &Config, context: Option<&Path>) -> Result<()> {
    let site = &cfg.static_site;
    if exists(res.engine(), ResourceKind::Image, &site.image_name).await? {
        debug!("Image '{}' already present", site.image_name);
    } else {
        info!("Building image '{}'", site.image_name);
        let (tree, root) = match context {
            Some(dir) => (VirtualTree::from_dir(dir)?, PathBuf::new()),
            None => (VirtualTree::embedded_static(), PathBuf::from("static")),
        };
        build_image(res.engine(), &tree, &root, &site.image_name, DOCKERFILE).await?;
    }

    let spec = ContainerSpec {
        pull: false,
        ports: vec![PortSpec::new(80, site.port)],
        mounts: vec![MountSpec::bind(&site.static_path, SERVE_ROOT)],
        restart_always: true,
        healthcheck: Some(&NGINX_HEALTHCHECK),
        ..ContainerSpec::new(&site.container_name, &site.image_name)
    };
    bring_up(res, &spec).await?;
    Ok(())
}

fn uploader_gid(user: &str) -> Result<u32> {
    users::get_user_by_name(user)
        .map(|u| u.primary_group_id())
        .ok_or_else(|| anyhow!(OblivionError::Config(format!("user '{}' does not exist", user))))
}

/// Applies ownership and modes to `root` and everything below it.
///
/// `owner` of `None` leaves the owning user unchanged.
fn chmod_tree(root: &Path, owner: Option<u32>, gid: u32) -> Result<()> {
    use std::os::unix::fs::{chown, PermissionsExt};

    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("Failed to walk '{}'", root.display()))?;
        let path = entry.path();
        chown(path, owner, Some(gid))
            .with_context(|| format!("Failed to chown '{}'", path.display()))?;
        let mode = if entry.depth() == 0 {
            ROOT_MODE
        } else if entry.file_type().is_dir() {
            DIR_MODE
        } else {
            FILE_MODE
        };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to chmod '{}'", path.display()))?;
    }
    Ok(())
}

pub async fn static_chmod(cfg: &Config) -> Result<()> {
    let site = &cfg.static_site;
    let path = Path::new(&site.static_path);
    let gid = uploader_gid(&site.uploader_user)?;

    info!("Setting ownership root:{} on '{}'", gid, path.display());
    chmod_tree(path, Some(0), gid)?;
    run_inherited(
        "sudo",
        &["setfacl", "-R", "-d", "-m", DEFAULT_ACL, site.static_path.as_str()],
    )
    .await
    .context("Failed to set default ACL")?;
    info!("Permissions updated for '{}'", path.display());
    Ok(())
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::mock::MockEngine;
    use crate::core::resources::tests::mock_resources;
    use bollard::models::HealthStatusEnum;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_parse_static_up_context() {
        let args = StaticArgs::try_parse_from(["static", "up", "--context", "/tmp/ctx"]).unwrap();
        match args.command {
            StaticCommand::Up { context } => assert_eq!(context, Some(PathBuf::from("/tmp/ctx"))),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            StaticArgs::try_parse_from(["static", "chmod"]).unwrap().command,
            StaticCommand::Chmod
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_up_builds_missing_image_once() -> Result<()> {
        let engine = Arc::new(MockEngine::new());
        engine.script_health(&[HealthStatusEnum::HEALTHY]);
        let res = mock_resources(engine.clone(), None);
        let cfg = Config::default();

        static_up(&res, &cfg, None).await?;
        assert_eq!(engine.count_calls("build_image:cansu.dev-static-nginx"), 1);
        assert_eq!(engine.count_calls("pull_image"), 0);
        let server = engine.container("file-server").unwrap();
        assert!(server.running);
        let config = server.config.unwrap();
        assert_eq!(config.healthcheck, Some(NGINX_HEALTHCHECK.to_bollard()));
        let mounts = config.host_config.unwrap().mounts.unwrap();
        assert_eq!(mounts[0].target.as_deref(), Some(SERVE_ROOT));

        static_up(&res, &cfg, None).await?;
        assert_eq!(engine.count_calls("build_image"), 1);
        assert_eq!(engine.count_calls("create_container"), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_up_from_directory_context() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join(DOCKERFILE), "FROM nginx:alpine\n")?;
        let engine = Arc::new(MockEngine::new());
        engine.script_health(&[HealthStatusEnum::HEALTHY]);
        let res = mock_resources(engine.clone(), None);

        static_up(&res, &Config::default(), Some(dir.path())).await?;
        let contexts = engine.build_contexts();
        assert_eq!(contexts.len(), 1);
        assert!(!contexts[0].1.is_empty());
        Ok(())
    }

    #[test]
    fn test_chmod_tree_sets_modes() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("static");
        fs::create_dir_all(root.join("css"))?;
        fs::write(root.join("index.html"), "<html></html>")?;
        fs::write(root.join("css/site.css"), "body{}")?;
        let gid = fs::metadata(&root)?.gid();

        chmod_tree(&root, None, gid)?;

        let mode = |p: &Path| fs::metadata(p).map(|m| m.permissions().mode() & 0o7777);
        // setgid is dropped silently when the test user is not in the group.
        assert_eq!(mode(&root)? & 0o777, ROOT_MODE & 0o777);
        assert_eq!(mode(&root.join("css"))?, DIR_MODE);
        assert_eq!(mode(&root.join("index.html"))?, FILE_MODE);
        assert_eq!(mode(&root.join("css/site.css"))?, FILE_MODE);
        Ok(())
    }

    #[test]
    fn test_unknown_uploader_is_config_error() {
        let err = uploader_gid("oblivion-no-such-user").unwrap_err();
        assert!(err.to_string().contains("oblivion-no-such-user"));
    }
}
