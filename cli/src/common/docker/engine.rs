//! # Container Engine Boundary (`common::docker::engine`)
//!
//! File: cli/src/common/docker/engine.rs
//!
//! ## Overview
//!
//! Every query and mutation the orchestrator sends to Docker goes through the
//! `Engine` trait defined here. The production implementation, `BollardEngine`,
//! is a thin pass-through to a single negotiated `bollard::Docker` client; the
//! test suite swaps in a recording in-memory engine (`mock::MockEngine`) so the
//! checker, ensurer, poller and bring-up logic can be exercised without a
//! daemon.
//!
//! ## Architecture
//!
//! - The trait is object safe (`async_trait`) and shared as `Arc<dyn Engine>`.
//! - Methods return raw `bollard::errors::Error` values. Interpreting status
//!   codes (404, 304, 409) is the job of the callers in `state`, `ensure` and
//!   `lifecycle`, so the mock only has to produce the same codes Docker would.
//! - Streaming endpoints (pull, build, logs) return boxed `'static` streams.
//!   Dropping the stream closes the underlying HTTP response.
//! - Container listings always include stopped containers (`all = true`).
//!
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::image::{BuildImageOptions, CreateImageOptions, ListImagesOptions};
use bollard::models::{
    BuildInfo, ContainerInspectResponse, ContainerSummary, CreateImageInfo, ImageSummary, Network,
    Volume,
};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::system::Version;
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::Docker;
use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;

pub use bollard::errors::Error as DockerError;

/// Docker list filters, e.g. `{"name": ["pg-primary"]}`.
pub type Filters = HashMap<String, Vec<String>>;

pub type ImageStream = Pin<Box<dyn Stream<Item = Result<CreateImageInfo, DockerError>> + Send>>;
/// Borrows the client for as long as the build runs.
pub type BuildStream<'a> = Pin<Box<dyn Stream<Item = Result<BuildInfo, DockerError>> + Send + 'a>>;
pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogOutput, DockerError>> + Send>>;

/// Identifier and non-fatal warnings returned by a create call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Created {
    pub id: String,
    pub warnings: Vec<String>,
}

/// Builds a single-key filter map.
pub fn filter(key: &str, value: &str) -> Filters {
    HashMap::from([(key.to_string(), vec![value.to_string()])])
}

#[async_trait]
pub trait Engine: Send + Sync {
    async fn list_networks(&self, filters: Filters) -> Result<Vec<Network>, DockerError>;
    async fn create_network(
        &self,
        options: CreateNetworkOptions<String>,
    ) -> Result<Created, DockerError>;

    async fn list_volumes(&self, filters: Filters) -> Result<Vec<Volume>, DockerError>;
    async fn create_volume(
        &self,
        options: CreateVolumeOptions<String>,
    ) -> Result<Created, DockerError>;

    async fn list_images(&self, filters: Filters) -> Result<Vec<ImageSummary>, DockerError>;
    fn pull_image(&self, image: &str) -> ImageStream;
    fn build_image<'a>(
        &'a self,
        options: BuildImageOptions<String>,
        context: Vec<u8>,
    ) -> BuildStream<'a>;

    async fn list_containers(&self, filters: Filters)
        -> Result<Vec<ContainerSummary>, DockerError>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError>;
    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<Created, DockerError>;
    async fn start_container(&self, id: &str) -> Result<(), DockerError>;
    async fn stop_container(&self, id: &str, timeout_secs: Option<i64>)
        -> Result<(), DockerError>;
    /// Starts `cmd` inside the container without attaching to its output.
    /// `env` entries are `KEY=value` pairs set for the exec process only.
    async fn exec_detached(
        &self,
        id: &str,
        cmd: Vec<String>,
        env: Vec<String>,
    ) -> Result<(), DockerError>;
    fn logs(&self, id: &str, options: LogsOptions<String>) -> LogStream;

    async fn version(&self) -> Result<Version, DockerError>;
    /// API version the client negotiated with the daemon.
    fn client_version(&self) -> String;
}

/// `Engine` backed by a negotiated bollard client.
#[derive(Clone)]
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl Engine for BollardEngine {
    async fn list_networks(&self, filters: Filters) -> Result<Vec<Network>, DockerError> {
        self.docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await
    }

    async fn create_network(
        &self,
        options: CreateNetworkOptions<String>,
    ) -> Result<Created, DockerError> {
        let response = self.docker.create_network(options).await?;
        // Both fields are plain strings on newer API schemas and optional on older ones.
        let id: Option<String> = response.id.into();
        let warning: Option<String> = response.warning.into();
        Ok(Created {
            id: id.unwrap_or_default(),
            warnings: warning.into_iter().filter(|w| !w.is_empty()).collect(),
        })
    }

    async fn list_volumes(&self, filters: Filters) -> Result<Vec<Volume>, DockerError> {
        let response = self
            .docker
            .list_volumes(Some(ListVolumesOptions { filters }))
            .await?;
        Ok(response.volumes.unwrap_or_default())
    }

    async fn create_volume(
        &self,
        options: CreateVolumeOptions<String>,
    ) -> Result<Created, DockerError> {
        let volume = self.docker.create_volume(options).await?;
        Ok(Created {
            id: volume.name,
            warnings: Vec::new(),
        })
    }

    async fn list_images(&self, filters: Filters) -> Result<Vec<ImageSummary>, DockerError> {
        self.docker
            .list_images(Some(ListImagesOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await
    }

    fn pull_image(&self, image: &str) -> ImageStream {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        Box::pin(self.docker.create_image(Some(options), None, None))
    }

    fn build_image<'a>(
        &'a self,
        options: BuildImageOptions<String>,
        context: Vec<u8>,
    ) -> BuildStream<'a> {
        Box::pin(self.docker.build_image(options, None, Some(context.into())))
    }

    async fn list_containers(
        &self,
        filters: Filters,
    ) -> Result<Vec<ContainerSummary>, DockerError> {
        self.docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<Created, DockerError> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let response = self.docker.create_container(Some(options), config).await?;
        Ok(Created {
            id: response.id,
            warnings: response.warnings,
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: Option<i64>,
    ) -> Result<(), DockerError> {
        let options = timeout_secs.map(|t| StopContainerOptions { t });
        self.docker.stop_container(id, options).await
    }

    async fn exec_detached(
        &self,
        id: &str,
        cmd: Vec<String>,
        env: Vec<String>,
    ) -> Result<(), DockerError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    env: (!env.is_empty()).then_some(env),
                    attach_stdout: Some(false),
                    attach_stderr: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        self.docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: true,
                    ..Default::default()
                }),
            )
            .await
            .map(|_| ())
    }

    fn logs(&self, id: &str, options: LogsOptions<String>) -> LogStream {
        Box::pin(self.docker.logs(id, Some(options)))
    }

    async fn version(&self) -> Result<Version, DockerError> {
        self.docker.version().await
    }

    fn client_version(&self) -> String {
        self.docker.client_version().to_string()
    }
}
