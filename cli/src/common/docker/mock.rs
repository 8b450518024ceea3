//! Recording in-memory `Engine` for unit tests.
//!
//! Behaves like a tiny Docker daemon: names are unique, duplicate creates of
//! networks and containers answer 409, unknown containers answer 404, and list
//! filters match by substring the way the engine's `name` filter does. Every
//! call is appended to a log so tests can assert on ordering.

use super::engine::{
    BuildStream, Created, DockerError, Engine, Filters, ImageStream, LogStream,
};
use async_trait::async_trait;
use bollard::container::{Config, LogOutput, LogsOptions};
use bollard::image::BuildImageOptions;
use bollard::models::{
    BuildInfo, ContainerInspectResponse, ContainerState, ContainerSummary, CreateImageInfo,
    Health, HealthStatusEnum, ImageSummary, Network, Volume,
};
use bollard::network::CreateNetworkOptions;
use bollard::system::Version;
use bollard::volume::CreateVolumeOptions;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub config: Option<Config<String>>,
}

#[derive(Debug, Clone)]
pub struct MockExec {
    pub id: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
}

#[derive(Default)]
struct State {
    networks: Vec<Network>,
    volumes: Vec<Volume>,
    images: Vec<String>,
    /// (tag, `repo@sha256:..` digest) pairs.
    digests: Vec<(String, String)>,
    containers: Vec<MockContainer>,
    next_id: u64,
    calls: Vec<String>,
    health_script: VecDeque<HealthStatusEnum>,
    execs: Vec<MockExec>,
    build_contexts: Vec<(String, Vec<u8>)>,
}

#[derive(Default)]
pub struct MockEngine {
    state: Mutex<State>,
    log_stream: Mutex<Option<LogStream>>,
    /// Yield after listing, so concurrent callers both observe the pre-create state.
    yield_after_list: bool,
    /// Simulated latency of each inspect call.
    inspect_delay: Duration,
}

fn conflict(what: &str, name: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code: 409,
        message: format!("{} with name {} already exists", what, name),
    }
}

fn not_found(name: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code: 404,
        message: format!("No such container: {}", name),
    }
}

fn matches_name(filters: &Filters, name: &str) -> bool {
    match filters.get("name") {
        Some(values) => values.iter().any(|v| name.contains(v.as_str())),
        None => true,
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn racing() -> Self {
        Self {
            yield_after_list: true,
            ..Self::default()
        }
    }

    pub fn with_inspect_delay(delay: Duration) -> Self {
        Self {
            inspect_delay: delay,
            ..Self::default()
        }
    }

    fn next_id(state: &mut State, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}{:04}", prefix, state.next_id)
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn add_network(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state, "net");
        state.networks.push(Network {
            name: Some(name.to_string()),
            id: Some(id.clone()),
            ..Default::default()
        });
        id
    }

    /// Drops `name` as if it were removed outside this process.
    pub fn remove_network(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.networks.retain(|n| n.name.as_deref() != Some(name));
    }

    pub fn add_image(&self, reference: &str) {
        self.state.lock().unwrap().images.push(reference.to_string());
    }

    pub fn add_image_with_digest(&self, reference: &str, digest: &str) {
        let mut state = self.state.lock().unwrap();
        state.images.push(reference.to_string());
        state
            .digests
            .push((reference.to_string(), digest.to_string()));
    }

    pub fn add_container(&self, name: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state, "ctr");
        state.containers.push(MockContainer {
            id: id.clone(),
            name: name.to_string(),
            running,
            config: None,
        });
        id
    }

    pub fn networks(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.networks.iter().filter_map(|n| n.name.clone()).collect()
    }

    pub fn volumes(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.volumes.iter().map(|v| v.name.clone()).collect()
    }

    pub fn images(&self) -> Vec<String> {
        self.state.lock().unwrap().images.clone()
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        let state = self.state.lock().unwrap();
        state.containers.iter().find(|c| c.name == name).cloned()
    }

    pub fn execs(&self) -> Vec<MockExec> {
        self.state.lock().unwrap().execs.clone()
    }

    pub fn build_contexts(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().unwrap().build_contexts.clone()
    }

    /// Health statuses returned by successive inspects; the last one repeats.
    pub fn script_health(&self, statuses: &[HealthStatusEnum]) {
        self.state.lock().unwrap().health_script = statuses.iter().copied().collect();
    }

    pub fn set_log_stream(&self, stream: LogStream) {
        *self.log_stream.lock().unwrap() = Some(stream);
    }

    fn next_health(state: &mut State) -> Option<HealthStatusEnum> {
        if state.health_script.len() > 1 {
            state.health_script.pop_front()
        } else {
            state.health_script.front().copied()
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn list_networks(&self, filters: Filters) -> Result<Vec<Network>, DockerError> {
        self.record("list_networks".into());
        let found: Vec<Network> = {
            let state = self.state.lock().unwrap();
            state
                .networks
                .iter()
                .filter(|n| matches_name(&filters, n.name.as_deref().unwrap_or_default()))
                .cloned()
                .collect()
        };
        if self.yield_after_list {
            tokio::task::yield_now().await;
        }
        Ok(found)
    }

    async fn create_network(
        &self,
        options: CreateNetworkOptions<String>,
    ) -> Result<Created, DockerError> {
        self.record(format!("create_network:{}", options.name));
        let mut state = self.state.lock().unwrap();
        if state
            .networks
            .iter()
            .any(|n| n.name.as_deref() == Some(options.name.as_str()))
        {
            return Err(conflict("network", &options.name));
        }
        let id = Self::next_id(&mut state, "net");
        state.networks.push(Network {
            name: Some(options.name.clone()),
            id: Some(id.clone()),
            driver: Some(options.driver.clone()),
            ..Default::default()
        });
        Ok(Created {
            id,
            warnings: vec!["mock network warning".into()],
        })
    }

    async fn list_volumes(&self, filters: Filters) -> Result<Vec<Volume>, DockerError> {
        self.record("list_volumes".into());
        let found: Vec<Volume> = {
            let state = self.state.lock().unwrap();
            state
                .volumes
                .iter()
                .filter(|v| matches_name(&filters, &v.name))
                .cloned()
                .collect()
        };
        if self.yield_after_list {
            tokio::task::yield_now().await;
        }
        Ok(found)
    }

    async fn create_volume(
        &self,
        options: CreateVolumeOptions<String>,
    ) -> Result<Created, DockerError> {
        self.record(format!("create_volume:{}", options.name));
        let mut state = self.state.lock().unwrap();
        // Docker answers an existing volume name with the existing volume.
        if !state.volumes.iter().any(|v| v.name == options.name) {
            state.volumes.push(Volume {
                name: options.name.clone(),
                ..Default::default()
            });
        }
        Ok(Created {
            id: options.name,
            warnings: Vec::new(),
        })
    }

    /// The engine's `reference` filter is a loose pattern match, so the mock
    /// ignores it and returns every image; callers must do exact matching.
    async fn list_images(&self, _filters: Filters) -> Result<Vec<ImageSummary>, DockerError> {
        self.record("list_images".into());
        let state = self.state.lock().unwrap();
        Ok(state
            .images
            .iter()
            .map(|i| ImageSummary {
                id: format!("sha256:{}", i),
                repo_tags: vec![i.clone()],
                repo_digests: state
                    .digests
                    .iter()
                    .filter(|(tag, _)| tag == i)
                    .map(|(_, digest)| digest.clone())
                    .collect(),
                ..Default::default()
            })
            .collect())
    }

    fn pull_image(&self, image: &str) -> ImageStream {
        self.record(format!("pull_image:{}", image));
        self.add_image(image);
        let events = vec![
            Ok(CreateImageInfo {
                status: Some(format!("Pulling from {}", image)),
                ..Default::default()
            }),
            Ok(CreateImageInfo {
                id: Some("layer1".into()),
                status: Some("Pull complete".into()),
                ..Default::default()
            }),
        ];
        stream::iter(events).boxed()
    }

    fn build_image<'a>(
        &'a self,
        options: BuildImageOptions<String>,
        context: Vec<u8>,
    ) -> BuildStream<'a> {
        self.record(format!("build_image:{}", options.t));
        {
            let mut state = self.state.lock().unwrap();
            state.images.push(options.t.clone());
            state.build_contexts.push((options.t.clone(), context));
        }
        let events = vec![Ok(BuildInfo {
            stream: Some("Step 1/2 : FROM nginx\n".into()),
            ..Default::default()
        })];
        stream::iter(events).boxed()
    }

    async fn list_containers(
        &self,
        filters: Filters,
    ) -> Result<Vec<ContainerSummary>, DockerError> {
        self.record("list_containers".into());
        let found: Vec<ContainerSummary> = {
            let state = self.state.lock().unwrap();
            state
                .containers
                .iter()
                .filter(|c| matches_name(&filters, &c.name))
                .map(|c| ContainerSummary {
                    id: Some(c.id.clone()),
                    names: Some(vec![format!("/{}", c.name)]),
                    ..Default::default()
                })
                .collect()
        };
        if self.yield_after_list {
            tokio::task::yield_now().await;
        }
        Ok(found)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        self.record(format!("inspect_container:{}", id));
        if !self.inspect_delay.is_zero() {
            tokio::time::sleep(self.inspect_delay).await;
        }
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter()
            .find(|c| c.id == id || c.name == id)
            .cloned()
            .ok_or_else(|| not_found(id))?;
        let health = Self::next_health(&mut state).map(|status| Health {
            status: Some(status),
            ..Default::default()
        });
        Ok(ContainerInspectResponse {
            id: Some(container.id.clone()),
            name: Some(format!("/{}", container.name)),
            state: Some(ContainerState {
                running: Some(container.running),
                health,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<Created, DockerError> {
        self.record(format!("create_container:{}", name));
        let mut state = self.state.lock().unwrap();
        if state.containers.iter().any(|c| c.name == name) {
            return Err(conflict("container", name));
        }
        let id = Self::next_id(&mut state, "ctr");
        state.containers.push(MockContainer {
            id: id.clone(),
            name: name.to_string(),
            running: false,
            config: Some(config),
        });
        Ok(Created {
            id,
            warnings: Vec::new(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.record(format!("start_container:{}", id));
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id || c.name == id)
            .ok_or_else(|| not_found(id))?;
        if container.running {
            return Err(DockerError::DockerResponseServerError {
                status_code: 304,
                message: String::new(),
            });
        }
        container.running = true;
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &str,
        _timeout_secs: Option<i64>,
    ) -> Result<(), DockerError> {
        self.record(format!("stop_container:{}", id));
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id || c.name == id)
            .ok_or_else(|| not_found(id))?;
        if !container.running {
            return Err(DockerError::DockerResponseServerError {
                status_code: 304,
                message: String::new(),
            });
        }
        container.running = false;
        Ok(())
    }

    async fn exec_detached(
        &self,
        id: &str,
        cmd: Vec<String>,
        env: Vec<String>,
    ) -> Result<(), DockerError> {
        self.record(format!("exec:{}", id));
        self.state.lock().unwrap().execs.push(MockExec {
            id: id.to_string(),
            cmd,
            env,
        });
        Ok(())
    }

    fn logs(&self, id: &str, _options: LogsOptions<String>) -> LogStream {
        self.record(format!("logs:{}", id));
        match self.log_stream.lock().unwrap().take() {
            Some(stream) => stream,
            None => stream::empty::<Result<LogOutput, DockerError>>().boxed(),
        }
    }

    async fn version(&self) -> Result<Version, DockerError> {
        Ok(Version {
            version: Some("27.3.1".into()),
            api_version: Some("1.47".into()),
            ..Default::default()
        })
    }

    fn client_version(&self) -> String {
        "1.47".into()
    }
}
