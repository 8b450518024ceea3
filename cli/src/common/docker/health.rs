//! # Health-Check Polling (`common::docker::health`)
//!
//! File: cli/src/common/docker/health.rs
//!
//! ## Overview
//!
//! Blocks a bring-up until a container reports `healthy`, or gives up.
//!
//! A `HealthCheckSpec` is a static per-service definition. The same value is
//! converted into the engine's `HealthConfig` at container creation and drives
//! the poller's schedule here, so the two cannot drift apart.
//!
//! ## Poll loop
//!
//! ```text
//!  Polling --inspect: healthy--------------------------> Healthy
//!     |--elapsed > interval * retries-----------------> Failed(Timeout)
//!     |--retries used up------------------------------> Failed(Exhausted)
//!     |--cancellation token fired---------------------> Failed(Cancelled)
//!     '--otherwise: sleep interval, loop
//! ```
//!
//! Sleeping uses `tokio::time`, so tests drive the schedule with a paused clock.
//!
use super::engine::{DockerError, Engine};
use super::state::ContainerHandle;
use bollard::models::{HealthConfig, HealthStatusEnum};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Probe command and schedule shared by container creation and the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub test: &'static [&'static str],
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

/// `pg_isready` every 10s, 5 attempts.
pub const POSTGRES_HEALTHCHECK: HealthCheckSpec = HealthCheckSpec {
    test: &["CMD-SHELL", "pg_isready"],
    interval: Duration::from_secs(10),
    timeout: Duration::from_secs(5),
    retries: 5,
};

/// HTTP probe against the file server every 5s, 10 attempts.
pub const NGINX_HEALTHCHECK: HealthCheckSpec = HealthCheckSpec {
    test: &["CMD-SHELL", "wget -O /dev/null http://localhost || exit 1"],
    interval: Duration::from_secs(5),
    timeout: Duration::from_secs(10),
    retries: 10,
};

impl HealthCheckSpec {
    pub fn validate(&self) -> Result<(), HealthError> {
        if self.retries == 0 {
            return Err(HealthError::InvalidSpec("retries must be > 0".into()));
        }
        if self.interval.is_zero() {
            return Err(HealthError::InvalidSpec("interval must be > 0".into()));
        }
        if self.test.is_empty() {
            return Err(HealthError::InvalidSpec("probe command is empty".into()));
        }
        Ok(())
    }

    /// Wall-clock budget for the whole poll loop.
    pub fn deadline(&self) -> Duration {
        self.interval * self.retries
    }

    /// Engine representation; durations are nanoseconds.
    pub fn to_bollard(&self) -> HealthConfig {
        HealthConfig {
            test: Some(self.test.iter().map(|s| s.to_string()).collect()),
            interval: Some(self.interval.as_nanos() as i64),
            timeout: Some(self.timeout.as_nanos() as i64),
            retries: Some(i64::from(self.retries)),
            ..Default::default()
        }
    }
}

/// Terminal failures of the poller.
#[derive(Error, Debug)]
pub enum HealthError {
    #[error("missing health check configuration for container '{0}'")]
    MissingConfig(String),

    #[error("invalid health check configuration: {0}")]
    InvalidSpec(String),

    #[error("container '{name}' did not become healthy within {elapsed:?} (budget {budget:?}); health check schedule does not fit the poll window")]
    Timeout {
        name: String,
        elapsed: Duration,
        budget: Duration,
    },

    #[error("container '{name}' never reported healthy after {retries} health checks")]
    Exhausted { name: String, retries: u32 },

    #[error("health wait for container '{0}' was cancelled")]
    Cancelled(String),

    #[error("failed to inspect container '{name}': {source}")]
    Engine {
        name: String,
        #[source]
        source: DockerError,
    },
}

/// Poller states. `Healthy` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Healthy,
    Failed,
}

async fn is_healthy(engine: &dyn Engine, handle: &ContainerHandle) -> Result<bool, HealthError> {
    let response = engine
        .inspect_container(&handle.id)
        .await
        .map_err(|source| HealthError::Engine {
            name: handle.name.clone(),
            source,
        })?;
    let status = response
        .state
        .and_then(|s| s.health)
        .and_then(|h| h.status);
    debug!("Health of '{}': {:?}", handle.name, status);
    Ok(status == Some(HealthStatusEnum::HEALTHY))
}

/// Waits until `handle` reports healthy.
///
/// Returns on the first healthy inspect. Fails with `Timeout` once elapsed time
/// passes `interval * retries`, with `Exhausted` after `retries` unhealthy
/// inspects, and with `Cancelled` as soon as `cancel` fires.
#[instrument(skip(engine, handle, spec, cancel), fields(container = %handle.name))]
pub async fn wait_healthy(
    engine: &dyn Engine,
    handle: &ContainerHandle,
    spec: Option<&HealthCheckSpec>,
    cancel: &CancellationToken,
) -> Result<(), HealthError> {
    let spec = spec.ok_or_else(|| HealthError::MissingConfig(handle.name.clone()))?;
    spec.validate()?;

    let budget = spec.deadline();
    let started = Instant::now();
    let mut state = PollState::Polling;
    let mut remaining = spec.retries;
    info!("Waiting for '{}' to become healthy", handle.name);

    while state == PollState::Polling && remaining > 0 {
        let healthy = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HealthError::Cancelled(handle.name.clone())),
            result = is_healthy(engine, handle) => result?,
        };
        if healthy {
            state = PollState::Healthy;
            continue;
        }

        let elapsed = started.elapsed();
        if elapsed > budget {
            warn!("'{}' still unhealthy after {:?}", handle.name, elapsed);
            return Err(HealthError::Timeout {
                name: handle.name.clone(),
                elapsed,
                budget,
            });
        }

        remaining -= 1;
        if remaining == 0 {
            state = PollState::Failed;
            continue;
        }
        debug!(
            "'{}' not healthy yet, {} checks left, sleeping {:?}",
            handle.name, remaining, spec.interval
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HealthError::Cancelled(handle.name.clone())),
            _ = tokio::time::sleep(spec.interval) => {}
        }
    }

    match state {
        PollState::Healthy => {
            info!("'{}' is healthy", handle.name);
            Ok(())
        }
        _ => Err(HealthError::Exhausted {
            name: handle.name.clone(),
            retries: spec.retries,
        }),
    }
}
