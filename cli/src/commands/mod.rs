//! # Oblivion Command Modules
//!
//! File: cli/src/commands/mod.rs
//!
//! ## Overview
//!
//! One module per managed service group. Each defines an `Args` struct, a
//! `Subcommand` enum and a `handle_*` dispatcher that `main.rs` routes to.
//!
//! ## Architecture
//!
//! - The dispatcher connects the `Resources` the group needs. A failure there
//!   (engine unreachable, missing 1Password token, unknown vault) is returned
//!   and makes the process exit non-zero.
//! - The service routine itself (`*_up`) takes `&Resources` so tests can run
//!   it against the mock engine. Its failure is logged at error level by
//!   `report` and does not change the exit status.
//!
//! ## Command Groups
//!
//! - `networks`: shared bridge networks
//! - `postgres`: primary, replica and pgbouncer
//! - `redis`: Dragonfly cache
//! - `kuma`: Uptime Kuma monitor
//! - `static_site`: nginx static file server and upload directory permissions
//! - `observer`: metrics, dashboards and log shipping
//! - `version`: tool and engine versions
//!
use crate::core::error::Result;
use tracing::error;

pub mod kuma;
pub mod networks;
pub mod observer;
pub mod postgres;
pub mod redis;
pub mod static_site;
pub mod version;

/// Logs a failed service routine.
pub(crate) fn report(service: &str, result: Result<()>) {
    if let Err(e) = result {
        error!("{} failed: {:#}", service, e);
    }
}
