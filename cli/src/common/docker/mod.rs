//! # Oblivion Docker Module Interface
//!
//! File: cli/src/common/docker/mod.rs
//!
//! ## Overview
//!
//! The container resource orchestrator: everything between a service's
//! `up` routine and the Docker engine.
//!
//! ## Architecture
//!
//! - **`engine`**: the `Engine` trait every engine call goes through, and its
//!   bollard-backed implementation.
//! - **`connect`**: opens and version-negotiates the one engine client.
//! - **`state`**: read-only existence checks per resource kind, plus the
//!   explicit "start it if stopped" repair.
//! - **`ensure`**: create-if-absent for networks, volumes, images and
//!   containers, tolerant of concurrent creators.
//! - **`images`**: pull with progress, build from a packaged context.
//! - **`health`**: health-check specs and the bounded, cancellable poller.
//! - **`logs`**: labeled stdout/stderr log following as a background task.
//! - **`network`**: name to id registry for attaching containers to networks.
//! - **`lifecycle`**: ordered bring-up of one container, exec and stop.
//!
//! ## Usage
//!
//! ```rust
//! use crate::common::docker::lifecycle::{bring_up, ContainerSpec};
//!
//! let spec = ContainerSpec::new("cansu.dev-uptime-kuma", "louislam/uptime-kuma:1");
//! let up = bring_up(&res, &spec).await?;
//! ```
//!
pub mod connect;
pub mod engine;
pub mod ensure;
pub mod health;
pub mod images;
pub mod lifecycle;
pub mod logs;
pub mod network;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;
