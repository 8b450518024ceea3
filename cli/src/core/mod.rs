//! # Oblivion Core Infrastructure
//!
//! File: cli/src/core/mod.rs
//!
//! ## Overview
//!
//! Foundational pieces used by every command:
//! - `config`: loading, defaulting and validating `~/.oblivion.toml`
//! - `error`: error types and the crate-wide `Result`
//! - `templating`: Tera rendering for generated files (pgbouncer SQL, user list)
//! - `resources`: the dependency bundle handed to each command (engine,
//!   secret resolver, network registry, cancellation token)
//!
//! ## Usage
//!
//! ```rust
//! use crate::core::config::Config;
//! use crate::core::error::{OblivionError, Result};
//! use crate::core::resources::Resources;
//! ```
//!
pub mod config;
pub mod error;
pub mod resources;
pub mod templating;
