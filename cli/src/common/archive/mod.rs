//! # Oblivion Archive Utilities
//!
//! File: cli/src/common/archive/mod.rs
//!
//! ## Overview
//!
//! Archive handling for image builds. `tar` packages a `VirtualTree` into the
//! gzipped tarball the engine takes as a build context.
//!
pub mod tar;
