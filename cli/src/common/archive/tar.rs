//! # Build Context Packaging (`common::archive::tar`)
//!
//! File: cli/src/common/archive/tar.rs
//!
//! ## Overview
//!
//! Turns a file tree into the gzipped tarball the engine expects as an image
//! build context. The tree is virtual (`VirtualTree`): it is either the set of
//! files compiled into the binary (the static file server's nginx build) or a
//! snapshot of a directory on disk.
//!
//! ## Architecture
//!
//! - `package_context(tree, root)` archives every file under `root`, with paths
//!   made relative to `root`. Files outside `root` are not part of the context.
//! - Each entry keeps the source file's size, mode and modification time.
//! - Any failure (an unreadable file while snapshotting, a path that cannot be
//!   made relative, an archive write error) aborts and returns no bytes at all.
//!   The archive is assembled in memory and only handed out once complete.
//! - `tar` writes the entries, `flate2` gzips them.
//!
//! ## Usage
//!
//! ```rust
//! let tree = VirtualTree::embedded_static();
//! let context = package_context(&tree, Path::new("static"))?;
//! ```
//!
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;

/// One regular file of a `VirtualTree`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub path: PathBuf,
    pub data: Vec<u8>,
    pub mode: u32,
    /// Seconds since the Unix epoch.
    pub mtime: u64,
}

/// An in-memory file tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualTree {
    files: Vec<VirtualFile>,
}

impl VirtualTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>, mode: u32, mtime: u64) {
        self.files.push(VirtualFile {
            path: path.into(),
            data: data.into(),
            mode,
            mtime,
        });
    }

    pub fn files(&self) -> &[VirtualFile] {
        &self.files
    }

    /// The nginx build shipped inside the binary, rooted at `static/`.
    pub fn embedded_static() -> Self {
        let mut tree = Self::new();
        tree.add(
            "static/nginx.Dockerfile",
            include_bytes!("../../../assets/static/nginx.Dockerfile").as_slice(),
            0o644,
            0,
        );
        tree.add(
            "static/nginx.conf",
            include_bytes!("../../../assets/static/nginx.conf").as_slice(),
            0o644,
            0,
        );
        tree
    }

    /// Snapshots the regular files below `dir`, with paths relative to `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut tree = Self::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("Failed to read build context '{}'", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .with_context(|| format!("Failed to relativize '{}'", entry.path().display()))?;
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to stat '{}'", entry.path().display()))?;
            let data = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read '{}'", entry.path().display()))?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            tree.add(relative, data, file_mode(&metadata), mtime);
        }
        Ok(tree)
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Path of `path` relative to `root`, if it lies under it.
///
/// Returns `Err` for entries under `root` whose relative form is not a plain
/// sequence of names (`..`, absolute or empty).
fn relative_entry_path(path: &Path, root: &Path) -> Result<Option<PathBuf>> {
    let Ok(relative) = path.strip_prefix(root) else {
        return Ok(None);
    };
    let clean = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.as_os_str().is_empty() || !clean {
        return Err(anyhow!(OblivionError::BuildContext(format!(
            "cannot make '{}' relative to '{}'",
            path.display(),
            root.display()
        ))));
    }
    Ok(Some(relative.to_path_buf()))
}

/// Packages the files of `tree` under `root` as a gzipped tar build context.
pub fn package_context(tree: &VirtualTree, root: &Path) -> Result<Vec<u8>> {
    let mut tar_gz_bytes = Vec::new();
    let encoder = flate2::write::GzEncoder::new(&mut tar_gz_bytes, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut count = 0usize;

    for file in tree.files() {
        let Some(relative) = relative_entry_path(&file.path, root)? else {
            continue;
        };
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(file.data.len() as u64);
        header.set_mode(file.mode);
        header.set_mtime(file.mtime);
        // append_data writes the path and computes the checksum.
        builder
            .append_data(&mut header, &relative, file.data.as_slice())
            .with_context(|| format!("Failed to add '{}' to build context", relative.display()))?;
        count += 1;
    }

    if count == 0 {
        return Err(anyhow!(OblivionError::BuildContext(format!(
            "no files under '{}'",
            root.display()
        ))));
    }

    let encoder = builder
        .into_inner()
        .context("Failed to finalize tar archive structure")?;
    encoder
        .finish()
        .context("Failed to finish gzip compression stream")?;

    debug!("Packaged {} files from '{}'", count, root.display());
    Ok(tar_gz_bytes)
}
