//! Output directory lifecycle for a pipeline run.
//!
//! The pipeline owns a single output root holding the `sfm/` working
//! directory and the `model/` directory. Creation is idempotent; removal is
//! destructive and only ever happens behind the `force_overwrite` flag.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

/// Create a directory (and its parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))
}

/// Remove a directory tree. A missing tree is not an error.
pub fn clear_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!("removed existing output tree {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove output tree {}", path.display()))
        }
    }
}
