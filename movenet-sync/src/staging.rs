//! Scoped per-variant working directories.
//!
//! A [`StagingArea`] owns its directory: it is created empty on
//! [`StagingArea::acquire`] and removed recursively when the value is dropped,
//! on every exit path including cancellation of the owning future.

use std::path::Path;

use tempfile::TempDir;

use movenet_core::VariantName;

use crate::error::SyncError;

#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh, empty directory under `root`.
    ///
    /// The name is `movenet_model_{run_id}_{variant}_<random>`, so concurrent
    /// runs and variants never share a directory.
    pub fn acquire(root: &Path, run_id: &str, variant: &VariantName) -> Result<Self, SyncError> {
        std::fs::create_dir_all(root).map_err(|source| SyncError::Staging {
            path: root.to_path_buf(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("movenet_model_{run_id}_{variant}_"))
            .tempdir_in(root)
            .map_err(|source| SyncError::Staging {
                path: root.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %dir.path().display(), "staging area acquired");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now, reporting any failure.
    pub fn close(self) -> Result<(), SyncError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| SyncError::Staging { path, source })
    }
}
