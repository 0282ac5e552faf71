use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs as async_fs;

use crate::models::errors::AppError;

const WORKSPACE_PREFIX: &str = "latexwork_";

/// Request-exclusive scratch directory.
///
/// The directory is removed exactly once: by [`Workspace::destroy`] on the
/// normal path, or by `Drop` when the request unwinds, errors out or is
/// cancelled. Removal failures are logged and never surface to the caller.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Allocate a fresh uniquely-named directory under `root`
    pub fn create(root: &Path) -> Result<Self, AppError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|e| AppError::internal_error(format!("Failed to create workspace: {}", e)))?;

        // Resolved so containment checks compare like with like.
        let path = dir
            .path()
            .canonicalize()
            .map_err(|e| AppError::internal_error(format!("Failed to resolve workspace: {}", e)))?;

        tracing::debug!("Created workspace {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` to a file directly inside the workspace
    pub async fn write_file(&self, name: &str, data: &[u8]) -> Result<PathBuf, AppError> {
        let target = self.path.join(name);
        if target.parent() != Some(self.path.as_path()) {
            return Err(AppError::internal_error(format!(
                "Refusing to write {:?} outside the workspace root",
                name
            )));
        }

        async_fs::write(&target, data)
            .await
            .map_err(|e| AppError::internal_error(format!("Failed to write {}: {}", name, e)))?;

        Ok(target)
    }

    /// Remove the directory tree. Never fails.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!("Destroyed workspace {}", self.path.display()),
                Err(e) => tracing::warn!(
                    "Failed to clean up workspace {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
