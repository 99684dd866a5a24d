//! Paths produced mid-pipeline that must not outlive their consumer.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Removes the wrapped path when cleaned up or dropped, whichever comes first.
///
/// Removal is best effort: failures are logged and never propagated.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    removed: bool,
}

impl TempArtifact {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the artifact now and logs the outcome.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_file(&self.path) {
            Ok(_) => tracing::info!("Temp file {:?} has been removed", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Temp file {:?} already absent", self.path)
            }
            Err(e) => tracing::warn!("Failed to remove temp file {:?}: {}", self.path, e),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}
