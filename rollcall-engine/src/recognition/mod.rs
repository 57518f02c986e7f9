//! Batch face-recognition service integration

pub mod client;
pub mod response;

pub use client::{BatchContext, RecognitionClient};

use rollcall_common::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory holding uploaded images for one batch.
///
/// Dropping the guard removes the directory and every image in it, so
/// cleanup happens on success, failure, and cancellation alike.
pub struct TempImages {
    dir: TempDir,
    paths: Vec<PathBuf>,
}

impl TempImages {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            paths: Vec::new(),
        })
    }

    /// Persist one uploaded image into the scratch directory
    pub async fn add(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        // strip any path components a hostile client might send
        let safe_name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("image_{}.jpg", self.paths.len()));
        let path = self.dir.path().join(safe_name);
        tokio::fs::write(&path, bytes).await?;
        self.paths.push(path);
        Ok(())
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
