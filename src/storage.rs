//! Recording artifact storage.
//!
//! Defines the opaque object-store seam used to persist finished audio
//! artifacts, plus a local-directory implementation that keeps recordings
//! under `~/.aegis/recordings/`.

use crate::config::aegis_dir;
use crate::error::{SosError, SosResult};
use async_trait::async_trait;
use std::path::PathBuf;

/// A finished capture artifact, held in memory only between the end of a
/// capture session and its upload.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    /// Target file name, e.g. `sos-recording-<uuid>.webm`.
    pub file_name: String,
    /// Concatenated capture chunks.
    pub bytes: Vec<u8>,
}

impl AudioArtifact {
    pub fn new(file_name: String, bytes: Vec<u8>) -> Self {
        Self { file_name, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Opaque artifact upload returning a durable URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, artifact: &AudioArtifact) -> SosResult<String>;
}

/// Object store backed by a local directory.
///
/// The durable URL is a `file://` reference to the written file.
pub struct LocalDirStore {
    dir: PathBuf,
}

impl LocalDirStore {
    /// Store rooted at the default recordings directory.
    pub fn new() -> Self {
        Self {
            dir: aegis_dir().join("recordings"),
        }
    }

    /// Store rooted at a specific directory (tests, custom layouts).
    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl Default for LocalDirStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn upload(&self, artifact: &AudioArtifact) -> SosResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SosError::Transport(format!("Failed to create recordings dir: {}", e)))?;

        let path = self.dir.join(&artifact.file_name);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| SosError::Transport(format!("Failed to write recording: {}", e)))?;

        tracing::info!(
            "Recording stored: {} ({} bytes)",
            path.display(),
            artifact.len()
        );
        Ok(format!("file://{}", path.display()))
    }
}
