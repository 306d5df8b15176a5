//! Artifact persistence.
//!
//! Every `put` mints a fresh key (`<job_id>-<nonce>.zip`), so two builds of
//! the same job id never share storage and deleting an old build's artifact
//! cannot touch a newer one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sitepress_core::job::ArtifactHandle;
use tokio::sync::RwLock;

use crate::error::ArtifactError;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a packaged build and return its handle.
    async fn put(&self, job_id: &str, bytes: Vec<u8>) -> Result<ArtifactHandle, ArtifactError>;

    /// Read an artifact back. `Ok(None)` if it no longer exists.
    async fn read(&self, handle: &ArtifactHandle) -> Result<Option<Vec<u8>>, ArtifactError>;

    /// Remove an artifact. Removing a missing artifact is not an error.
    async fn delete(&self, handle: &ArtifactHandle) -> Result<(), ArtifactError>;
}

fn new_key(job_id: &str) -> String {
    format!("{job_id}-{}.zip", uuid::Uuid::new_v4().simple())
}

/// Write `bytes` to `staging`, then rename it onto `target` so readers never
/// see a half-written archive. The staging file is gone whichever way this
/// returns.
async fn write_via_staging(staging: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let result = match tokio::fs::write(staging, bytes).await {
        Ok(()) => tokio::fs::rename(staging, target).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Stores artifacts as files directly under a root directory.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// The directory is created lazily on first `put`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(ArtifactError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, job_id: &str, bytes: Vec<u8>) -> Result<ArtifactHandle, ArtifactError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let key = new_key(job_id);
        let path = self.path_for(&key)?;
        let staging = self.root.join(format!(".{key}.partial"));
        write_via_staging(&staging, &path, &bytes).await?;

        tracing::debug!(job_id, key = %key, size = bytes.len(), "Artifact stored");
        Ok(ArtifactHandle {
            key,
            size: bytes.len() as u64,
        })
    }

    async fn read(&self, handle: &ArtifactHandle) -> Result<Option<Vec<u8>>, ArtifactError> {
        let path = self.path_for(&handle.key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, handle: &ArtifactHandle) -> Result<(), ArtifactError> {
        let path = self.path_for(&handle.key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key = %handle.key, "Artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps artifacts in process memory. Lost on restart, like job records.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts currently held.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    pub async fn contains(&self, handle: &ArtifactHandle) -> bool {
        self.blobs.read().await.contains_key(&handle.key)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, job_id: &str, bytes: Vec<u8>) -> Result<ArtifactHandle, ArtifactError> {
        let key = new_key(job_id);
        let size = bytes.len() as u64;
        self.blobs.write().await.insert(key.clone(), bytes);
        Ok(ArtifactHandle { key, size })
    }

    async fn read(&self, handle: &ArtifactHandle) -> Result<Option<Vec<u8>>, ArtifactError> {
        Ok(self.blobs.read().await.get(&handle.key).cloned())
    }

    async fn delete(&self, handle: &ArtifactHandle) -> Result<(), ArtifactError> {
        self.blobs.write().await.remove(&handle.key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
