//! # Storage Module
//!
//! Questo modulo definisce i backend di destinazione delle varianti e il
//! dispatcher che li alimenta in fan-out.
//!
//! ## Responsabilità:
//! - `StorageBackend`: contratto minimo `persist(filename, payload) -> location`
//! - `LocalStorage`: scrittura su filesystem locale
//! - `ObjectStorage`: scrittura su object storage (S3 o compatibili)
//! - `StorageDispatcher`: tenta ogni backend in modo indipendente
//! - `DirectoryCache`: memo delle directory già create, posseduto dal backend
//!
//! ## Politica sugli errori:
//! Un `StorageError` resta confinato al backend che l'ha prodotto e finisce
//! nel report come descrizione testuale. Gli altri backend procedono.

pub mod dispatcher;
pub mod local;
pub mod object;

pub use dispatcher::StorageDispatcher;
pub use local::LocalStorage;
pub use object::ObjectStorage;

use crate::config::Config;
use crate::error::ProcessError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A destination for variant payloads.
///
/// Implementations only report success (with a location) or failure; retries
/// and wire protocol details stay inside the backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name used as key in the processing result
    fn name(&self) -> &str;

    /// Persist `payload` under the relative `filename`, returning its location
    async fn persist(&self, filename: &str, payload: Bytes) -> StorageResult<String>;
}

/// Reject keys that could escape a backend's root
pub fn validate_key(filename: &str) -> StorageResult<()> {
    if filename.trim().is_empty() {
        return Err(StorageError::InvalidKey("empty filename".to_string()));
    }

    let path = Path::new(filename);
    let escapes = path.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || filename.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "'{}' must be a relative path without '..'",
            filename
        )));
    }

    Ok(())
}

/// Directories already known to exist.
///
/// Owned by a backend instance; each backend keeps its own memo.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    created: Mutex<HashSet<PathBuf>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_known(&self, dir: &Path) -> bool {
        self.created
            .lock()
            .map(|created| created.contains(dir))
            .unwrap_or(false)
    }

    fn remember(&self, dir: PathBuf) {
        if let Ok(mut created) = self.created.lock() {
            created.insert(dir);
        }
    }

    /// Create `dir` (and parents) unless already done by this cache
    pub async fn ensure(&self, dir: &Path) -> StorageResult<()> {
        if self.is_known(dir) {
            return Ok(());
        }

        fs::create_dir_all(dir).await?;
        self.remember(dir.to_path_buf());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.created.lock().map(|created| created.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the enabled backends described by `config`
pub async fn backends_from_config(
    config: &Config,
) -> Result<Vec<Arc<dyn StorageBackend>>, ProcessError> {
    let mut backends: Vec<Arc<dyn StorageBackend>> = Vec::new();

    if config.local.enabled {
        let local = LocalStorage::new("local", &config.local.base_path)
            .await
            .map_err(|e| ProcessError::config(format!("Local storage: {}", e)))?;
        backends.push(Arc::new(local));
    }

    if config.object_storage.enabled {
        let object = ObjectStorage::s3(&config.object_storage)
            .map_err(|e| ProcessError::config(format!("Object storage: {}", e)))?;
        backends.push(Arc::new(object));
    }

    Ok(backends)
}
