use super::{validate_key, DirectoryCache, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Local filesystem backend
#[derive(Debug)]
pub struct LocalStorage {
    name: String,
    base_path: PathBuf,
    dirs: DirectoryCache,
}

impl LocalStorage {
    /// Create a backend rooted at `base_path`, creating the directory
    pub async fn new(name: &str, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let dirs = DirectoryCache::new();
        dirs.remember(base_path.clone());

        Ok(Self {
            name: name.to_string(),
            base_path,
            dirs,
        })
    }

    async fn write_file(&self, path: &Path, payload: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            self.dirs.ensure(parent).await?;
        }

        let mut file = fs::File::create(path).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn persist(&self, filename: &str, payload: Bytes) -> StorageResult<String> {
        validate_key(filename)?;
        let path = self.base_path.join(filename);

        self.write_file(&path, &payload).await.map_err(|e| {
            error!(
                backend = %self.name,
                path = %path.display(),
                error = %e,
                "Local write failed"
            );
            StorageError::UploadFailed(format!("{}: {}", path.display(), e))
        })?;

        debug!(
            backend = %self.name,
            path = %path.display(),
            size_bytes = payload.len(),
            "Variant written"
        );

        Ok(path.display().to_string())
    }
}
