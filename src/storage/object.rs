use super::{validate_key, StorageBackend, StorageError, StorageResult};
use crate::config::ObjectStorageConfig;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStoreExt, PutPayload};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Object storage backend over any `object_store` implementation
pub struct ObjectStorage {
    name: String,
    store: Arc<dyn object_store::ObjectStore>,
    prefix: Option<String>,
    /// Prepended to the object key to build the reported location
    location_base: String,
}

impl ObjectStorage {
    pub fn new(
        name: &str,
        store: Arc<dyn object_store::ObjectStore>,
        location_base: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            store,
            prefix: None,
            location_base: location_base.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// S3 (or S3-compatible) bucket; credentials come from the environment
    pub fn s3(config: &ObjectStorageConfig) -> StorageResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Config("bucket not configured".to_string()));
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(config.bucket.clone());
        if !config.region.is_empty() {
            builder = builder.with_region(config.region.clone());
        }
        if let Some(ref endpoint) = config.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let storage = Self::new("s3", Arc::new(store), format!("s3://{}", config.bucket));
        Ok(match config.prefix {
            Some(ref prefix) => storage.with_prefix(prefix.clone()),
            None => storage,
        })
    }

    fn object_key(&self, filename: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}/{}", prefix, filename),
            None => filename.to_string(),
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn persist(&self, filename: &str, payload: Bytes) -> StorageResult<String> {
        validate_key(filename)?;
        let key = self.object_key(filename);
        let size = payload.len();
        let start = Instant::now();

        self.store
            .put(&Path::from(key.clone()), PutPayload::from(payload))
            .await
            .map_err(|e| {
                error!(
                    backend = %self.name,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    error = %e,
                    "Object upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        info!(
            backend = %self.name,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object upload successful"
        );

        Ok(format!("{}/{}", self.location_base.trim_end_matches('/'), key))
    }
}
