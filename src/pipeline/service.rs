//! # Variant Service
//!
//! Questo è il modulo che orchestra una richiesta di elaborazione.
//!
//! ## Responsabilità:
//! - Validazione della configurazione alla costruzione (mai per richiesta)
//! - Normalizzazione e validazione delle opzioni della richiesta
//! - Calcolo del fingerprint e lookup in cache
//! - De-duplicazione delle richieste concorrenti con lo stesso fingerprint
//! - Naming delle varianti e fan-out sui backend di storage
//!
//! ## Flusso di esecuzione:
//! 1. **Opzioni**: normalizzazione contro la `Config` (errori `Configuration`)
//! 2. **Sorgente**: rilevamento del media type (errori `ImageProcessing`)
//! 3. **Fingerprint**: hash di contenuto + opzioni canoniche
//! 4. **Cache**: hit → salta la pipeline; miss → pipeline (condivisa tra
//!    richieste concorrenti con lo stesso fingerprint)
//! 5. **Naming**: session id nuova per ogni richiesta, anche su cache hit;
//!    il primo naming riuscito su un set nuovo lo scrive in cache
//! 6. **Fan-out**: ogni backend tentato indipendentemente
//!
//! Gli errori dei passi 1-5 interrompono la richiesta prima di qualsiasi I/O
//! di storage. Gli errori di storage finiscono nel report per-backend.
//!
//! ## Esempio:
//! ```rust,ignore
//! let service = VariantService::new(Config::default()).await?;
//! let result = service.process(bytes, "photo.jpg", &ProcessOptions::default()).await?;
//! println!("{}", result.to_json()?);
//! ```

use crate::cache::{CacheStats, VariantCacheStore};
use crate::codec::{CodecEngine, ImageCodec};
use crate::config::Config;
use crate::error::{CacheError, ProcessError};
use crate::fingerprint::{self, Fingerprint};
use crate::options::{NormalizedOptions, ProcessOptions};
use crate::pipeline::filename_resolver::{FilenameContext, FilenameResolver};
use crate::pipeline::in_flight::InFlightTable;
use crate::pipeline::variant_pipeline::VariantPipeline;
use crate::report::{ProcessingResult, ResultMetadata, RESERVED_KEY};
use crate::source::ImageSource;
use crate::storage::{backends_from_config, StorageBackend, StorageDispatcher};
use crate::utils::format_size;
use crate::variant::ProcessedVariant;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Variant set produced (or loaded) for one fingerprint
///
/// A fresh build is written to the cache by the first caller that names it
/// successfully, so a caller's filename never decides another caller's fate.
#[derive(Debug, Clone)]
struct BuiltVariants {
    variants: Arc<Vec<ProcessedVariant>>,
    cache_hit: bool,
    unsaved: Arc<AtomicBool>,
}

type SharedBuild = Result<BuiltVariants, ProcessError>;

/// Entry point of the library
pub struct VariantService {
    config: Config,
    pipeline: VariantPipeline,
    cache: VariantCacheStore,
    resolver: FilenameResolver,
    dispatcher: StorageDispatcher,
    in_flight: InFlightTable<SharedBuild>,
}

impl VariantService {
    /// Build the service with the pure Rust codec and the configured backends
    pub async fn new(config: Config) -> Result<Self, ProcessError> {
        config.validate()?;
        let backends = backends_from_config(&config).await?;
        Self::with_parts(config, Arc::new(ImageCodec::new()), backends)
    }

    /// Build the service from explicit collaborators
    pub fn with_parts(
        config: Config,
        codec: Arc<dyn CodecEngine>,
        backends: Vec<Arc<dyn StorageBackend>>,
    ) -> Result<Self, ProcessError> {
        config.validate()?;

        let mut names = HashSet::new();
        for backend in &backends {
            if backend.name() == RESERVED_KEY {
                return Err(ProcessError::config(format!(
                    "Storage backend name '{}' is reserved for the result metadata",
                    RESERVED_KEY
                )));
            }
            if !names.insert(backend.name().to_string()) {
                return Err(ProcessError::config(format!(
                    "Duplicate storage backend name: '{}'",
                    backend.name()
                )));
            }
        }

        let cache = if config.cache.enabled {
            VariantCacheStore::new(&config.cache.directory)
        } else {
            VariantCacheStore::disabled(&config.cache.directory)
        };

        let dispatcher = StorageDispatcher::new(backends);
        info!(
            "Variant service ready: {} sizes, cache {}, backends [{}]",
            config.sizes.len(),
            if cache.is_enabled() { "enabled" } else { "disabled" },
            dispatcher.backend_names().join(", ")
        );

        Ok(Self {
            pipeline: VariantPipeline::new(codec),
            cache,
            resolver: FilenameResolver::new(),
            dispatcher,
            in_flight: InFlightTable::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &VariantCacheStore {
        &self.cache
    }

    /// Register a named filename strategy, selectable via `filenameStrategy`
    pub fn register_strategy<F>(&mut self, name: impl Into<String>, strategy: F)
    where
        F: Fn(&FilenameContext<'_>) -> String + Send + Sync + 'static,
    {
        self.resolver.register(name, strategy);
    }

    /// Process a complete payload
    pub async fn process(
        &self,
        source: impl Into<Bytes>,
        original_filename: &str,
        options: &ProcessOptions,
    ) -> Result<ProcessingResult, ProcessError> {
        let normalized = options.normalize(&self.config, &self.resolver)?;
        let source = ImageSource::from_bytes(source)?;
        self.process_source(source, original_filename, &normalized)
            .await
    }

    /// Process a streaming source, read to the end first
    pub async fn process_reader<R>(
        &self,
        reader: R,
        original_filename: &str,
        options: &ProcessOptions,
    ) -> Result<ProcessingResult, ProcessError>
    where
        R: AsyncRead + Unpin,
    {
        let normalized = options.normalize(&self.config, &self.resolver)?;
        let source = ImageSource::from_reader(reader).await?;
        self.process_source(source, original_filename, &normalized)
            .await
    }

    async fn process_source(
        &self,
        source: ImageSource,
        original_filename: &str,
        options: &NormalizedOptions,
    ) -> Result<ProcessingResult, ProcessError> {
        let start = Instant::now();
        let fingerprint = compute_fingerprint(&source, options).await?;
        let session_id = Uuid::new_v4().to_string();
        debug!(
            "Processing '{}' ({}, {}) fingerprint {}",
            original_filename,
            source.mime_type(),
            format_size(source.len() as u64),
            fingerprint
        );

        let built = self
            .in_flight
            .run(&fingerprint, || self.load_or_build(&fingerprint, &source, options))
            .await?;

        let named = self.resolver.resolve(
            &options.filename_strategy,
            original_filename,
            &session_id,
            &built.variants,
        )?;
        if built.unsaved.swap(false, Ordering::AcqRel) {
            self.cache.set(&fingerprint, &built.variants).await;
        }
        let metadata = ResultMetadata::from_named(&named)
            .ok_or_else(|| ProcessError::image("Variant set has no original"))?;

        let backends = self.dispatcher.dispatch(&named).await;
        let failed = backends.values().filter(|o| !o.is_success()).count();
        if failed > 0 {
            warn!(
                "'{}': {} of {} backends failed",
                original_filename,
                failed,
                backends.len()
            );
        }

        info!(
            "✅ Processed '{}' ({} variants, cache {}) in {:?}",
            original_filename,
            named.len(),
            if built.cache_hit { "hit" } else { "miss" },
            start.elapsed()
        );

        Ok(ProcessingResult {
            metadata,
            backends,
            session_id,
            cache_hit: built.cache_hit,
        })
    }

    async fn load_or_build(
        &self,
        fingerprint: &Fingerprint,
        source: &ImageSource,
        options: &NormalizedOptions,
    ) -> SharedBuild {
        if let Some(variants) = self.cache.get(fingerprint).await {
            if covers_request(&variants, options) {
                return Ok(BuiltVariants {
                    variants: Arc::new(variants),
                    cache_hit: true,
                    unsaved: Arc::new(AtomicBool::new(false)),
                });
            }
            warn!(fingerprint = %fingerprint, "Cached variant set is incomplete, rebuilding");
        }

        let variants = self.pipeline.run(source, options).await?;
        Ok(BuiltVariants {
            variants: Arc::new(variants),
            cache_hit: false,
            unsaved: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Remove every cache entry
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, CacheError> {
        self.cache.stats().await
    }
}

async fn compute_fingerprint(
    source: &ImageSource,
    options: &NormalizedOptions,
) -> Result<Fingerprint, ProcessError> {
    let data = source.bytes().clone();
    let options = options.clone();
    tokio::task::spawn_blocking(move || fingerprint::compute(&data, &options))
        .await
        .map_err(|e| ProcessError::image(format!("Fingerprint task failed: {}", e)))
}

/// One variant for the original plus one per requested size
fn covers_request(variants: &[ProcessedVariant], options: &NormalizedOptions) -> bool {
    variants.len() == options.sizes.len() + 1
        && variants.iter().any(|v| v.is_original())
        && options
            .size_keys()
            .all(|key| variants.iter().any(|v| v.size_key == key))
}
