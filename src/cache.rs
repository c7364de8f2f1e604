//! # Variant Cache Module
//!
//! Questo modulo memorizza i set di varianti già elaborati, indicizzati per
//! fingerprint, per evitare di ripetere il re-encoding.
//!
//! ## Responsabilità:
//! - `get`: legge il documento di metadata e reidrata i payload binari
//! - `set`: scrive un payload per variante più il documento di metadata
//! - `clear`: svuota completamente la cache (operazione di manutenzione)
//! - `stats`: numero di entry e byte totali in cache
//!
//! ## Strategia di persistence:
//! ```text
//! <cache_dir>/
//! └── <fingerprint>/
//!     ├── metadata.json
//!     ├── original.jpg
//!     ├── small.jpg
//!     └── large.jpg
//! ```
//!
//! - I payload vengono scritti per primi, il `metadata.json` per ultimo con
//!   write-to-temp + rename: una entry scritta a metà viene letta come miss
//! - Un payload la cui lunghezza non corrisponde a `byteLength` è un miss
//! - Nessuna eviction e nessun TTL
//!
//! ## Politica sugli errori:
//! - `get` e `set` non falliscono mai: qualsiasi errore viene loggato e la
//!   cache viene bypassata (la cache è solo un'ottimizzazione)
//! - `clear` e `stats` propagano i propri errori al chiamante
//!
//! ## Esempio struttura metadata:
//! ```json
//! {
//!   "version": 1,
//!   "fingerprint": "3f2a...",
//!   "variants": [
//!     { "sizeKey": "original", "width": 800, "height": 600, "format": "jpeg", "byteLength": 48213 },
//!     { "sizeKey": "small", "width": 320, "height": 240, "format": "jpeg", "byteLength": 9120 }
//!   ]
//! }
//! ```

use crate::codec::OutputFormat;
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::utils::format_size;
use crate::variant::ProcessedVariant;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const METADATA_FILENAME: &str = "metadata.json";

/// Bump to invalidate every existing entry when the layout changes
const METADATA_VERSION: u32 = 1;

/// Metadata of one cached variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantRecord {
    size_key: String,
    width: u32,
    height: u32,
    format: OutputFormat,
    byte_length: u64,
}

impl VariantRecord {
    fn payload_filename(&self) -> String {
        format!("{}.{}", self.size_key, self.format.extension())
    }
}

/// Metadata document of one cache entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheMetadata {
    version: u32,
    fingerprint: String,
    variants: Vec<VariantRecord>,
}

/// Aggregate numbers about the cache contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    /// Entries whose metadata could not be parsed (not counted above)
    pub corrupted: usize,
}

/// Filesystem-backed content-addressable store of variant sets
#[derive(Debug, Clone)]
pub struct VariantCacheStore {
    root: PathBuf,
    enabled: bool,
}

impl VariantCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enabled: true,
        }
    }

    /// A store that never hits and never writes
    pub fn disabled(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enabled: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn entry_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Look up a variant set. Every failure is a miss.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Vec<ProcessedVariant>> {
        if !self.enabled {
            return None;
        }

        match self.try_get(fingerprint).await {
            Ok(Some(variants)) => {
                debug!(fingerprint = %fingerprint, variants = variants.len(), "Cache hit");
                Some(variants)
            }
            Ok(None) => {
                debug!(fingerprint = %fingerprint, "Cache miss");
                None
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn try_get(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Vec<ProcessedVariant>>, CacheError> {
        let dir = self.entry_dir(fingerprint);

        let content = match fs::read_to_string(dir.join(METADATA_FILENAME)).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let metadata: CacheMetadata = serde_json::from_str(&content)?;
        if metadata.version != METADATA_VERSION {
            return Err(CacheError::Corrupted(format!(
                "unsupported metadata version {}",
                metadata.version
            )));
        }
        if metadata.fingerprint != fingerprint.as_str() {
            return Err(CacheError::Corrupted(
                "metadata belongs to another fingerprint".to_string(),
            ));
        }

        let mut variants = Vec::with_capacity(metadata.variants.len());
        for record in metadata.variants {
            let payload = fs::read(dir.join(record.payload_filename())).await?;
            if payload.len() as u64 != record.byte_length {
                return Err(CacheError::Corrupted(format!(
                    "payload '{}' has {} bytes, expected {}",
                    record.size_key,
                    payload.len(),
                    record.byte_length
                )));
            }

            variants.push(ProcessedVariant {
                size_key: record.size_key,
                payload: Bytes::from(payload),
                width: record.width,
                height: record.height,
                format: record.format,
                byte_length: record.byte_length,
            });
        }

        Ok(Some(variants))
    }

    /// Persist a variant set. Failures are logged and swallowed.
    pub async fn set(&self, fingerprint: &Fingerprint, variants: &[ProcessedVariant]) {
        if !self.enabled {
            return;
        }

        match self.try_set(fingerprint, variants).await {
            Ok(total) => {
                debug!(
                    fingerprint = %fingerprint,
                    variants = variants.len(),
                    size = %format_size(total),
                    "Cache entry written"
                );
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Cache write failed, continuing without cache");
            }
        }
    }

    async fn try_set(
        &self,
        fingerprint: &Fingerprint,
        variants: &[ProcessedVariant],
    ) -> Result<u64, CacheError> {
        let dir = self.entry_dir(fingerprint);
        fs::create_dir_all(&dir).await?;

        let mut records = Vec::with_capacity(variants.len());
        let mut total = 0;
        for variant in variants {
            let record = VariantRecord {
                size_key: variant.size_key.clone(),
                width: variant.width,
                height: variant.height,
                format: variant.format,
                byte_length: variant.byte_length,
            };
            write_atomic(&dir.join(record.payload_filename()), &variant.payload).await?;
            total += variant.byte_length;
            records.push(record);
        }

        let metadata = CacheMetadata {
            version: METADATA_VERSION,
            fingerprint: fingerprint.as_str().to_string(),
            variants: records,
        };
        let content = serde_json::to_vec_pretty(&metadata)?;
        write_atomic(&dir.join(METADATA_FILENAME), &content).await?;

        Ok(total)
    }

    /// Remove every entry
    pub async fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!("Cleared variant cache at {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Count entries and cached bytes
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            // solo le directory con nome di fingerprint sono entry della cache
            let name = entry.file_name();
            if name.to_str().and_then(Fingerprint::parse).is_none() {
                continue;
            }
            let metadata_path = entry.path().join(METADATA_FILENAME);
            let content = match fs::read_to_string(&metadata_path).await {
                Ok(c) => c,
                // directory senza metadata: entry incompleta, non conta
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let metadata: CacheMetadata = match serde_json::from_str(&content) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %metadata_path.display(), error = %e, "Skipping corrupted cache entry");
                    stats.corrupted += 1;
                    continue;
                }
            };
            stats.entries += 1;
            stats.total_bytes += metadata
                .variants
                .iter()
                .map(|record| record.byte_length)
                .sum::<u64>();
        }

        Ok(stats)
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    fs::write(&tmp_path, data).await?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OutputFormat;
    use crate::fingerprint;
    use crate::options::ProcessOptions;
    use crate::pipeline::filename_resolver::FilenameResolver;
    use crate::config::Config;
    use tempfile::TempDir;

    fn fingerprint_of(content: &[u8]) -> Fingerprint {
        let options = ProcessOptions::default()
            .normalize(&Config::default(), &FilenameResolver::new())
            .unwrap();
        fingerprint::compute(content, &options)
    }

    fn variants() -> Vec<ProcessedVariant> {
        vec![
            ProcessedVariant::new(
                "original",
                Bytes::from_static(b"original-bytes"),
                800,
                600,
                OutputFormat::Jpeg,
            ),
            ProcessedVariant::new(
                "small",
                Bytes::from_static(b"small"),
                320,
                240,
                OutputFormat::Jpeg,
            ),
        ]
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::new(temp_dir.path());
        let fp = fingerprint_of(b"image");

        cache.set(&fp, &variants()).await;
        let restored = cache.get(&fp).await.unwrap();

        assert_eq!(restored, variants());
        assert!(temp_dir.path().join(fp.as_str()).join("small.jpg").exists());
        assert!(temp_dir.path().join(fp.as_str()).join(METADATA_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_missing_entry_is_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::new(temp_dir.path());
        assert!(cache.get(&fingerprint_of(b"nothing")).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_metadata_is_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::new(temp_dir.path());
        let fp = fingerprint_of(b"image");

        cache.set(&fp, &variants()).await;
        fs::write(temp_dir.path().join(fp.as_str()).join(METADATA_FILENAME), "{not json")
            .await
            .unwrap();

        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_truncated_or_missing_payload_is_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::new(temp_dir.path());
        let fp = fingerprint_of(b"image");
        let entry = temp_dir.path().join(fp.as_str());

        cache.set(&fp, &variants()).await;
        fs::write(entry.join("small.jpg"), b"sm").await.unwrap();
        assert!(cache.get(&fp).await.is_none());

        cache.set(&fp, &variants()).await;
        fs::remove_file(entry.join("original.jpg")).await.unwrap();
        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_set_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // la root è un file: create_dir_all fallisce
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"file").await.unwrap();

        let cache = VariantCacheStore::new(&blocker);
        let fp = fingerprint_of(b"image");
        cache.set(&fp, &variants()).await;
        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::disabled(temp_dir.path());
        let fp = fingerprint_of(b"image");

        cache.set(&fp, &variants()).await;
        assert!(cache.get(&fp).await.is_none());
        assert!(!temp_dir.path().join(fp.as_str()).exists());
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::new(temp_dir.path().join("cache"));

        assert_eq!(cache.stats().await.unwrap(), CacheStats::default());
        cache.clear().await.unwrap();

        cache.set(&fingerprint_of(b"one"), &variants()).await;
        cache.set(&fingerprint_of(b"two"), &variants()).await;

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 2 * (14 + 5));

        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap().entries, 0);
        assert!(cache.get(&fingerprint_of(b"one")).await.is_none());
    }

    #[tokio::test]
    async fn test_stats_skip_corrupted_entry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = VariantCacheStore::new(temp_dir.path());
        let good = fingerprint_of(b"good");
        let broken = fingerprint_of(b"broken");
        cache.set(&good, &variants()).await;
        cache.set(&broken, &variants()).await;
        std::fs::write(
            temp_dir.path().join(broken.as_str()).join(METADATA_FILENAME),
            "{ not json",
        )
        .unwrap();

        let foreign = temp_dir.path().join("lost+found");
        std::fs::create_dir_all(&foreign).unwrap();
        std::fs::write(foreign.join(METADATA_FILENAME), "garbage").unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_bytes, 14 + 5);
        assert_eq!(stats.corrupted, 1);
    }
}
