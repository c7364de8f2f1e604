//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline di varianti.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con size profile, cache e backend di storage
//! - Valida la configurazione una sola volta, alla costruzione del servizio
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `sizes`: tabella dei `SizeProfile` (`key`, `width`, `quality`)
//! - `default_output_format`: formato di fallback (default: "jpeg")
//! - `original_quality`: qualità del re-encode dell'originale (default: 100)
//! - `cache`: abilitazione e directory della cache content-addressable
//! - `local`: backend filesystem locale (default: abilitato, `./variants`)
//! - `object_storage`: backend S3-compatibile (default: disabilitato)
//!
//! ## Validazione:
//! - Chiavi delle size non vuote, uniche, usabili come segmento di path
//! - La chiave "original" è riservata
//! - `width > 0` e `quality` in 0-100
//! - Il formato di default deve essere un formato di output supportato
//! - Con object storage abilitato serve un bucket
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     sizes: vec![SizeProfile::new("thumb", 160, 75)],
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::codec::OutputFormat;
use crate::error::ProcessError;
use crate::variant::ORIGINAL_KEY;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A named resize target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeProfile {
    /// Size key, used in result maps, cache file names and default filenames
    pub key: String,
    /// Target width in pixels (aspect ratio is preserved)
    pub width: u32,
    /// Default encode quality (0-100)
    pub quality: u8,
}

impl SizeProfile {
    pub fn new(key: impl Into<String>, width: u32, quality: u8) -> Self {
        Self {
            key: key.into(),
            width,
            quality,
        }
    }
}

/// Content-addressable cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("variant-pipeline");
        Self {
            enabled: true,
            directory,
        }
    }
}

/// Local filesystem backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    pub enabled: bool,
    pub base_path: PathBuf,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: PathBuf::from("variants"),
        }
    }
}

/// S3-compatible object storage settings.
///
/// Credentials are picked up from the environment (`AWS_ACCESS_KEY_ID`, ...)
/// when the backend is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    pub enabled: bool,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    pub endpoint_url: Option<String>,
    /// Key prefix prepended to every variant filename
    pub prefix: Option<String>,
}

/// Configuration for the variant pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size profiles, in the order they are reported
    pub sizes: Vec<SizeProfile>,
    /// Fallback output format when neither the request nor the source decides
    pub default_output_format: String,
    /// Quality for the re-encoded original when the request sets none
    pub original_quality: u8,
    pub cache: CacheConfig,
    pub local: LocalStorageConfig,
    pub object_storage: ObjectStorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sizes: vec![
                SizeProfile::new("small", 320, 80),
                SizeProfile::new("medium", 640, 82),
                SizeProfile::new("large", 1024, 85),
            ],
            default_output_format: "jpeg".to_string(),
            original_quality: 100,
            cache: CacheConfig::default(),
            local: LocalStorageConfig::default(),
            object_storage: ObjectStorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ProcessError> {
        let mut seen = HashSet::new();
        for profile in &self.sizes {
            validate_size_key(&profile.key)?;

            if !seen.insert(profile.key.as_str()) {
                return Err(ProcessError::config(format!(
                    "Duplicate size key: {}",
                    profile.key
                )));
            }

            if profile.width == 0 {
                return Err(ProcessError::config(format!(
                    "Size '{}' must have a width greater than 0",
                    profile.key
                )));
            }

            if profile.quality > 100 {
                return Err(ProcessError::config(format!(
                    "Size '{}' quality must be between 0 and 100",
                    profile.key
                )));
            }
        }

        if self.original_quality > 100 {
            return Err(ProcessError::config(
                "Original quality must be between 0 and 100",
            ));
        }

        self.default_format()?;

        if self.cache.enabled && self.cache.directory.as_os_str().is_empty() {
            return Err(ProcessError::config("Cache directory must not be empty"));
        }

        if self.local.enabled && self.local.base_path.as_os_str().is_empty() {
            return Err(ProcessError::config(
                "Local storage base path must not be empty",
            ));
        }

        if self.object_storage.enabled && self.object_storage.bucket.trim().is_empty() {
            return Err(ProcessError::config(
                "Object storage is enabled but no bucket is configured",
            ));
        }

        Ok(())
    }

    /// Parsed fallback output format
    pub fn default_format(&self) -> Result<OutputFormat, ProcessError> {
        OutputFormat::parse(&self.default_output_format)
    }

    /// Look up a size profile by key
    pub fn size(&self, key: &str) -> Option<&SizeProfile> {
        self.sizes.iter().find(|profile| profile.key == key)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Size keys become cache file names and path segments
fn validate_size_key(key: &str) -> Result<(), ProcessError> {
    if key.is_empty() {
        return Err(ProcessError::config("Size key must not be empty"));
    }

    if key == ORIGINAL_KEY {
        return Err(ProcessError::config(format!(
            "Size key '{}' is reserved",
            ORIGINAL_KEY
        )));
    }

    let valid = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid || key.starts_with('-') {
        return Err(ProcessError::config(format!(
            "Size key '{}' may only contain letters, digits, '-' and '_'",
            key
        )));
    }

    Ok(())
}
