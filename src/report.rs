//! # Processing Report Module
//!
//! Questo modulo definisce il risultato strutturato di una richiesta.
//!
//! ## Responsabilità:
//! - Metadata per variante (dimensioni, formato, byte, filename)
//! - Esito per backend: location persistite oppure descrizione dell'errore
//! - Serializzazione JSON per la CLI e per i chiamanti della libreria
//!
//! ## Forma del JSON:
//! ```json
//! {
//!   "metadata": {
//!     "original": { "width": 800, "height": 600, "format": "jpeg", "byteLength": 48213, "filename": "photo-…" },
//!     "resized": { "small": { "width": 320, "height": 240, "format": "jpeg", "byteLength": 9120, "filename": "resized/small/…" } }
//!   },
//!   "local": { "original": "variants/photo-….original.jpg", "resized": { "small": "variants/resized/small/…" } },
//!   "s3": { "error": "Upload failed: …" }
//! }
//! ```
//!
//! Un backend non abilitato non compare nel risultato.

use crate::codec::OutputFormat;
use crate::pipeline::filename_resolver::NamedVariant;
use crate::variant::ORIGINAL_KEY;
use serde::Serialize;
use std::collections::BTreeMap;

/// Top-level key of the variant metadata; no backend may use it as its name
pub const RESERVED_KEY: &str = "metadata";

/// Metadata of one produced variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantMetadata {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub byte_length: u64,
    pub filename: String,
}

impl From<&NamedVariant> for VariantMetadata {
    fn from(named: &NamedVariant) -> Self {
        Self {
            width: named.variant.width,
            height: named.variant.height,
            format: named.variant.format,
            byte_length: named.variant.byte_length,
            filename: named.filename.clone(),
        }
    }
}

/// Metadata of the whole variant set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultMetadata {
    pub original: VariantMetadata,
    pub resized: BTreeMap<String, VariantMetadata>,
}

impl ResultMetadata {
    /// Returns `None` when the set has no original variant
    pub fn from_named(named: &[NamedVariant]) -> Option<Self> {
        let original = named.iter().find(|n| n.variant.is_original())?;
        let resized = named
            .iter()
            .filter(|n| !n.variant.is_original())
            .map(|n| (n.variant.size_key.clone(), VariantMetadata::from(n)))
            .collect();

        Some(Self {
            original: VariantMetadata::from(original),
            resized,
        })
    }
}

/// Locations written by one backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoredLocations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    pub resized: BTreeMap<String, String>,
}

impl StoredLocations {
    pub fn is_empty(&self) -> bool {
        self.original.is_none() && self.resized.is_empty()
    }

    /// Record one written variant under its size key
    pub fn record(&mut self, size_key: &str, location: String) {
        if size_key == ORIGINAL_KEY {
            self.original = Some(location);
        } else {
            self.resized.insert(size_key.to_string(), location);
        }
    }
}

/// Outcome of the fan-out for one backend
///
/// `Failed` keeps the locations that were written before the error
/// (`partial`), so objects left on the backend stay traceable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BackendOutcome {
    Stored(StoredLocations),
    Failed {
        error: String,
        #[serde(skip_serializing_if = "StoredLocations::is_empty")]
        partial: StoredLocations,
    },
}

impl BackendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendOutcome::Stored(_))
    }

    pub fn locations(&self) -> Option<&StoredLocations> {
        match self {
            BackendOutcome::Stored(locations) => Some(locations),
            BackendOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BackendOutcome::Stored(_) => None,
            BackendOutcome::Failed { error, .. } => Some(error),
        }
    }

    /// Locations written before a failure; empty on success
    pub fn partial(&self) -> Option<&StoredLocations> {
        match self {
            BackendOutcome::Stored(_) => None,
            BackendOutcome::Failed { partial, .. } => Some(partial),
        }
    }
}

/// Result of a processing request
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub metadata: ResultMetadata,
    /// One entry per enabled backend, keyed by backend name
    #[serde(flatten)]
    pub backends: BTreeMap<String, BackendOutcome>,
    /// Correlation token used for the filenames of this request
    #[serde(skip)]
    pub session_id: String,
    /// Whether the variants came from the cache
    #[serde(skip)]
    pub cache_hit: bool,
}

impl ProcessingResult {
    pub fn backend(&self, name: &str) -> Option<&BackendOutcome> {
        self.backends.get(name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
