//! # Processing Options Module
//!
//! Opzioni per-richiesta e loro normalizzazione.
//!
//! ## Responsabilità:
//! - `ProcessOptions`: opzioni così come arrivano dal chiamante (JSON camelCase)
//! - `NormalizedOptions`: opzioni validate e risolte contro la `Config`
//! - Produce la codifica canonica usata dal fingerprint
//!
//! ## Validazione (tutti errori `Configuration`):
//! - `outputFormat` deve essere un formato supportato
//! - `quality` deve stare in 0-100
//! - `processSizes` può contenere solo chiavi configurate
//! - `transformations` deve essere un descrittore valido
//! - `filenameStrategy` deve essere registrata nel resolver
//!
//! ## Normalizzazione:
//! - size non specificate → tutte le size configurate
//! - size duplicate → rimosse, ordine della configurazione
//! - strategy non specificata → "default"
//! - formato di default e qualità dell'originale copiati dalla config, così
//!   un cambio di configurazione invalida le entry di cache

use crate::codec::OutputFormat;
use crate::config::{Config, SizeProfile};
use crate::error::ProcessError;
use crate::pipeline::filename_resolver::{FilenameResolver, DEFAULT_STRATEGY};
use crate::transform::TransformOp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Options of a processing request, as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessOptions {
    /// Explicit output format (`jpeg`, `jpg`, `png`, `webp`)
    pub output_format: Option<String>,
    /// Quality override (0-100) for every variant
    pub quality: Option<u32>,
    /// Pick the format from the source's alpha channel when none is requested
    pub optimize_output_format: bool,
    /// Subset of configured size keys; `None` means all of them
    pub process_sizes: Option<Vec<String>>,
    /// Transform operations, applied in order
    pub transformations: Vec<TransformOp>,
    /// Registered filename strategy name
    pub filename_strategy: Option<String>,
}

impl ProcessOptions {
    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self, ProcessError> {
        serde_json::from_str(json)
            .map_err(|e| ProcessError::config(format!("Invalid options: {}", e)))
    }

    /// Validate against `config` and resolve every default
    pub fn normalize(
        &self,
        config: &Config,
        resolver: &FilenameResolver,
    ) -> Result<NormalizedOptions, ProcessError> {
        let output_format = self
            .output_format
            .as_deref()
            .map(OutputFormat::parse)
            .transpose()?;

        let quality = match self.quality {
            Some(q) if q > 100 => {
                return Err(ProcessError::config(format!(
                    "Quality must be between 0 and 100, got {}",
                    q
                )))
            }
            Some(q) => Some(q as u8),
            None => None,
        };

        let sizes = match self.process_sizes {
            None => config.sizes.clone(),
            Some(ref requested) => {
                if let Some(unknown) = requested.iter().find(|key| config.size(key).is_none()) {
                    return Err(ProcessError::config(format!("Unknown size key: '{}'", unknown)));
                }
                config
                    .sizes
                    .iter()
                    .filter(|profile| requested.contains(&profile.key))
                    .cloned()
                    .collect()
            }
        };

        for op in &self.transformations {
            op.validate()?;
        }

        let filename_strategy = self
            .filename_strategy
            .clone()
            .unwrap_or_else(|| DEFAULT_STRATEGY.to_string());
        if !resolver.contains(&filename_strategy) {
            return Err(ProcessError::config(format!(
                "Unknown filename strategy: '{}'",
                filename_strategy
            )));
        }

        Ok(NormalizedOptions {
            output_format,
            quality,
            optimize_output_format: self.optimize_output_format,
            sizes,
            transformations: self.transformations.clone(),
            filename_strategy,
            default_format: config.default_format()?,
            original_quality: config.original_quality,
        })
    }
}

/// Validated options with every default resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedOptions {
    pub output_format: Option<OutputFormat>,
    pub quality: Option<u8>,
    pub optimize_output_format: bool,
    /// Requested size profiles, in configuration order
    pub sizes: Vec<SizeProfile>,
    pub transformations: Vec<TransformOp>,
    pub filename_strategy: String,
    pub default_format: OutputFormat,
    pub original_quality: u8,
}

impl NormalizedOptions {
    pub fn size_keys(&self) -> impl Iterator<Item = &str> {
        self.sizes.iter().map(|profile| profile.key.as_str())
    }

    /// Encoding hashed into the fingerprint
    pub fn canonical_value(&self) -> Value {
        let mut sizes: Vec<Value> = self
            .sizes
            .iter()
            .map(|p| json!({ "key": p.key, "width": p.width, "quality": p.quality }))
            .collect();
        sizes.sort_by(|a, b| a["key"].as_str().cmp(&b["key"].as_str()));

        json!({
            "outputFormat": self.output_format.map(OutputFormat::as_str),
            "quality": self.quality,
            "optimizeOutputFormat": self.optimize_output_format,
            "sizes": sizes,
            "transformations": self
                .transformations
                .iter()
                .map(TransformOp::canonical_value)
                .collect::<Vec<_>>(),
            "filenameStrategy": self.filename_strategy,
            "defaultFormat": self.default_format.as_str(),
            "originalQuality": self.original_quality,
        })
    }
}
