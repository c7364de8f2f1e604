//! # Variant Types
//!
//! Tipi condivisi fra pipeline, cache, filename resolver e storage.
//!
//! - `VariantSpec`: intento di elaborazione risolto per un singolo output
//! - `ProcessedVariant`: output prodotto, immutabile una volta creato

use crate::codec::OutputFormat;
use bytes::Bytes;

/// Size key reserved for the re-encoded original
pub const ORIGINAL_KEY: &str = "original";

/// Resolved processing intent for one output.
///
/// Transformations are not repeated here: they are applied once to the
/// shared decoded image before any spec is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    /// `"original"` or a configured size key
    pub size_key: String,
    pub output_format: OutputFormat,
    /// Encode quality (0-100)
    pub quality: u8,
    /// Resize target; `None` keeps the decoded dimensions
    pub target_width: Option<u32>,
}

impl VariantSpec {
    pub fn is_original(&self) -> bool {
        self.size_key == ORIGINAL_KEY
    }
}

/// One produced output image.
///
/// The payload is reference counted, so handing a variant to the cache and
/// to several storage backends never copies the encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedVariant {
    pub size_key: String,
    pub payload: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub byte_length: u64,
}

impl ProcessedVariant {
    pub fn new(
        size_key: impl Into<String>,
        payload: Bytes,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Self {
        let byte_length = payload.len() as u64;
        Self {
            size_key: size_key.into(),
            payload,
            width,
            height,
            format,
            byte_length,
        }
    }

    pub fn is_original(&self) -> bool {
        self.size_key == ORIGINAL_KEY
    }
}
