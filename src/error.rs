//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `ProcessError`, la tassonomia degli errori visibili al chiamante
//! - Definisce `CacheError`, usato solo internamente dalla cache delle varianti
//! - Integra con `thiserror` per conversioni automatiche
//!
//! ## Categorie di errori:
//! - `Configuration`: configurazione non valida, opzioni della richiesta non
//!   valide (quality fuori range, size sconosciuta, formato non supportato,
//!   filename strategy che produce un nome vuoto)
//! - `ImageProcessing`: sorgente illeggibile o corrotta, media type non
//!   supportato, fallimento di transform o encode del codec
//!
//! Gli errori dei singoli backend di storage (`StorageError`) vivono nel modulo
//! `storage` e non escono mai da `process`: finiscono nel report per-backend.
//!
//! ## Propagazione:
//! - `ProcessError` interrompe la richiesta prima di qualsiasi scrittura in
//!   cache o I/O di storage
//! - `CacheError` viene loggato e ignorato da `get`/`set`, propagato solo da
//!   `clear` e `stats`
//!
//! ## Esempio:
//! ```rust,ignore
//! if quality > 100 {
//!     return Err(ProcessError::Configuration(format!("quality {} out of range", quality)));
//! }
//! ```

/// Errors surfaced by a processing request.
///
/// `Clone` because the result of one computation is shared by every request
/// joined on the same fingerprint.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl ProcessError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_image_processing(&self) -> bool {
        matches!(self, Self::ImageProcessing(_))
    }
}

impl From<image::ImageError> for ProcessError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing(err.to_string())
    }
}

/// Errors raised inside the variant cache
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Corrupted cache entry: {0}")]
    Corrupted(String),
}
