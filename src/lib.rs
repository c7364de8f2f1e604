//! # Variant Pipeline Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore della richiesta e della cache
//! - `codec`: Trait `CodecEngine` e implementazione sul crate `image`
//! - `transform`: Descrittore chiuso delle trasformazioni
//! - `options`: Opzioni per-richiesta e loro normalizzazione
//! - `fingerprint`: Chiave content-addressable (contenuto + opzioni)
//! - `cache`: Cache su filesystem dei set di varianti
//! - `pipeline`: Orchestratore, produzione varianti, naming, in-flight
//! - `storage`: Backend di destinazione e dispatcher fan-out
//! - `report`: Risultato strutturato della richiesta
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use variant_pipeline::{Config, ProcessOptions, VariantService};
//!
//! let service = VariantService::new(Config::default()).await?;
//! let result = service.process(bytes, "photo.jpg", &ProcessOptions::default()).await?;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod options;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod storage;
pub mod transform;
pub mod utils;
pub mod variant;

#[cfg(test)]
mod test_helpers;

pub use cache::{CacheStats, VariantCacheStore};
pub use codec::{CodecEngine, ImageCodec, OutputFormat};
pub use config::{Config, SizeProfile};
pub use error::{CacheError, ProcessError};
pub use fingerprint::Fingerprint;
pub use options::ProcessOptions;
pub use pipeline::{FilenameContext, VariantService};
pub use report::{BackendOutcome, ProcessingResult};
pub use storage::{StorageBackend, StorageError};
pub use transform::{FlipAxis, TransformOp};
pub use variant::ProcessedVariant;
