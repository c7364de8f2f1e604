//! # Pipeline Module
//!
//! Orchestrazione di una richiesta: dal payload grezzo al report finale.
//!
//! ## Architettura:
//! - `VariantService`: orchestratore (fingerprint, cache, pipeline, naming, fan-out)
//! - `VariantPipeline`: produzione delle varianti tramite il `CodecEngine`
//! - `FilenameResolver`: registro delle strategie di naming
//! - `InFlightTable`: una sola computazione per fingerprint alla volta

pub mod filename_resolver;
pub mod in_flight;
pub mod service;
pub mod variant_pipeline;

pub use filename_resolver::{FilenameContext, FilenameResolver, NamedVariant};
pub use in_flight::InFlightTable;
pub use service::VariantService;
pub use variant_pipeline::VariantPipeline;
