//! # Filename Resolver
//!
//! Centralizza il calcolo del nome di destinazione di ogni variante.
//!
//! ## Strategie registrate di default:
//! - `default`:
//!   - originale: `<base>-<session>.original.<ext>`
//!   - size: `resized/<sizeKey>/<base>-<session>.<sizeKey>.<ext>`
//! - `flat`: `<base>-<session>.<sizeKey|original>.<ext>`
//!
//! `ext` deriva dal formato di output risolto (`jpg` per la famiglia JPEG).
//!
//! Una strategia custom si registra per nome: solo il nome entra nel
//! fingerprint, mai il codice della funzione. Un risultato vuoto, assoluto,
//! con `..` o duplicato è un errore di configurazione e interrompe la
//! richiesta prima di qualsiasi I/O di storage.

use crate::codec::OutputFormat;
use crate::error::ProcessError;
use crate::storage::validate_key;
use crate::utils::base_name;
use crate::variant::{ProcessedVariant, ORIGINAL_KEY};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_STRATEGY: &str = "default";
pub const FLAT_STRATEGY: &str = "flat";

/// Everything a naming strategy may use
#[derive(Debug, Clone, Copy)]
pub struct FilenameContext<'a> {
    pub original_filename: &'a str,
    pub base_name: &'a str,
    /// Extension of the resolved output format
    pub extension: &'a str,
    pub size_key: &'a str,
    pub output_format: OutputFormat,
    pub is_original: bool,
    pub session_id: &'a str,
}

/// A naming strategy
pub type FilenameStrategy = Arc<dyn Fn(&FilenameContext<'_>) -> String + Send + Sync>;

/// A variant paired with its final filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedVariant {
    pub variant: ProcessedVariant,
    pub filename: String,
}

/// Registry of naming strategies
#[derive(Clone)]
pub struct FilenameResolver {
    strategies: HashMap<String, FilenameStrategy>,
}

impl fmt::Debug for FilenameResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.strategies.keys().collect();
        names.sort();
        f.debug_struct("FilenameResolver")
            .field("strategies", &names)
            .finish()
    }
}

impl Default for FilenameResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn default_name(ctx: &FilenameContext<'_>) -> String {
    if ctx.is_original {
        format!(
            "{}-{}.{}.{}",
            ctx.base_name, ctx.session_id, ORIGINAL_KEY, ctx.extension
        )
    } else {
        format!(
            "resized/{}/{}-{}.{}.{}",
            ctx.size_key, ctx.base_name, ctx.session_id, ctx.size_key, ctx.extension
        )
    }
}

fn flat_name(ctx: &FilenameContext<'_>) -> String {
    format!(
        "{}-{}.{}.{}",
        ctx.base_name, ctx.session_id, ctx.size_key, ctx.extension
    )
}

impl FilenameResolver {
    /// Registry with the built-in `default` and `flat` strategies
    pub fn new() -> Self {
        let mut resolver = Self {
            strategies: HashMap::new(),
        };
        resolver.register(DEFAULT_STRATEGY, default_name);
        resolver.register(FLAT_STRATEGY, flat_name);
        resolver
    }

    /// Register (or replace) a strategy under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, strategy: F)
    where
        F: Fn(&FilenameContext<'_>) -> String + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registered filename strategy '{}'", name);
        self.strategies.insert(name, Arc::new(strategy));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Name every variant of the set with `strategy`
    pub fn resolve(
        &self,
        strategy: &str,
        original_filename: &str,
        session_id: &str,
        variants: &[ProcessedVariant],
    ) -> Result<Vec<NamedVariant>, ProcessError> {
        let naming = self.strategies.get(strategy).ok_or_else(|| {
            ProcessError::config(format!("Unknown filename strategy: '{}'", strategy))
        })?;

        let base = base_name(original_filename);
        let mut seen = HashSet::new();
        let mut named = Vec::with_capacity(variants.len());

        for variant in variants {
            let ctx = FilenameContext {
                original_filename,
                base_name: &base,
                extension: variant.format.extension(),
                size_key: &variant.size_key,
                output_format: variant.format,
                is_original: variant.is_original(),
                session_id,
            };

            let filename = naming(&ctx).trim().to_string();
            if filename.is_empty() {
                return Err(ProcessError::config(format!(
                    "Filename strategy '{}' returned an empty name for '{}'",
                    strategy, variant.size_key
                )));
            }
            validate_key(&filename).map_err(|e| {
                ProcessError::config(format!("Filename strategy '{}': {}", strategy, e))
            })?;
            if !seen.insert(filename.clone()) {
                return Err(ProcessError::config(format!(
                    "Filename strategy '{}' produced '{}' twice",
                    strategy, filename
                )));
            }

            named.push(NamedVariant {
                variant: variant.clone(),
                filename,
            });
        }

        Ok(named)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn variants(format: OutputFormat) -> Vec<ProcessedVariant> {
        ["original", "small"]
            .iter()
            .map(|key| ProcessedVariant::new(*key, Bytes::from_static(b"x"), 1, 1, format))
            .collect()
    }

    fn filenames(named: &[NamedVariant]) -> Vec<&str> {
        named.iter().map(|n| n.filename.as_str()).collect()
    }

    #[test]
    fn test_default_strategy() {
        let resolver = FilenameResolver::new();
        let named = resolver
            .resolve("default", "uploads/photo.png", "abc", &variants(OutputFormat::Jpeg))
            .unwrap();

        assert_eq!(
            filenames(&named),
            vec!["photo-abc.original.jpg", "resized/small/photo-abc.small.jpg"]
        );
    }

    #[test]
    fn test_flat_strategy_and_missing_base_name() {
        let resolver = FilenameResolver::new();
        let named = resolver
            .resolve(FLAT_STRATEGY, "", "s1", &variants(OutputFormat::WebP))
            .unwrap();

        assert_eq!(
            filenames(&named),
            vec!["image-s1.original.webp", "image-s1.small.webp"]
        );
    }

    #[test]
    fn test_custom_strategy_receives_context() {
        let mut resolver = FilenameResolver::new();
        resolver.register("by-format", |ctx: &FilenameContext<'_>| {
            format!(
                "{}/{}/{}.{}",
                ctx.output_format, ctx.size_key, ctx.original_filename, ctx.extension
            )
        });

        let named = resolver
            .resolve("by-format", "a.gif", "s", &variants(OutputFormat::Png))
            .unwrap();
        assert_eq!(
            filenames(&named),
            vec!["png/original/a.gif.png", "png/small/a.gif.png"]
        );
    }

    #[test]
    fn test_invalid_strategy_results_are_configuration_errors() {
        let mut resolver = FilenameResolver::new();
        resolver.register("empty", |_: &FilenameContext<'_>| String::new());
        resolver.register("same", |_: &FilenameContext<'_>| "same.jpg".to_string());
        resolver.register("escape", |_: &FilenameContext<'_>| "../x.jpg".to_string());

        for strategy in ["empty", "same", "escape", "unknown"] {
            let err = resolver
                .resolve(strategy, "a.jpg", "s", &variants(OutputFormat::Jpeg))
                .unwrap_err();
            assert!(err.is_configuration(), "strategy {}", strategy);
        }
    }
}
