//! Fan-out of a named variant set to every enabled backend.
//!
//! Ogni backend viene tentato in modo indipendente e concorrente: un errore
//! (o un panic) di un backend non impedisce i tentativi sugli altri. Dentro
//! un backend le varianti vengono scritte in parallelo e ogni scrittura
//! arriva a termine: il primo errore rende l'esito un `Failed`, che riporta
//! comunque le location già scritte.

use super::{StorageBackend, StorageError};
use crate::pipeline::filename_resolver::NamedVariant;
use crate::report::{BackendOutcome, StoredLocations};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct StorageDispatcher {
    backends: Vec<Arc<dyn StorageBackend>>,
}

impl StorageDispatcher {
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Persist `variants` to every backend; never fails as a whole
    pub async fn dispatch(&self, variants: &[NamedVariant]) -> BTreeMap<String, BackendOutcome> {
        let attempts = self.backends.iter().map(|backend| async move {
            let outcome = Self::persist_all(backend.as_ref(), variants).await;
            (backend.name().to_string(), outcome)
        });

        join_all(attempts).await.into_iter().collect()
    }

    async fn persist_all(backend: &dyn StorageBackend, variants: &[NamedVariant]) -> BackendOutcome {
        let writes = variants.iter().map(|named| async move {
            let location = backend
                .persist(&named.filename, named.variant.payload.clone())
                .await;
            (named, location)
        });

        let Ok(results) = AssertUnwindSafe(join_all(writes)).catch_unwind().await else {
            warn!(backend = backend.name(), "Backend panicked while storing variant set");
            return BackendOutcome::Failed {
                error: format!("backend '{}' panicked", backend.name()),
                partial: StoredLocations::default(),
            };
        };

        let mut locations = StoredLocations::default();
        let mut first_error: Option<StorageError> = None;
        for (named, result) in results {
            match result {
                Ok(location) => locations.record(&named.variant.size_key, location),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => {
                debug!(
                    backend = backend.name(),
                    variants = variants.len(),
                    "Backend stored variant set"
                );
                BackendOutcome::Stored(locations)
            }
            Some(e) => {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    written = count(&locations),
                    total = variants.len(),
                    "Backend failed to store variant set"
                );
                BackendOutcome::Failed {
                    error: e.to_string(),
                    partial: locations,
                }
            }
        }
    }
}

fn count(locations: &StoredLocations) -> usize {
    usize::from(locations.original.is_some()) + locations.resized.len()
}
