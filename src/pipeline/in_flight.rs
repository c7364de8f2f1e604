//! Tabella delle computazioni in corso, indicizzata per fingerprint.
//!
//! Richieste concorrenti con lo stesso fingerprint condividono una sola
//! computazione (e quindi una sola scrittura in cache). L'entry viene rimossa
//! quando la computazione termina: una richiesta successiva riparte da zero
//! e normalmente trova il risultato in cache.

use crate::fingerprint::Fingerprint;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

pub struct InFlightTable<T> {
    entries: Mutex<HashMap<Fingerprint, Arc<OnceCell<T>>>>,
}

impl<T> Default for InFlightTable<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> InFlightTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of computations currently in flight
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `compute` unless an identical computation is already in flight,
    /// in which case wait for it and share its result.
    ///
    /// If the caller running `compute` is dropped, a waiting caller takes over.
    pub async fn run<F, Fut>(&self, key: &Fingerprint, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let _guard = EntryGuard {
            entries: &self.entries,
            key,
            cell: cell.clone(),
        };

        cell.get_or_init(compute).await.clone()
    }
}

/// Drops the table entry once its computation is settled
struct EntryGuard<'a, T> {
    entries: &'a Mutex<HashMap<Fingerprint, Arc<OnceCell<T>>>>,
    key: &'a Fingerprint,
    cell: Arc<OnceCell<T>>,
}

impl<T> Drop for EntryGuard<'_, T> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(current) = entries.get(self.key) else {
            return;
        };
        if !Arc::ptr_eq(current, &self.cell) {
            return;
        }

        // table + this guard + the caller's local: nobody else is waiting
        let abandoned = Arc::strong_count(&self.cell) <= 3;
        if self.cell.initialized() || abandoned {
            entries.remove(self.key);
        }
    }
}
