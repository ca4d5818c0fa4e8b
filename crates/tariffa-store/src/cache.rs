//! Read-through cache of resolved ancestor paths.
//!
//! Population is idempotent: a path is computed outside the lock and only
//! the first insert for a code is kept, so two sessions racing on the same
//! code may both compute it but never observe a partial entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tariffa_core::TaxonomyNode;

use crate::StoreError;

#[derive(Debug, Default)]
pub struct PathCache {
    paths: RwLock<HashMap<String, Arc<[TaxonomyNode]>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached path for `code`, computing and storing it on a miss.
    pub fn get_or_compute<F>(&self, code: &str, compute: F) -> Result<Arc<[TaxonomyNode]>, StoreError>
    where
        F: FnOnce() -> Result<Vec<TaxonomyNode>, StoreError>,
    {
        {
            let paths = self.paths.read().unwrap_or_else(|e| e.into_inner());
            if let Some(path) = paths.get(code) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(path));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed: Arc<[TaxonomyNode]> = compute()?.into();

        let mut paths = self.paths.write().unwrap_or_else(|e| e.into_inner());
        let entry = paths.entry(code.to_string()).or_insert(computed);
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.paths.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
