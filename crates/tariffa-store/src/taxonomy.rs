//! The Taxonomy Store interface and the shared handle around it.

use std::sync::Arc;

use tariffa_core::{Level, TaxonomyNode, normalize_code};

use crate::{PathCache, StoreError};

/// Description search over the taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomySearch {
    /// Case-insensitive substrings; a node matches if any term matches.
    /// Empty matches every node in scope.
    pub terms: Vec<String>,
    /// Restrict to codes under this prefix.
    pub prefix: Option<String>,
    /// Only nodes without children.
    pub leaves_only: bool,
    /// Maximum rows; 0 means unlimited.
    pub limit: usize,
}

impl TaxonomySearch {
    pub fn terms(terms: Vec<String>) -> Self {
        Self {
            terms,
            ..Self::default()
        }
    }

    pub fn within(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn leaves(mut self) -> Self {
        self.leaves_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Read-only access to the code tree. Results are ordered by code, except
/// `search` with terms: most matched terms first, then code.
pub trait TaxonomyStore: Send + Sync {
    fn get(&self, code: &str) -> Result<Option<TaxonomyNode>, StoreError>;

    fn children(&self, code: &str) -> Result<Vec<TaxonomyNode>, StoreError>;

    fn by_prefix(&self, prefix: &str, level: Option<Level>) -> Result<Vec<TaxonomyNode>, StoreError>;

    fn by_level(&self, level: Level) -> Result<Vec<TaxonomyNode>, StoreError>;

    fn search(&self, query: &TaxonomySearch) -> Result<Vec<TaxonomyNode>, StoreError>;

    fn is_leaf(&self, code: &str) -> Result<bool, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;
}

/// A store plus its path cache; the handle shared by engine and resolver.
pub struct Taxonomy {
    store: Arc<dyn TaxonomyStore>,
    cache: PathCache,
}

impl Taxonomy {
    pub fn new(store: Arc<dyn TaxonomyStore>) -> Self {
        Self::with_cache(store, PathCache::new())
    }

    pub fn with_cache(store: Arc<dyn TaxonomyStore>, cache: PathCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &dyn TaxonomyStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Look up a node by code in any accepted notation.
    pub fn node(&self, code: &str) -> Result<Option<TaxonomyNode>, StoreError> {
        let digits = normalize_code(code)?;
        self.store.get(&digits)
    }

    /// Ancestors of `code`, chapter first, excluding the node itself.
    pub fn path(&self, code: &str) -> Result<Arc<[TaxonomyNode]>, StoreError> {
        let digits = normalize_code(code)?;
        self.cache.get_or_compute(&digits, || {
            let node = self
                .store
                .get(&digits)?
                .ok_or_else(|| StoreError::UnknownCode(digits.clone()))?;
            let mut path = Vec::new();
            let mut parent = node.parent_code;
            while let Some(code) = parent {
                let ancestor = self
                    .store
                    .get(&code)?
                    .ok_or_else(|| StoreError::UnknownCode(code.clone()))?;
                parent = ancestor.parent_code.clone();
                path.push(ancestor);
            }
            path.reverse();
            Ok(path)
        })
    }

    pub fn chapters(&self) -> Result<Vec<TaxonomyNode>, StoreError> {
        self.store.by_level(Level::Chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, TaxonomyRow};

    fn taxonomy() -> Taxonomy {
        let store = MemoryStore::from_rows(vec![
            TaxonomyRow::new("69", "Ceramic products"),
            TaxonomyRow::new("6912", "Ceramic tableware"),
            TaxonomyRow::new("6912.00", "Ceramic tableware").rate("5%"),
            TaxonomyRow::new("6912.00.44", "Mugs"),
            TaxonomyRow::new("6912.00.44.10", "Coffee mugs"),
        ])
        .unwrap();
        Taxonomy::new(Arc::new(store))
    }

    #[test]
    fn path_is_chapter_first() {
        let t = taxonomy();
        let path = t.path("6912.00.44.10").unwrap();
        let codes: Vec<&str> = path.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["69", "6912", "691200", "69120044"]);
    }

    #[test]
    fn path_uses_cache() {
        let t = taxonomy();
        t.path("6912004410").unwrap();
        t.path("6912.00.44.10").unwrap();
        assert_eq!(t.cache().stats(), (1, 1));
    }

    #[test]
    fn chapter_path_is_empty() {
        assert!(taxonomy().path("69").unwrap().is_empty());
    }

    #[test]
    fn unknown_code_errors() {
        let t = taxonomy();
        assert!(matches!(t.path("7013"), Err(StoreError::UnknownCode(_))));
        assert!(matches!(t.node("70x"), Err(StoreError::Code(_))));
        assert!(t.node("7013").unwrap().is_none());
    }
}
