//! In-memory Taxonomy Store over a sorted map.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tariffa_core::{Level, TaxonomyNode};
use tracing::info;

use crate::ingest::{self, TaxonomyRow};
use crate::{StoreError, TaxonomySearch, TaxonomyStore};

/// Taxonomy held in memory. Built once; never mutated afterwards.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: BTreeMap<String, TaxonomyNode>,
    children: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn from_rows(rows: impl IntoIterator<Item = TaxonomyRow>) -> Result<Self, StoreError> {
        Ok(Self::from_linked(ingest::build_nodes(rows)?))
    }

    /// Build from nodes, re-linking parents to present ancestors.
    pub fn from_nodes(nodes: Vec<TaxonomyNode>) -> Result<Self, StoreError> {
        Ok(Self::from_linked(ingest::link(nodes)?))
    }

    /// Load native JSON rows.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let store = Self::from_rows(ingest::read_rows(path)?)?;
        info!(count = store.nodes.len(), "loaded taxonomy into memory");
        Ok(store)
    }

    /// Load a USITC HTS JSON export.
    pub fn load_usitc(path: &Path) -> Result<Self, StoreError> {
        let store = Self::from_rows(ingest::read_usitc(path)?)?;
        info!(count = store.nodes.len(), "loaded USITC taxonomy into memory");
        Ok(store)
    }

    fn from_linked(nodes: Vec<TaxonomyNode>) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for node in &nodes {
            if let Some(parent) = &node.parent_code {
                children.entry(parent.clone()).or_default().push(node.code.clone());
            }
        }
        let nodes = nodes.into_iter().map(|n| (n.code.clone(), n)).collect();
        Self { nodes, children }
    }

    fn leaf(&self, code: &str) -> bool {
        !self.children.contains_key(code)
    }

    fn under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a TaxonomyNode> + 'a {
        self.nodes
            .range(prefix.to_string()..)
            .take_while(move |(code, _)| code.starts_with(prefix))
            .map(|(_, n)| n)
    }
}

impl TaxonomyStore for MemoryStore {
    fn get(&self, code: &str) -> Result<Option<TaxonomyNode>, StoreError> {
        Ok(self.nodes.get(code).cloned())
    }

    fn children(&self, code: &str) -> Result<Vec<TaxonomyNode>, StoreError> {
        let mut out: Vec<TaxonomyNode> = self
            .children
            .get(code)
            .into_iter()
            .flatten()
            .filter_map(|c| self.nodes.get(c).cloned())
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(out)
    }

    fn by_prefix(&self, prefix: &str, level: Option<Level>) -> Result<Vec<TaxonomyNode>, StoreError> {
        Ok(self
            .under(prefix)
            .filter(|n| level.is_none_or(|l| n.level == l))
            .cloned()
            .collect())
    }

    fn by_level(&self, level: Level) -> Result<Vec<TaxonomyNode>, StoreError> {
        Ok(self
            .nodes
            .values()
            .filter(|n| n.level == level)
            .cloned()
            .collect())
    }

    fn search(&self, query: &TaxonomySearch) -> Result<Vec<TaxonomyNode>, StoreError> {
        let terms: Vec<String> = query.terms.iter().map(|t| t.to_lowercase()).collect();
        let prefix = query.prefix.as_deref().unwrap_or("");
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };

        let mut hits: Vec<(usize, &TaxonomyNode)> = self
            .under(prefix)
            .filter(|n| !query.leaves_only || self.leaf(&n.code))
            .filter_map(|n| {
                let desc = n.description.to_lowercase();
                let matched = terms.iter().filter(|t| desc.contains(t.as_str())).count();
                (terms.is_empty() || matched > 0).then_some((matched, n))
            })
            .collect();
        // Stable: equal counts stay in code order.
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits.into_iter().take(limit).map(|(_, n)| n.clone()).collect())
    }

    fn is_leaf(&self, code: &str) -> Result<bool, StoreError> {
        if !self.nodes.contains_key(code) {
            return Err(StoreError::UnknownCode(code.to_string()));
        }
        Ok(self.leaf(code))
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.nodes.len())
    }
}
