//! Taxonomy ingest: rows in, validated and linked nodes out.
//!
//! Two input shapes are accepted:
//! - native rows: `[{ "code": "6912.00.44", "description": "...", "base_rate": "5%" }]`
//! - a USITC HTS JSON export: `[{ "htsno": "6912.00.44", "description": "...",
//!   "general": "5%", "special": "Free (A,AU)" }]`
//!
//! Linking sets each node's parent to the nearest ingested ancestor. Every
//! non-chapter node must have one; a duplicate code is rejected so that codes
//! stay immutable once ingested.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tariffa_core::{Level, TaxonomyNode, ancestor_codes, normalize_code};
use tracing::info;

use crate::StoreError;

/// One taxonomy row in the native JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRow {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub base_rate: Option<String>,
    #[serde(default)]
    pub special_rate: Option<String>,
}

impl TaxonomyRow {
    pub fn new(code: &str, description: &str) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            base_rate: None,
            special_rate: None,
        }
    }

    pub fn rate(mut self, rate: &str) -> Self {
        self.base_rate = Some(rate.to_string());
        self
    }

    pub fn special(mut self, rate: &str) -> Self {
        self.special_rate = Some(rate.to_string());
        self
    }
}

#[derive(Deserialize)]
struct UsitcRow {
    #[serde(default)]
    htsno: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    general: Option<String>,
    #[serde(default)]
    special: Option<String>,
}

/// Validate rows and link them into a node list sorted by code.
pub fn build_nodes(rows: impl IntoIterator<Item = TaxonomyRow>) -> Result<Vec<TaxonomyNode>, StoreError> {
    let mut nodes = Vec::new();
    for row in rows {
        let mut node = TaxonomyNode::new(&row.code, row.description.trim())?;
        node.base_rate = non_empty(row.base_rate);
        node.special_rate = non_empty(row.special_rate);
        nodes.push(node);
    }
    link(nodes)
}

/// Set parents to the nearest present ancestor; reject duplicates and orphans.
pub fn link(nodes: Vec<TaxonomyNode>) -> Result<Vec<TaxonomyNode>, StoreError> {
    let mut by_code: BTreeMap<String, TaxonomyNode> = BTreeMap::new();
    for node in nodes {
        if by_code.contains_key(&node.code) {
            return Err(StoreError::DuplicateCode(node.formatted_code));
        }
        by_code.insert(node.code.clone(), node);
    }

    let present: BTreeSet<String> = by_code.keys().cloned().collect();
    let mut linked = Vec::with_capacity(by_code.len());
    for (code, node) in by_code {
        let parent = ancestor_codes(&code)
            .into_iter()
            .find(|a| present.contains(a));
        if node.level != Level::Chapter && parent.is_none() {
            return Err(StoreError::Orphan(node.formatted_code));
        }
        linked.push(node.with_parent(parent));
    }
    Ok(linked)
}

/// Read native rows from a JSON file.
pub fn read_rows(path: &Path) -> Result<Vec<TaxonomyRow>, StoreError> {
    if !path.exists() {
        return Err(StoreError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let rows: Vec<TaxonomyRow> = serde_json::from_str(&text)?;
    info!(count = rows.len(), path = %path.display(), "read taxonomy rows");
    Ok(rows)
}

/// Read a USITC HTS export from a JSON file.
pub fn read_usitc(path: &Path) -> Result<Vec<TaxonomyRow>, StoreError> {
    if !path.exists() {
        return Err(StoreError::FileNotFound(path.to_path_buf()));
    }
    let rows = usitc_rows_from_str(&std::fs::read_to_string(path)?)?;
    info!(count = rows.len(), path = %path.display(), "read USITC export");
    Ok(rows)
}

/// Convert USITC export JSON into native rows.
///
/// Rows without an `htsno` are indentation-only text and are skipped.
/// Chapters are not rows in the export, so missing chapters are synthesized.
pub fn usitc_rows_from_str(json: &str) -> Result<Vec<TaxonomyRow>, StoreError> {
    let raw: Vec<UsitcRow> = serde_json::from_str(json)?;
    let mut rows = Vec::with_capacity(raw.len());
    let mut chapters = BTreeSet::new();
    let mut seen_chapters = BTreeSet::new();

    for r in raw {
        if r.htsno.trim().is_empty() {
            continue;
        }
        let digits = normalize_code(&r.htsno)?;
        if digits.len() == 2 {
            seen_chapters.insert(digits.clone());
        } else {
            chapters.insert(digits[..2].to_string());
        }
        rows.push(TaxonomyRow {
            code: digits,
            description: r.description,
            base_rate: r.general,
            special_rate: r.special,
        });
    }

    for chapter in chapters.difference(&seen_chapters) {
        rows.push(TaxonomyRow::new(chapter, &format!("Chapter {chapter}")));
    }
    Ok(rows)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_to_nearest_present_ancestor() {
        let nodes = build_nodes(vec![
            TaxonomyRow::new("69", "Ceramic products"),
            TaxonomyRow::new("6912", "Ceramic tableware"),
            // 6912.00 is absent; the 8-digit line hangs off the heading.
            TaxonomyRow::new("6912.00.44", "Mugs").rate("10%"),
        ])
        .unwrap();
        assert_eq!(nodes.len(), 3);
        let line = nodes.iter().find(|n| n.code == "69120044").unwrap();
        assert_eq!(line.parent_code.as_deref(), Some("6912"));
        assert_eq!(line.base_rate.as_deref(), Some("10%"));
    }

    #[test]
    fn rejects_duplicates() {
        let err = build_nodes(vec![
            TaxonomyRow::new("69", "Ceramic products"),
            TaxonomyRow::new("6912", "a"),
            TaxonomyRow::new("6912", "b"),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCode(code) if code == "6912"));
    }

    #[test]
    fn rejects_orphans() {
        let err = build_nodes(vec![TaxonomyRow::new("6912", "Ceramic tableware")]).unwrap_err();
        assert!(matches!(err, StoreError::Orphan(_)));
    }

    #[test]
    fn blank_rates_become_none() {
        let nodes = build_nodes(vec![TaxonomyRow::new("69", "Ceramic products").rate("  ")]).unwrap();
        assert!(nodes[0].base_rate.is_none());
    }

    #[test]
    fn usitc_export_synthesizes_chapters() {
        let json = r#"[
            {"htsno": "6912", "indent": "0", "description": "Ceramic tableware", "general": "", "special": ""},
            {"htsno": "", "indent": "1", "description": "Tableware and kitchenware:"},
            {"htsno": "6912.00.44", "indent": "2", "description": "Mugs", "general": "10%", "special": "Free (A,AU)"}
        ]"#;
        let rows = usitc_rows_from_str(json).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().any(|r| r.code == "69" && r.description == "Chapter 69"));

        let nodes = build_nodes(rows).unwrap();
        let mugs = nodes.iter().find(|n| n.code == "69120044").unwrap();
        assert_eq!(mugs.special_rate.as_deref(), Some("Free (A,AU)"));
        let heading = nodes.iter().find(|n| n.code == "6912").unwrap();
        assert!(heading.base_rate.is_none());
    }

    #[test]
    fn read_rows_missing_file() {
        let result = read_rows(Path::new("/nonexistent/taxonomy.json"));
        assert!(matches!(result, Err(StoreError::FileNotFound(_))));
    }

    #[test]
    fn read_rows_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(
            &path,
            r#"[{"code": "69", "description": "Ceramic products"}]"#,
        )
        .unwrap();
        let rows = read_rows(&path).unwrap();
        assert_eq!(rows, vec![TaxonomyRow::new("69", "Ceramic products")]);
    }
}
