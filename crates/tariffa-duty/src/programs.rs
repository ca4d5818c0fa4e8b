//! Trade-remedy program tables, keyed by origin country.
//!
//! ```json
//! {
//!   "CN": [
//!     { "program": "Section 301 List 3", "rate": 25, "code": "9903.88.03",
//!       "scope": { "type": "specific_products", "prefixes": ["6912", "7013"] } },
//!     { "program": "IEEPA", "rate": 20,
//!       "scope": { "type": "all_products", "excluded_prefixes": ["98"] } }
//!   ]
//! }
//! ```
//!
//! The tables are maintained elsewhere and only read here.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tariffa_core::{RatePct, is_within};
use tracing::info;

use crate::DutyError;

/// Which codes a program covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgramScope {
    AllProducts {
        #[serde(default)]
        excluded_prefixes: Vec<String>,
    },
    SpecificProducts {
        prefixes: Vec<String>,
    },
}

impl Default for ProgramScope {
    fn default() -> Self {
        Self::AllProducts {
            excluded_prefixes: Vec::new(),
        }
    }
}

/// How a program relates to one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMatch {
    Applies,
    Excluded,
    /// Specific-products program whose coverage of this code is unconfirmed.
    Conditional,
}

impl ProgramScope {
    /// Every listed prefix, included or excluded.
    fn prefixes(&self) -> &[String] {
        match self {
            Self::AllProducts { excluded_prefixes } => excluded_prefixes,
            Self::SpecificProducts { prefixes } => prefixes,
        }
    }

    /// Classify `code` (bare digits) against this scope.
    pub fn check(&self, code: &str) -> ScopeMatch {
        let covered = |prefixes: &[String]| prefixes.iter().any(|p| is_within(code, &digits(p)));
        match self {
            Self::AllProducts { excluded_prefixes } if covered(excluded_prefixes) => ScopeMatch::Excluded,
            Self::AllProducts { .. } => ScopeMatch::Applies,
            Self::SpecificProducts { prefixes } if covered(prefixes) => ScopeMatch::Applies,
            Self::SpecificProducts { .. } => ScopeMatch::Conditional,
        }
    }
}

fn digits(prefix: &str) -> String {
    prefix.chars().filter(char::is_ascii_digit).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub program: String,
    /// Ad valorem percentage.
    pub rate: RatePct,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub scope: ProgramScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramTable {
    by_origin: BTreeMap<String, Vec<ProgramEntry>>,
}

impl ProgramTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table. Origin keys differing only in case or padding merge.
    pub fn from_json_str(json: &str) -> Result<Self, DutyError> {
        let raw: BTreeMap<String, Vec<ProgramEntry>> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for (origin, entries) in raw {
            for entry in entries {
                table.insert(&origin, entry)?;
            }
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, DutyError> {
        let text = std::fs::read_to_string(path).map_err(|source| DutyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json_str(&text)?;
        info!(path = %path.display(), origins = table.by_origin.len(), "loaded program table");
        Ok(table)
    }

    /// Add a program for an origin. A scope prefix without digits would
    /// cover every code, so it is rejected.
    pub fn insert(&mut self, origin: &str, entry: ProgramEntry) -> Result<(), DutyError> {
        let origin = normalize_origin(origin);
        if let Some(prefix) = entry.scope.prefixes().iter().find(|p| digits(p).is_empty()) {
            return Err(DutyError::EmptyPrefix {
                origin,
                program: entry.program.clone(),
                prefix: prefix.clone(),
            });
        }
        self.by_origin.entry(origin).or_default().push(entry);
        Ok(())
    }

    /// Programs listed for an origin; empty when the origin is not in the table.
    pub fn programs_for(&self, origin: &str) -> &[ProgramEntry] {
        self.by_origin
            .get(&normalize_origin(origin))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.by_origin.keys().map(String::as_str)
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().to_uppercase()
}
