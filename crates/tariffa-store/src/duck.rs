//! DuckDB-backed Taxonomy Store.
//!
//! One `taxonomy` table, one row per node, with the leaf flag materialized at
//! load time so leaf-only searches need no self-join. Supports in-memory and
//! persistent (file-backed) databases; a persistent file that already holds
//! the table can be opened without re-ingesting.

use std::path::Path;
use std::sync::Mutex;

use arrow::array::{Array, BooleanArray, Int64Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use duckdb::{Connection, ToSql, params};
use tariffa_core::{Level, TaxonomyNode};
use tracing::{debug, info};

use crate::{StoreError, TaxonomySearch, TaxonomyStore};

const COLUMNS: &str = "code, formatted_code, level, parent_code, description, base_rate, special_rate";

pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open or create a persistent DuckDB database at the given path.
    ///
    /// Use [`has_table`](Self::has_table) to check whether ingest is needed.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Whether the `taxonomy` table exists and is non-empty.
    pub fn has_table(&self) -> bool {
        self.len().map(|n| n > 0).unwrap_or(false)
    }

    /// Replace the `taxonomy` table with already-linked nodes.
    pub fn load_nodes(&self, nodes: &[TaxonomyNode]) -> Result<(), StoreError> {
        let parents: std::collections::HashSet<&str> =
            nodes.iter().filter_map(|n| n.parent_code.as_deref()).collect();

        let conn = self.lock();
        conn.execute_batch(
            "CREATE OR REPLACE TABLE taxonomy (
                code VARCHAR PRIMARY KEY,
                formatted_code VARCHAR NOT NULL,
                level VARCHAR NOT NULL,
                parent_code VARCHAR,
                description VARCHAR NOT NULL,
                base_rate VARCHAR,
                special_rate VARCHAR,
                is_leaf BOOLEAN NOT NULL
            )",
        )?;
        {
            let mut appender = conn.appender("taxonomy")?;
            for n in nodes {
                appender.append_row(params![
                    n.code,
                    n.formatted_code,
                    n.level.as_str(),
                    n.parent_code,
                    n.description,
                    n.base_rate,
                    n.special_rate,
                    !parents.contains(n.code.as_str()),
                ])?;
            }
            appender.flush()?;
        }
        drop(conn);

        info!(count = nodes.len(), "loaded taxonomy table");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow(params)?.collect();
        Ok(batches)
    }

    fn query_nodes(&self, where_clause: &str, params: &[&dyn ToSql]) -> Result<Vec<TaxonomyNode>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM taxonomy WHERE {where_clause} ORDER BY code");
        debug!(sql = %sql, "taxonomy query");
        let batches = self.query(&sql, params)?;
        nodes_from_batches(&batches)
    }
}

impl TaxonomyStore for DuckStore {
    fn get(&self, code: &str) -> Result<Option<TaxonomyNode>, StoreError> {
        Ok(self.query_nodes("code = ?", &[&code])?.into_iter().next())
    }

    fn children(&self, code: &str) -> Result<Vec<TaxonomyNode>, StoreError> {
        self.query_nodes("parent_code = ?", &[&code])
    }

    fn by_prefix(&self, prefix: &str, level: Option<Level>) -> Result<Vec<TaxonomyNode>, StoreError> {
        match level {
            Some(level) => self.query_nodes("starts_with(code, ?) AND level = ?", &[&prefix, &level.as_str()]),
            None => self.query_nodes("starts_with(code, ?)", &[&prefix]),
        }
    }

    fn by_level(&self, level: Level) -> Result<Vec<TaxonomyNode>, StoreError> {
        self.query_nodes("level = ?", &[&level.as_str()])
    }

    fn search(&self, query: &TaxonomySearch) -> Result<Vec<TaxonomyNode>, StoreError> {
        let mut clauses = vec!["TRUE".to_string()];
        let mut params: Vec<&dyn ToSql> = Vec::new();

        if let Some(prefix) = &query.prefix {
            clauses.push("starts_with(code, ?)".into());
            params.push(prefix);
        }
        if query.leaves_only {
            clauses.push("is_leaf".into());
        }
        if !query.terms.is_empty() {
            let any = vec!["description ILIKE '%' || ? || '%'"; query.terms.len()].join(" OR ");
            clauses.push(format!("({any})"));
            for term in &query.terms {
                params.push(term);
            }
        }

        let mut order = "code".to_string();
        if !query.terms.is_empty() {
            let matched = vec!["(description ILIKE '%' || ? || '%')::INTEGER"; query.terms.len()].join(" + ");
            order = format!("{matched} DESC, code");
            for term in &query.terms {
                params.push(term);
            }
        }

        let mut sql = format!(
            "SELECT {COLUMNS} FROM taxonomy WHERE {} ORDER BY {order}",
            clauses.join(" AND ")
        );
        if query.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", query.limit));
        }
        nodes_from_batches(&self.query(&sql, &params)?)
    }

    fn is_leaf(&self, code: &str) -> Result<bool, StoreError> {
        let batches = self.query("SELECT is_leaf FROM taxonomy WHERE code = ?", &[&code])?;
        let batch = batches
            .iter()
            .find(|b| b.num_rows() > 0)
            .ok_or_else(|| StoreError::UnknownCode(code.to_string()))?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| StoreError::Other("is_leaf column not boolean".into()))?;
        Ok(col.value(0))
    }

    fn len(&self) -> Result<usize, StoreError> {
        let batches = self.query("SELECT count(*)::BIGINT AS cnt FROM taxonomy", &[])?;
        let batch = batches
            .first()
            .ok_or_else(|| StoreError::Other("count returned no rows".into()))?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }
}

// ── Arrow decoding ──

fn nodes_from_batches(batches: &[RecordBatch]) -> Result<Vec<TaxonomyNode>, StoreError> {
    let mut out = Vec::new();
    for batch in batches {
        let col = |name: &str| {
            batch
                .column_by_name(name)
                .ok_or_else(|| StoreError::Other(format!("missing column {name}")))
        };
        let (code, formatted, level, parent, desc, base, special) = (
            col("code")?,
            col("formatted_code")?,
            col("level")?,
            col("parent_code")?,
            col("description")?,
            col("base_rate")?,
            col("special_rate")?,
        );
        for row in 0..batch.num_rows() {
            let level_text = get_string(level.as_ref(), row).unwrap_or_default();
            let level = Level::parse(&level_text)
                .ok_or_else(|| StoreError::Other(format!("unknown level {level_text:?}")))?;
            out.push(TaxonomyNode {
                code: get_string(code.as_ref(), row).unwrap_or_default(),
                formatted_code: get_string(formatted.as_ref(), row).unwrap_or_default(),
                level,
                parent_code: get_string(parent.as_ref(), row),
                description: get_string(desc.as_ref(), row).unwrap_or_default(),
                base_rate: get_string(base.as_ref(), row),
                special_rate: get_string(special.as_ref(), row),
            });
        }
    }
    Ok(out)
}

/// Extract a string value from an Arrow array (handles Utf8 and LargeUtf8).
fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}
