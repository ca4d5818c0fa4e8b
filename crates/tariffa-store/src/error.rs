use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("taxonomy file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("code {0} is not in the taxonomy")]
    UnknownCode(String),

    #[error("code {0} ingested twice")]
    DuplicateCode(String),

    #[error("code {0} has no ancestor chapter in the taxonomy")]
    Orphan(String),

    #[error(transparent)]
    Code(#[from] tariffa_core::CodeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[cfg(feature = "duckdb")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
