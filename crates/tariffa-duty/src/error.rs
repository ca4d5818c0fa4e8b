use thiserror::Error;

#[derive(Debug, Error)]
pub enum DutyError {
    #[error(transparent)]
    Store(#[from] tariffa_store::StoreError),

    #[error("reading program table {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("program table json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("program {program:?} for {origin}: prefix {prefix:?} has no digits")]
    EmptyPrefix {
        origin: String,
        program: String,
        prefix: String,
    },

    #[error("rate pattern: {0}")]
    Pattern(#[from] regex::Error),
}
