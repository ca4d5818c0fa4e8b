//! Storage layer: the read-only commodity taxonomy and its ancestor path cache.

mod cache;
mod error;
pub mod ingest;
mod memory;
mod taxonomy;

pub use cache::PathCache;
pub use error::StoreError;
pub use ingest::TaxonomyRow;
pub use memory::MemoryStore;
pub use taxonomy::{Taxonomy, TaxonomySearch, TaxonomyStore};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
