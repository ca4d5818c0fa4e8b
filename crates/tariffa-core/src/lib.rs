//! Core types, code-hierarchy arithmetic, attribute vocabulary and configuration.

pub mod code;
pub mod config;
pub mod model;
pub mod vocab;

pub use code::{CodeError, Level, ancestor_codes, chapter_of, format_code, is_within, normalize_code, parent_code};
pub use config::{
    ConfigError, EngineConfig, NarrowingConfig, OracleSettings, ScoringWeights, SearchConfig,
    ShortlistMode,
};
pub use model::{
    AdditionalProgram, Alternative, Candidate, CandidateBucket, ClassificationResult,
    ClassificationStatus, DutyRate, NarrowingQuestion, ProductUnderstanding, RatePct, RateSource,
    SpecialProgram, TaxonomyNode, UnderstandingSource, rank,
};
