//! Engine configuration.
//!
//! All thresholds and weights the engine uses live here so that the
//! narrowing loop's bounds are explicit. Values load from TOML; every field
//! has a default, so a partial file only overrides what it names.
//!
//! ```toml
//! [narrowing]
//! max_rounds = 3
//! confident_threshold = 0.8
//!
//! [scoring]
//! keyword = 0.45
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub narrowing: NarrowingConfig,
    pub scoring: ScoringWeights,
    pub search: SearchConfig,
    pub oracle: OracleSettings,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = &self.narrowing;
        for (name, v) in [
            ("narrowing.confident_threshold", n.confident_threshold),
            ("narrowing.confident_margin", n.confident_margin),
            ("narrowing.min_viable", n.min_viable),
            ("narrowing.heuristic_confidence_cap", n.heuristic_confidence_cap),
            ("narrowing.rescue_penalty", n.rescue_penalty),
            ("scoring.sample_penalty", self.scoring.sample_penalty),
            ("scoring.endorsement_weight", self.scoring.endorsement_weight),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {v}")));
            }
        }
        if n.max_rounds == 0 {
            return Err(ConfigError::Invalid("narrowing.max_rounds must be at least 1".into()));
        }
        if self.scoring.answer_boost < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "scoring.answer_boost must be >= 1, got {}",
                self.scoring.answer_boost
            )));
        }
        if self.search.max_branches == 0 || self.search.max_branches > 5 {
            return Err(ConfigError::Invalid(format!(
                "search.max_branches must be in 1..=5, got {}",
                self.search.max_branches
            )));
        }
        if self.oracle.max_attempts == 0 {
            return Err(ConfigError::Invalid("oracle.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Bounds and thresholds of the narrowing loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrowingConfig {
    /// Answer rounds before the session must settle. Keeps question loops finite.
    pub max_rounds: usize,
    /// Questions emitted per round.
    pub max_questions: usize,
    /// Top confidence must exceed this to be confident...
    pub confident_threshold: f32,
    /// ...and beat the runner-up by at least this much.
    pub confident_margin: f32,
    /// Candidates below this confidence do not count as viable alternatives.
    pub min_viable: f32,
    /// Wall-clock budget for one `classify` call.
    pub session_deadline_secs: u64,
    /// Ceiling on confidence when the oracle was unavailable.
    pub heuristic_confidence_cap: f32,
    /// Multiplier applied when the oracle's pick could not be found.
    pub rescue_penalty: f32,
}

impl Default for NarrowingConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_questions: 3,
            confident_threshold: 0.8,
            confident_margin: 0.3,
            min_viable: 0.1,
            session_deadline_secs: 120,
            heuristic_confidence_cap: 0.5,
            rescue_penalty: 0.85,
        }
    }
}

impl NarrowingConfig {
    pub fn session_deadline(&self) -> Duration {
        Duration::from_secs(self.session_deadline_secs)
    }
}

/// Confidence weights.
///
/// These are uncalibrated starting points; treat them as tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub keyword: f32,
    pub material_exact: f32,
    pub material_substring: f32,
    pub hierarchy: f32,
    pub specificity: f32,
    /// Multiplier for candidates from a zero-match branch sample.
    pub sample_penalty: f32,
    /// Multiplier for candidates consistent with a narrowing answer.
    pub answer_boost: f32,
    /// Share of the remaining headroom an oracle endorsement closes.
    pub endorsement_weight: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword: 0.45,
            material_exact: 0.25,
            material_substring: 0.12,
            hierarchy: 0.15,
            specificity: 0.15,
            sample_penalty: 0.3,
            answer_boost: 1.3,
            endorsement_weight: 0.3,
        }
    }
}

/// How top-level branches are shortlisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortlistMode {
    /// Oracle suggestions merged with the static keyword table.
    Merged,
    /// One oracle call over every chapter.
    WideNet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub mode: ShortlistMode,
    pub max_branches: usize,
    pub per_branch_limit: usize,
    /// Nodes sampled from a branch with no keyword match.
    pub sample_size: usize,
    pub bucket_limit: usize,
    /// Candidates offered to the oracle for final selection.
    pub selection_pool: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: ShortlistMode::Merged,
            max_branches: 5,
            per_branch_limit: 25,
            sample_size: 5,
            bucket_limit: 50,
            selection_pool: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            backoff_ms: 250,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 1024,
        }
    }
}

impl OracleSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
