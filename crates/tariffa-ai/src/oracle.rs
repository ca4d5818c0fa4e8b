//! The Reasoning Oracle capability and its wire-level types.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tariffa_core::{Candidate, ProductUnderstanding};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle rate limited")]
    RateLimited,
    #[error("oracle service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("oracle transport error: {0}")]
    Transport(String),
    #[error("oracle gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<OracleError>,
    },
}

impl OracleError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Malformed(_) | Self::Transport(_) => true,
            Self::Service { status, .. } => *status >= 500,
            Self::Exhausted { .. } => false,
        }
    }
}

/// Raw input to product understanding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderstandingRequest {
    pub description: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub intended_use: Option<String>,
}

impl UnderstandingRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Description and hints as one lowercase string.
    pub fn input_text(&self) -> String {
        let mut parts = vec![self.description.as_str()];
        parts.extend(self.material.as_deref());
        parts.extend(self.intended_use.as_deref());
        parts.join(" ").to_lowercase()
    }
}

/// Attribute extraction as returned by an oracle, before the partition is enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderstandingDraft {
    pub product_type: String,
    pub stated: BTreeMap<String, String>,
    pub inferred: BTreeMap<String, String>,
    pub unknowns: Vec<String>,
}

/// A top-level branch offered to the oracle for shortlisting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPick {
    pub code: String,
    #[serde(default)]
    pub reason: String,
}

/// The oracle's final pick. `code` is bare digits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSelection {
    pub code: String,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

/// Structured judgments used by the classification engine.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Whether answers come from fixed tables rather than a model.
    fn is_heuristic(&self) -> bool {
        false
    }

    async fn understand(&self, request: &UnderstandingRequest) -> Result<UnderstandingDraft, OracleError>;

    /// Pick at most `limit` of `branches`, most likely first.
    async fn shortlist_branches(
        &self,
        understanding: &ProductUnderstanding,
        branches: &[BranchSummary],
        limit: usize,
    ) -> Result<Vec<BranchPick>, OracleError>;

    async fn select_code(
        &self,
        understanding: &ProductUnderstanding,
        candidates: &[Candidate],
    ) -> Result<CodeSelection, OracleError>;
}

/// One completion call: system prompt plus user prompt in, text out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// A text completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(OracleError::RateLimited.is_retryable());
        assert!(OracleError::Malformed("x".into()).is_retryable());
        assert!(OracleError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            OracleError::Service {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !OracleError::Service {
                status: 401,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn input_text_includes_hints() {
        let mut req = UnderstandingRequest::new("Coffee Mug");
        req.material = Some("Stoneware".into());
        assert_eq!(req.input_text(), "coffee mug stoneware");
    }

    #[test]
    fn draft_tolerates_missing_fields() {
        let draft: UnderstandingDraft = serde_json::from_str(r#"{"product_type": "mug"}"#).unwrap();
        assert_eq!(draft.product_type, "mug");
        assert!(draft.unknowns.is_empty());
    }
}
