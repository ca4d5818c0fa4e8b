//! Caller-facing API: one `classify` call per request, answers replayed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tariffa_ai::{ReasoningOracle, UnderstandingRequest};
use tariffa_core::{ClassificationResult, EngineConfig, NarrowingQuestion};
use tariffa_duty::{DutyError, DutyResolver, ProgramTable};
use tariffa_store::{StoreError, Taxonomy};
use thiserror::Error;
use tracing::{info, warn};

use crate::session::Session;

/// The only failure a caller ever sees as a message.
pub const NO_MATCH_MESSAGE: &str = "No match found. Please provide more detail.";

/// Answers given in one narrowing round, keyed by attribute.
pub type AnswerRound = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Only raised while building an [`Engine`].
    #[error(transparent)]
    Duty(#[from] DutyError),
}

/// One classification request. `answers` holds every round answered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub description: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub intended_use: Option<String>,
    /// ISO country code of origin, for duty programs.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub answers: Vec<AnswerRound>,
}

impl ClassifyRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_intended_use(mut self, intended_use: impl Into<String>) -> Self {
        self.intended_use = Some(intended_use.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Append one answer round.
    pub fn with_answers<K, V>(mut self, round: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.answers
            .push(round.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn understanding_request(&self) -> UnderstandingRequest {
        UnderstandingRequest {
            description: self.description.trim().to_string(),
            material: non_blank(&self.material),
            intended_use: non_blank(&self.intended_use),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Result of one `classify` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClassifyOutcome {
    Classified(ClassificationResult),
    NeedsInput {
        questions: Vec<NarrowingQuestion>,
        best_so_far: ClassificationResult,
    },
    NoMatch {
        message: String,
    },
}

impl ClassifyOutcome {
    pub fn no_match() -> Self {
        Self::NoMatch {
            message: NO_MATCH_MESSAGE.to_string(),
        }
    }

    /// The final or best-so-far result, if there is one.
    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            Self::Classified(r) => Some(r),
            Self::NeedsInput { best_so_far, .. } => Some(best_so_far),
            Self::NoMatch { .. } => None,
        }
    }

    pub fn questions(&self) -> &[NarrowingQuestion] {
        match self {
            Self::NeedsInput { questions, .. } => questions,
            _ => &[],
        }
    }
}

pub struct Engine {
    pub(crate) taxonomy: Arc<Taxonomy>,
    pub(crate) oracle: Arc<dyn ReasoningOracle>,
    pub(crate) duty: DutyResolver,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        oracle: Arc<dyn ReasoningOracle>,
        programs: ProgramTable,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let duty = DutyResolver::new(Arc::clone(&taxonomy), programs)?;
        Ok(Self {
            taxonomy,
            oracle,
            duty,
            config,
        })
    }

    pub fn taxonomy(&self) -> &Arc<Taxonomy> {
        &self.taxonomy
    }

    pub fn duty(&self) -> &DutyResolver {
        &self.duty
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Understand, search and score, leaving the session ready for answers.
    pub async fn start(&self, request: ClassifyRequest) -> Result<Session<'_>, EngineError> {
        Session::start(self, request).await
    }

    /// Classify a request, replaying any answer rounds it carries.
    ///
    /// The same request always walks the same path, so a caller that keeps
    /// only the accumulated answers can drive the narrowing loop statelessly.
    pub async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyOutcome, EngineError> {
        if request.description.trim().is_empty() {
            info!("empty description");
            return Ok(ClassifyOutcome::no_match());
        }

        let mut session = self.start(request.clone()).await?;
        let max_rounds = self.config.narrowing.max_rounds;
        for (i, round) in request.answers.iter().enumerate() {
            if i >= max_rounds {
                warn!(
                    given = request.answers.len(),
                    max_rounds, "ignoring answer rounds beyond the limit"
                );
                break;
            }
            session.answer(round);
        }
        session.outcome().await
    }
}
