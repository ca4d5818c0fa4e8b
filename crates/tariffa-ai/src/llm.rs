//! Oracle backed by a language-model completion service.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tariffa_core::{Candidate, OracleSettings, ProductUnderstanding, normalize_code};
use tracing::{debug, warn};

use crate::decode::decode;
use crate::{
    BranchPick, BranchSummary, CodeSelection, CompletionRequest, CompletionService, OracleError,
    ReasoningOracle, UnderstandingDraft, UnderstandingRequest,
};

// ── Prompt templates ──

const UNDERSTAND_PROMPT: &str = "\
You are a customs classification analyst. Extract the attributes of a product that \
determine its tariff classification.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"product_type\": \"the kind of article, e.g. 'coffee mug'\",
  \"stated\": { \"attribute\": \"value explicitly present in the input\" },
  \"inferred\": { \"attribute\": \"value reasonably deduced but not written\" },
  \"unknowns\": [\"attributes needed for classification but absent\"]
}

Use these attribute keys: material, function, construction, audience, power_source.
An attribute appears in at most one of stated, inferred and unknowns.
If the material is not written in the input, list it under unknowns.";

const SHORTLIST_PROMPT: &str = "\
You are a customs classification analyst. Given a product and a list of tariff \
chapters, choose the chapters most likely to contain its classification.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"branches\": [ { \"code\": \"two-digit chapter code from the list\", \"reason\": \"one sentence\" } ]
}

Order the branches most likely first. Only use codes from the list.";

const SELECT_PROMPT: &str = "\
You are a customs classification analyst. Given a product and candidate tariff codes, \
choose the single best code.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"code\": \"the chosen code exactly as listed\",
  \"confidence\": a number between 0 and 1,
  \"reasoning\": \"one or two sentences\"
}

Prefer the most specific description that fits every known attribute.";

fn understand_prompt(request: &UnderstandingRequest) -> String {
    format!(
        "Description: {description}\n\
         Material hint: {material}\n\
         Intended use hint: {intended_use}",
        description = request.description.trim(),
        material = request.material.as_deref().unwrap_or("none"),
        intended_use = request.intended_use.as_deref().unwrap_or("none"),
    )
}

fn describe(understanding: &ProductUnderstanding) -> String {
    let mut lines = vec![
        format!("Description: {}", understanding.raw_description()),
        format!("Product type: {}", understanding.product_type()),
    ];
    for (k, v) in understanding.stated() {
        lines.push(format!("Stated {k}: {v}"));
    }
    for (k, v) in understanding.inferred() {
        lines.push(format!("Inferred {k}: {v}"));
    }
    if !understanding.unknowns().is_empty() {
        let unknown: Vec<&str> = understanding.unknowns().iter().map(String::as_str).collect();
        lines.push(format!("Unknown: {}", unknown.join(", ")));
    }
    lines.join("\n")
}

fn shortlist_prompt(understanding: &ProductUnderstanding, branches: &[BranchSummary], limit: usize) -> String {
    let list: Vec<String> = branches
        .iter()
        .map(|b| format!("{} {}", b.code, b.description))
        .collect();
    format!(
        "{product}\n\nChoose at most {limit} chapters:\n{list}",
        product = describe(understanding),
        list = list.join("\n"),
    )
}

fn select_prompt(understanding: &ProductUnderstanding, candidates: &[Candidate]) -> String {
    let list: Vec<String> = candidates
        .iter()
        .map(|c| format!("{} {} (path: {})", c.formatted_code, c.description, c.path_text()))
        .collect();
    format!(
        "{product}\n\nCandidates:\n{list}",
        product = describe(understanding),
        list = list.join("\n"),
    )
}

#[derive(Deserialize)]
struct ShortlistResponse {
    branches: Vec<BranchPick>,
}

/// [`ReasoningOracle`] over any [`CompletionService`].
///
/// Each call is bounded by `settings.timeout()` and retried up to
/// `settings.max_attempts` times on retryable failures, sleeping a linearly
/// growing backoff in between.
pub struct LlmOracle<S> {
    service: S,
    settings: OracleSettings,
}

impl<S: CompletionService> LlmOracle<S> {
    pub fn new(service: S, settings: OracleSettings) -> Self {
        Self { service, settings }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Complete, decode the reply as `R`, then check and convert it into `T`.
    async fn call<R, T, F>(&self, op: &'static str, system: &str, prompt: String, check: F) -> Result<T, OracleError>
    where
        R: DeserializeOwned,
        F: Fn(R) -> Result<T, OracleError>,
    {
        let request = CompletionRequest {
            system: system.to_string(),
            prompt,
            max_tokens: self.settings.max_tokens,
        };
        let attempts = self.settings.max_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(self.settings.timeout(), self.service.complete(&request)).await {
                Ok(Ok(text)) => decode::<R>(&text).and_then(&check),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(OracleError::Timeout(self.settings.timeout())),
            };
            match result {
                Ok(value) => {
                    debug!(op, attempt, "oracle call succeeded");
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(op, attempt, error = %e, "oracle call failed");
                    last = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.backoff() * attempt).await;
                    }
                }
            }
        }

        Err(OracleError::Exhausted {
            attempts,
            last: Box::new(last.unwrap_or_else(|| OracleError::Malformed("no attempt made".into()))),
        })
    }
}

#[async_trait]
impl<S: CompletionService> ReasoningOracle for LlmOracle<S> {
    fn name(&self) -> &str {
        "llm"
    }

    async fn understand(&self, request: &UnderstandingRequest) -> Result<UnderstandingDraft, OracleError> {
        self.call("understand", UNDERSTAND_PROMPT, understand_prompt(request), |d: UnderstandingDraft| {
            if d.product_type.trim().is_empty() {
                return Err(OracleError::Malformed("empty product_type".into()));
            }
            Ok(d)
        })
        .await
    }

    async fn shortlist_branches(
        &self,
        understanding: &ProductUnderstanding,
        branches: &[BranchSummary],
        limit: usize,
    ) -> Result<Vec<BranchPick>, OracleError> {
        let offered: BTreeSet<&str> = branches.iter().map(|b| b.code.as_str()).collect();
        let prompt = shortlist_prompt(understanding, branches, limit);
        self.call("shortlist", SHORTLIST_PROMPT, prompt, |r: ShortlistResponse| {
            let mut picks: Vec<BranchPick> = Vec::new();
            for pick in r.branches {
                let code = pick.code.trim().to_string();
                if !offered.contains(code.as_str()) {
                    return Err(OracleError::Malformed(format!("branch {code} was not offered")));
                }
                if !picks.iter().any(|p| p.code == code) {
                    picks.push(BranchPick { code, reason: pick.reason });
                }
            }
            if picks.is_empty() {
                return Err(OracleError::Malformed("no branches chosen".into()));
            }
            picks.truncate(limit);
            Ok(picks)
        })
        .await
    }

    async fn select_code(
        &self,
        understanding: &ProductUnderstanding,
        candidates: &[Candidate],
    ) -> Result<CodeSelection, OracleError> {
        let prompt = select_prompt(understanding, candidates);
        self.call("select", SELECT_PROMPT, prompt, |s: CodeSelection| {
            let code = normalize_code(&s.code).map_err(|e| OracleError::Malformed(e.to_string()))?;
            if !(0.0..=1.0).contains(&s.confidence) {
                return Err(OracleError::Malformed(format!("confidence {} out of range", s.confidence)));
            }
            Ok(CodeSelection { code, ..s })
        })
        .await
    }
}
