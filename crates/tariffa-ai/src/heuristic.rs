//! Deterministic keyword tables standing in for the oracle.
//!
//! Used as the static half of the merged branch shortlist, as the fallback
//! when the oracle fails, and as a swappable oracle in tests.

use async_trait::async_trait;
use tariffa_core::vocab::{self, AUDIENCES, BODY_WORN, FUNCTIONS, MATERIALS, attr};
use tariffa_core::{Candidate, ProductUnderstanding, UnderstandingSource, rank};

use crate::{
    BranchPick, BranchSummary, CodeSelection, OracleError, ReasoningOracle, UnderstandingDraft,
    UnderstandingRequest,
};

/// Product nouns and the chapters they usually fall in, most likely first.
const PRODUCT_HINTS: &[(&str, &[&str])] = &[
    ("mug", &["69", "70", "39", "73"]),
    ("cup", &["69", "70", "39", "73"]),
    ("plate", &["69", "70", "39", "73"]),
    ("bowl", &["69", "70", "39", "73"]),
    ("tableware", &["69", "70", "39", "73"]),
    ("bottle", &["70", "39", "73"]),
    ("ring", &["71", "40", "39"]),
    ("necklace", &["71"]),
    ("bracelet", &["71"]),
    ("earring", &["71"]),
    ("jewelry", &["71"]),
    ("shirt", &["61", "62"]),
    ("sweater", &["61"]),
    ("jacket", &["62", "61"]),
    ("trousers", &["62", "61"]),
    ("dress", &["62", "61"]),
    ("shoe", &["64"]),
    ("boot", &["64"]),
    ("toy", &["95"]),
    ("doll", &["95"]),
    ("puzzle", &["95"]),
    ("chair", &["94"]),
    ("table", &["94"]),
    ("lamp", &["94", "85"]),
    ("cable", &["85"]),
    ("charger", &["85"]),
    ("phone", &["85"]),
    ("pump", &["84"]),
    ("valve", &["84"]),
    ("bearing", &["84"]),
    ("gasket", &["40", "84"]),
    ("seal", &["40", "84"]),
    ("tire", &["40"]),
    ("knife", &["82"]),
    ("spoon", &["82"]),
    ("bag", &["42"]),
    ("backpack", &["42"]),
    ("book", &["49"]),
];

/// Chapter most associated with each material label.
const MATERIAL_CHAPTERS: &[(&str, &str)] = &[
    ("Ceramic", "69"),
    ("Glass", "70"),
    ("Plastic", "39"),
    ("Rubber", "40"),
    ("Steel", "73"),
    ("Aluminum", "76"),
    ("Copper alloy", "74"),
    ("Precious metal", "71"),
    ("Wood", "44"),
    ("Paper", "48"),
    ("Cotton", "52"),
    ("Synthetic fiber", "54"),
    ("Wool", "51"),
    ("Leather", "42"),
    ("Stone", "68"),
];

/// The product noun of `text` with its chapter hints, if one is known.
fn product_hint(text: &str) -> Option<(&'static str, &'static [&'static str])> {
    let words = vocab::tokenize(text);
    // Rightmost noun wins: "ceramic coffee mug" is a mug, "mug warmer" is not.
    words
        .iter()
        .rev()
        .find_map(|w| PRODUCT_HINTS.iter().find(|(term, _)| vocab::contains_phrase(w, term)))
        .copied()
}

/// Chapters suggested by the product type and material, most likely first.
pub fn heuristic_branches(understanding: &ProductUnderstanding) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let text = format!("{} {}", understanding.product_type(), understanding.raw_description());

    if let Some(material) = understanding.material()
        && let Some(group) = vocab::group_for(attr::MATERIAL, material)
        && let Some((_, chapter)) = MATERIAL_CHAPTERS.iter().find(|(label, _)| *label == group.label)
    {
        out.push(chapter.to_string());
    }
    if let Some((_, chapters)) = product_hint(&text) {
        for c in chapters.iter() {
            if !out.iter().any(|o| o == c) {
                out.push(c.to_string());
            }
        }
    }
    for group in vocab::groups_in(&text, MATERIALS) {
        if let Some((_, chapter)) = MATERIAL_CHAPTERS.iter().find(|(label, _)| *label == group.label)
            && !out.iter().any(|o| o == chapter)
        {
            out.push(chapter.to_string());
        }
    }
    out
}

/// Attribute extraction by table lookup.
///
/// Materials and audiences named in the text or hints are stated; a
/// body-worn phrase implies personal adornment. A missing material is
/// recorded as unknown.
pub fn heuristic_draft(request: &UnderstandingRequest) -> UnderstandingDraft {
    let description = request.description.trim();
    let mut draft = UnderstandingDraft {
        product_type: match product_hint(description) {
            Some((term, _)) => term.to_string(),
            None => vocab::keywords(description).last().cloned().unwrap_or_default(),
        },
        ..UnderstandingDraft::default()
    };

    let material = request.material.clone().or_else(|| {
        MATERIALS
            .iter()
            .flat_map(|g| g.terms.iter())
            .find(|t| vocab::contains_phrase(description, t))
            .map(|t| t.to_string())
    });
    match material {
        Some(m) => {
            draft.stated.insert(attr::MATERIAL.to_string(), m);
        }
        None => draft.unknowns.push(attr::MATERIAL.to_string()),
    }

    if let Some(use_hint) = &request.intended_use {
        draft.stated.insert(attr::FUNCTION.to_string(), use_hint.clone());
    } else if let Some(group) = vocab::groups_in(description, FUNCTIONS).first() {
        draft.inferred.insert(attr::FUNCTION.to_string(), group.label.to_string());
    } else if BODY_WORN.mentioned_in(description) {
        draft.inferred.insert(attr::FUNCTION.to_string(), "Personal adornment".to_string());
    }

    if let Some(group) = vocab::groups_in(description, AUDIENCES).first() {
        draft.inferred.insert(attr::AUDIENCE.to_string(), group.label.to_string());
    }
    draft
}

/// Oracle that answers from the keyword tables. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    /// A full understanding without any oracle involvement.
    pub fn understanding(request: &UnderstandingRequest) -> ProductUnderstanding {
        crate::understanding::from_draft(request, heuristic_draft(request), UnderstandingSource::Heuristic)
    }
}

#[async_trait]
impl ReasoningOracle for HeuristicOracle {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn is_heuristic(&self) -> bool {
        true
    }

    async fn understand(&self, request: &UnderstandingRequest) -> Result<UnderstandingDraft, OracleError> {
        Ok(heuristic_draft(request))
    }

    async fn shortlist_branches(
        &self,
        understanding: &ProductUnderstanding,
        branches: &[BranchSummary],
        limit: usize,
    ) -> Result<Vec<BranchPick>, OracleError> {
        Ok(heuristic_branches(understanding)
            .into_iter()
            .filter(|c| branches.iter().any(|b| &b.code == c))
            .take(limit)
            .map(|code| BranchPick {
                code,
                reason: "keyword table".to_string(),
            })
            .collect())
    }

    async fn select_code(
        &self,
        _understanding: &ProductUnderstanding,
        candidates: &[Candidate],
    ) -> Result<CodeSelection, OracleError> {
        let best = candidates
            .iter()
            .min_by(|a, b| rank(a, b))
            .ok_or_else(|| OracleError::Malformed("no candidates to select from".into()))?;
        Ok(CodeSelection {
            code: best.code.clone(),
            confidence: best.confidence,
            reasoning: "highest scored candidate".to_string(),
        })
    }
}
