//! Confidence Scorer.
//!
//! `confidence = keyword·overlap + material + hierarchy·coherence + specificity·s`
//! where `overlap` is the share of search terms found in the candidate's
//! path text, `material` is the exact or substring material bonus,
//! `coherence` is 1 inside a shortlisted branch, and `s` blends code depth
//! with description length. Zero-match samples are scaled down.

use tariffa_core::vocab::{self, attr};
use tariffa_core::{Candidate, CandidateBucket, ProductUnderstanding, ScoringWeights};
use tracing::{debug, info};

use crate::search::search_terms;

/// Description length at which the length half of specificity saturates.
const SPECIFIC_DESCRIPTION_LEN: f32 = 80.0;

pub struct Scorer<'a> {
    weights: &'a ScoringWeights,
}

impl<'a> Scorer<'a> {
    pub fn new(weights: &'a ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score a fresh candidate against the understanding.
    pub fn score(&self, understanding: &ProductUnderstanding, candidate: &Candidate) -> Candidate {
        let w = self.weights;
        let text = candidate.path_text();
        let terms = search_terms(understanding);

        let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
        let overlap = if terms.is_empty() {
            0.0
        } else {
            matched as f32 / terms.len() as f32
        };

        let (material, material_note) = match understanding.material() {
            Some(m) if material_exact(&text, m) => (w.material_exact, "material exact"),
            Some(m) if text.contains(&m.trim().to_lowercase()) => (w.material_substring, "material substring"),
            Some(_) => (0.0, "material absent"),
            None => (0.0, "material unknown"),
        };

        let coherence = if candidate.in_shortlist { 1.0 } else { 0.0 };
        let specificity = specificity(candidate);

        let mut confidence =
            w.keyword * overlap + material + w.hierarchy * coherence + w.specificity * specificity;
        if candidate.sampled {
            confidence *= w.sample_penalty;
        }

        let note = format!(
            "keywords {matched}/{}, {material_note}, {}, specificity {specificity:.2}{}",
            terms.len(),
            if candidate.in_shortlist { "shortlisted branch" } else { "outside shortlist" },
            if candidate.sampled { ", branch sample" } else { "" },
        );
        candidate.rescored(confidence, &note)
    }

    /// Score every candidate and annotate what would confirm or eliminate each.
    pub fn score_all(&self, understanding: &ProductUnderstanding, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut scored: Vec<Candidate> = candidates.iter().map(|c| self.score(understanding, c)).collect();
        annotate(understanding, &mut scored);
        scored
    }

    /// Apply one narrowing answer.
    ///
    /// Candidates consistent with the answer are boosted; candidates whose
    /// text names only other values of the same attribute are removed. The
    /// candidate count never grows and the top confidence never drops. If
    /// every candidate contradicts the answer, the bucket is kept as is.
    pub fn refine(&self, bucket: &CandidateBucket, attribute: &str, answer: &str) -> CandidateBucket {
        let key = attribute.trim().to_lowercase().replace([' ', '-'], "_");
        let groups = vocab::vocabulary(&key);
        let chosen = vocab::group_for(&key, answer);
        let old_top = bucket.top_confidence();
        let before = bucket.len();

        let mut survivors = Vec::with_capacity(before);
        for c in bucket.candidates() {
            let text = c.path_text();
            let consistent = match chosen {
                Some(g) => g.mentioned_in(&text),
                None => vocab::contains_phrase(&text, answer),
            };
            let contradicts = match (chosen, groups) {
                (Some(ch), Some(gs)) if !consistent => {
                    vocab::groups_in(&text, gs).iter().any(|g| g.label != ch.label)
                }
                _ => false,
            };

            if contradicts {
                debug!(code = %c.code, %key, %answer, "candidate contradicts answer");
                continue;
            }
            if consistent {
                let boosted = c.confidence * self.weights.answer_boost;
                survivors.push(c.rescored(boosted, &format!("consistent with {key}={answer}")));
            } else {
                survivors.push(c.clone());
            }
        }

        let mut refined = bucket.clone();
        if survivors.is_empty() {
            info!(%key, %answer, "answer contradicts every candidate; keeping bucket");
            refined.record(format!("{key}={answer} contradicts all {before} candidates; kept"));
            return refined;
        }

        let new_top = survivors.iter().map(|c| c.confidence).fold(0.0_f32, f32::max);
        if new_top < old_top && new_top > 0.0 {
            let factor = old_top / new_top;
            survivors = survivors
                .iter()
                .map(|c| {
                    let scaled = if c.confidence >= new_top {
                        old_top
                    } else {
                        (c.confidence * factor).min(old_top)
                    };
                    c.rescored(scaled, "rescaled after previous top was eliminated")
                })
                .collect();
        }

        let removed = before - survivors.len();
        refined.replace_candidates(survivors);
        refined.record(format!("{key}={answer}: removed {removed} of {before}"));
        info!(%key, %answer, removed, remaining = refined.len(), "applied answer");
        refined
    }

    /// Raise confidence toward 1 in proportion to the oracle's own confidence.
    pub fn endorse(&self, candidate: &Candidate, oracle_confidence: f32) -> Candidate {
        let c = candidate.confidence;
        let raised = c + (1.0 - c) * oracle_confidence.clamp(0.0, 1.0) * self.weights.endorsement_weight;
        candidate.rescored(raised, &format!("oracle endorsed at {oracle_confidence:.2}"))
    }
}

/// Word-bounded match of the material or any synonym of its group.
fn material_exact(text: &str, material: &str) -> bool {
    match vocab::group_for(attr::MATERIAL, material) {
        Some(group) => group.mentioned_in(text),
        None => vocab::contains_phrase(text, material),
    }
}

/// Half code depth, half description length; both in [0, 1].
pub fn specificity(candidate: &Candidate) -> f32 {
    let depth = candidate.code.len() as f32 / 10.0;
    let length = (candidate.description.chars().count() as f32 / SPECIFIC_DESCRIPTION_LEN).min(1.0);
    0.5 * depth + 0.5 * length
}

/// Fill `required_info` and `eliminating_info` for unknown attributes that
/// have a vocabulary: a candidate requires the values its text names and is
/// eliminated by values other candidates name but it does not.
fn annotate(understanding: &ProductUnderstanding, candidates: &mut [Candidate]) {
    for key in understanding.unknowns() {
        let Some(groups) = vocab::vocabulary(key) else {
            continue;
        };
        let mentioned: Vec<Vec<&str>> = candidates
            .iter()
            .map(|c| vocab::groups_in(&c.path_text(), groups).iter().map(|g| g.label).collect())
            .collect();
        let all: Vec<&str> = {
            let mut all: Vec<&str> = mentioned.iter().flatten().copied().collect();
            all.sort_unstable();
            all.dedup();
            all
        };
        for (c, own) in candidates.iter_mut().zip(&mentioned) {
            if own.is_empty() {
                continue;
            }
            c.required_info.extend(own.iter().map(|l| format!("{key}={l}")));
            c.eliminating_info
                .extend(all.iter().filter(|l| !own.contains(l)).map(|l| format!("{key}={l}")));
        }
    }
}
