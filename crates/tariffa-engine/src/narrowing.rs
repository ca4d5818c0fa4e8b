//! Narrowing Controller: decide whether a bucket is settled and, if not,
//! which questions would shrink it.

use tariffa_core::vocab::{self, attr};
use tariffa_core::{Candidate, CandidateBucket, NarrowingConfig, NarrowingQuestion, ProductUnderstanding};

/// Where a session stands after scoring.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Confident,
    NeedsInput(Vec<NarrowingQuestion>),
    /// Best-so-far is returned without further questions.
    Ambiguous,
}

/// Candidates at or above the viability floor.
pub fn viable_count(bucket: &CandidateBucket, config: &NarrowingConfig) -> usize {
    bucket
        .candidates()
        .iter()
        .filter(|c| c.confidence >= config.min_viable)
        .count()
}

/// The leader's confidence is above the threshold with a clear margin over
/// the best other candidate.
///
/// The leader is normally the bucket top; after an oracle selection it is
/// the selected candidate, which may rank lower.
pub fn is_confident(bucket: &CandidateBucket, leader: &Candidate, config: &NarrowingConfig) -> bool {
    let runner_up = bucket
        .candidates()
        .iter()
        .filter(|c| c.code != leader.code)
        .map(|c| c.confidence)
        .fold(0.0_f32, f32::max);
    leader.confidence > config.confident_threshold
        && leader.confidence - runner_up >= config.confident_margin
}

pub fn decide(
    bucket: &CandidateBucket,
    leader: &Candidate,
    understanding: &ProductUnderstanding,
    rounds: usize,
    config: &NarrowingConfig,
    deadline_hit: bool,
) -> Decision {
    if deadline_hit {
        return Decision::Ambiguous;
    }
    if is_confident(bucket, leader, config) {
        return Decision::Confident;
    }
    if rounds >= config.max_rounds {
        return Decision::Ambiguous;
    }
    if understanding.unknowns().is_empty() || viable_count(bucket, config) <= 1 {
        return Decision::Ambiguous;
    }
    let questions = questions(bucket, understanding, config.max_questions);
    if questions.is_empty() {
        Decision::Ambiguous
    } else {
        Decision::NeedsInput(questions)
    }
}

/// One question per unknown attribute, material first, then by impact.
pub fn questions(
    bucket: &CandidateBucket,
    understanding: &ProductUnderstanding,
    max_questions: usize,
) -> Vec<NarrowingQuestion> {
    let mut drafts: Vec<NarrowingQuestion> = understanding
        .unknowns()
        .iter()
        .map(|attribute| question_for(bucket, attribute))
        .collect();

    drafts.sort_by(|a, b| {
        (b.attribute == attr::MATERIAL)
            .cmp(&(a.attribute == attr::MATERIAL))
            .then_with(|| b.impact_estimate.cmp(&a.impact_estimate))
            .then_with(|| a.attribute.cmp(&b.attribute))
    });
    drafts.truncate(max_questions);
    for (i, q) in drafts.iter_mut().enumerate() {
        q.priority = u8::try_from(i + 1).unwrap_or(u8::MAX);
    }
    drafts
}

fn question_for(bucket: &CandidateBucket, attribute: &str) -> NarrowingQuestion {
    let (options, impact) = match vocab::vocabulary(attribute) {
        Some(groups) => {
            let (options, impact) = discriminating_options(bucket, groups);
            if options.is_empty() {
                (groups.iter().map(|g| g.label.to_string()).collect(), 0)
            } else {
                (options, impact)
            }
        }
        // No vocabulary: free-text answer.
        None => (Vec::new(), 0),
    };
    NarrowingQuestion {
        id: format!("q-{attribute}"),
        attribute: attribute.to_string(),
        question_text: question_text(attribute),
        options,
        impact_estimate: impact,
        priority: 0,
    }
}

/// Labels named by some but not all candidates, and the mean number of
/// candidates each one would eliminate.
fn discriminating_options(bucket: &CandidateBucket, groups: &[vocab::TermGroup]) -> (Vec<String>, usize) {
    let mentions: Vec<Vec<&str>> = bucket
        .candidates()
        .iter()
        .map(|c| vocab::groups_in(&c.path_text(), groups).iter().map(|g| g.label).collect())
        .collect();
    let total = mentions.len();

    let mut options = Vec::new();
    let mut eliminated = 0;
    for group in groups {
        let naming = mentions.iter().filter(|m| m.contains(&group.label)).count();
        if naming == 0 || naming == total {
            continue;
        }
        // Candidates naming only other labels drop out when this one is chosen.
        eliminated += mentions
            .iter()
            .filter(|m| !m.is_empty() && !m.contains(&group.label))
            .count();
        options.push(group.label.to_string());
    }
    let impact = if options.is_empty() {
        0
    } else {
        (eliminated as f32 / options.len() as f32).round() as usize
    };
    (options, impact)
}

fn question_text(attribute: &str) -> String {
    match attribute {
        attr::MATERIAL => "What is the product made of?".to_string(),
        attr::FUNCTION => "What is the product's primary use?".to_string(),
        attr::CONSTRUCTION => "How is the product made (knitted, woven, molded, cast)?".to_string(),
        attr::AUDIENCE => "Who is the product intended for?".to_string(),
        attr::POWER_SOURCE => "How is the product powered?".to_string(),
        attr::PRODUCT_TYPE => "What kind of product is it?".to_string(),
        other => format!("What is the product's {}?", other.replace('_', " ")),
    }
}
