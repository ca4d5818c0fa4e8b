//! Candidate Search: shortlist top-level branches, then search each one.
//!
//! Branch searches are independent and run concurrently on the blocking
//! pool; the only shared state they touch is the taxonomy's path cache.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tariffa_ai::heuristic::heuristic_branches;
use tariffa_ai::{BranchPick, BranchSummary};
use tariffa_core::vocab::keywords;
use tariffa_core::{Candidate, ProductUnderstanding, SearchConfig, ShortlistMode};
use tariffa_store::{StoreError, Taxonomy, TaxonomySearch};
use tracing::{debug, info};

/// Search terms: keywords of the product type, material and function.
pub fn search_terms(understanding: &ProductUnderstanding) -> Vec<String> {
    let mut terms = keywords(understanding.product_type());
    for value in [understanding.material(), understanding.function()].into_iter().flatten() {
        for k in keywords(value) {
            if !terms.contains(&k) {
                terms.push(k);
            }
        }
    }
    terms
}

/// Chapters of the taxonomy as oracle-facing summaries.
pub fn branch_summaries(taxonomy: &Taxonomy) -> Result<Vec<BranchSummary>, StoreError> {
    Ok(taxonomy
        .chapters()?
        .into_iter()
        .map(|n| BranchSummary {
            code: n.code,
            description: n.description,
        })
        .collect())
}

/// Combine oracle picks with the keyword table according to `mode`.
///
/// `Merged` lists oracle picks first, then table suggestions. `WideNet`
/// trusts the oracle alone and consults the table only when it gave nothing.
/// Only branches present in `chapters` survive; at most `max` are returned.
pub fn plan_branches(
    mode: ShortlistMode,
    oracle_picks: Option<Vec<BranchPick>>,
    understanding: &ProductUnderstanding,
    chapters: &[BranchSummary],
    max: usize,
) -> Vec<String> {
    let picks: Vec<String> = oracle_picks
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.code)
        .collect();
    let mut planned: Vec<String> = match mode {
        ShortlistMode::Merged => picks.into_iter().chain(heuristic_branches(understanding)).collect(),
        ShortlistMode::WideNet if picks.is_empty() => heuristic_branches(understanding),
        ShortlistMode::WideNet => picks,
    };

    let mut seen = HashSet::new();
    planned.retain(|c| chapters.iter().any(|b| &b.code == c) && seen.insert(c.clone()));
    planned.truncate(max);
    planned
}

/// Unscored leaf candidates of one search pass.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    pub total_found: usize,
    /// Narrowing-log entries produced by the search.
    pub notes: Vec<String>,
}

struct BranchHits {
    branch: String,
    candidates: Vec<Candidate>,
    sampled: bool,
}

fn search_branch(
    taxonomy: &Taxonomy,
    branch: &str,
    terms: &[String],
    config: &SearchConfig,
) -> Result<BranchHits, StoreError> {
    let query = TaxonomySearch::terms(terms.to_vec())
        .within(branch)
        .leaves()
        .limit(config.per_branch_limit);
    let mut nodes = taxonomy.store().search(&query)?;
    let sampled = nodes.is_empty();
    if sampled {
        let sample = TaxonomySearch::default()
            .within(branch)
            .leaves()
            .limit(config.sample_size);
        nodes = taxonomy.store().search(&sample)?;
    }

    let mut candidates = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let path = taxonomy.path(&node.code)?;
        candidates.push(Candidate::from_node(node, path.to_vec(), true, sampled));
    }
    Ok(BranchHits {
        branch: branch.to_string(),
        candidates,
        sampled,
    })
}

/// Search each branch concurrently; fall back to one unscoped search over the
/// raw description when no branch yields anything.
pub async fn search_branches(
    taxonomy: Arc<Taxonomy>,
    branches: &[String],
    terms: &[String],
    raw_description: &str,
    config: &SearchConfig,
) -> Result<SearchOutcome, StoreError> {
    let tasks = branches.iter().map(|branch| {
        let taxonomy = Arc::clone(&taxonomy);
        let branch = branch.clone();
        let terms = terms.to_vec();
        let config = config.clone();
        tokio::task::spawn_blocking(move || search_branch(&taxonomy, &branch, &terms, &config))
    });

    let mut outcome = SearchOutcome::default();
    let mut seen = HashSet::new();
    for joined in join_all(tasks).await {
        let hits = joined.map_err(|e| StoreError::Other(format!("branch search task failed: {e}")))??;
        debug!(
            branch = %hits.branch,
            hits = hits.candidates.len(),
            sampled = hits.sampled,
            "branch searched"
        );
        if hits.sampled && !hits.candidates.is_empty() {
            outcome
                .notes
                .push(format!("no keyword match in {}; sampled {} nodes", hits.branch, hits.candidates.len()));
        }
        for c in hits.candidates {
            if seen.insert(c.code.clone()) {
                outcome.candidates.push(c);
            }
        }
    }

    if outcome.candidates.is_empty() {
        let words = keywords(raw_description);
        info!(terms = ?words, "no branch yielded candidates; searching unscoped");
        outcome.notes.push("unscoped fallback search on raw description".to_string());
        if !words.is_empty() {
            let query = TaxonomySearch::terms(words).leaves().limit(config.bucket_limit);
            let nodes = {
                let taxonomy = Arc::clone(&taxonomy);
                tokio::task::spawn_blocking(move || -> Result<Vec<Candidate>, StoreError> {
                    let mut out = Vec::new();
                    for node in taxonomy.store().search(&query)? {
                        let path = taxonomy.path(&node.code)?;
                        out.push(Candidate::from_node(&node, path.to_vec(), false, false));
                    }
                    Ok(out)
                })
                .await
                .map_err(|e| StoreError::Other(format!("fallback search task failed: {e}")))??
            };
            outcome.candidates = nodes;
        }
    }

    outcome.total_found = outcome.candidates.len();
    info!(
        branches = branches.len(),
        found = outcome.total_found,
        "candidate search complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tariffa_core::UnderstandingSource;
    use tariffa_store::{MemoryStore, TaxonomyRow};

    fn taxonomy() -> Arc<Taxonomy> {
        let store = MemoryStore::from_rows(vec![
            TaxonomyRow::new("39", "Plastics and articles thereof"),
            TaxonomyRow::new("3924.10.40", "Drinking cups and mugs of plastics"),
            TaxonomyRow::new("69", "Ceramic products"),
            TaxonomyRow::new("6912", "Ceramic tableware"),
            TaxonomyRow::new("6912.00.44", "Mugs and other steins"),
            TaxonomyRow::new("6912.00.48", "Other ceramic tableware"),
            TaxonomyRow::new("73", "Articles of iron or steel"),
            TaxonomyRow::new("7323.93.00", "Household articles of stainless steel"),
        ])
        .unwrap();
        Arc::new(Taxonomy::new(Arc::new(store)))
    }

    fn mug() -> ProductUnderstanding {
        ProductUnderstanding::new("coffee mug", "coffee mug", UnderstandingSource::Oracle)
    }

    fn pick(code: &str) -> BranchPick {
        BranchPick {
            code: code.into(),
            reason: String::new(),
        }
    }

    #[test]
    fn terms_from_type_material_function() {
        let mut u = mug();
        u.state("material", "Stainless steel");
        u.infer("function", "Household or kitchen use");
        assert_eq!(
            search_terms(&u),
            vec!["coffee", "mug", "stainless", "steel", "household", "kitchen"]
        );
    }

    #[test]
    fn merged_puts_oracle_first_and_dedupes() {
        let chapters = branch_summaries(&taxonomy()).unwrap();
        let planned = plan_branches(ShortlistMode::Merged, Some(vec![pick("73"), pick("99")]), &mug(), &chapters, 5);
        assert_eq!(planned, vec!["73", "69", "39"]);
    }

    #[test]
    fn wide_net_uses_table_only_without_picks() {
        let chapters = branch_summaries(&taxonomy()).unwrap();
        assert_eq!(
            plan_branches(ShortlistMode::WideNet, Some(vec![pick("39")]), &mug(), &chapters, 5),
            vec!["39"]
        );
        assert_eq!(
            plan_branches(ShortlistMode::WideNet, None, &mug(), &chapters, 2),
            vec!["69", "39"]
        );
    }

    #[tokio::test]
    async fn leaves_only_with_sample_fallback() {
        let branches = vec!["69".to_string(), "73".to_string()];
        let out = search_branches(taxonomy(), &branches, &["mug".into()], "coffee mug", &SearchConfig::default())
            .await
            .unwrap();
        let codes: Vec<(&str, bool)> = out.candidates.iter().map(|c| (c.code.as_str(), c.sampled)).collect();
        assert_eq!(codes, vec![("69120044", false), ("73239300", true)]);
        assert_eq!(out.total_found, 2);
        assert_eq!(out.notes.len(), 1);
        assert_eq!(out.candidates[0].hierarchy_path.len(), 2);
    }

    #[tokio::test]
    async fn best_branch_match_survives_per_branch_limit() {
        let mut rows = vec![TaxonomyRow::new("69", "Ceramic products")];
        for i in 10..40 {
            rows.push(TaxonomyRow::new(&format!("6909.{i}.00"), "Ceramic wares for laboratory use"));
        }
        rows.push(TaxonomyRow::new("6912.00.44", "Coffee mugs of ceramic"));
        let taxonomy = Arc::new(Taxonomy::new(Arc::new(MemoryStore::from_rows(rows).unwrap())));

        let terms: Vec<String> = ["coffee", "mug", "ceramic"].map(String::from).to_vec();
        let out = search_branches(taxonomy, &["69".to_string()], &terms, "coffee mug", &SearchConfig::default())
            .await
            .unwrap();
        assert_eq!(out.total_found, SearchConfig::default().per_branch_limit);
        assert_eq!(out.candidates[0].code, "69120044");
    }

    #[tokio::test]
    async fn unscoped_fallback_when_branches_empty() {
        let out = search_branches(taxonomy(), &[], &[], "plastic drinking cups", &SearchConfig::default())
            .await
            .unwrap();
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].code, "39241040");
        assert!(!out.candidates[0].in_shortlist);
        assert_eq!(out.notes, vec!["unscoped fallback search on raw description"]);
    }
}
