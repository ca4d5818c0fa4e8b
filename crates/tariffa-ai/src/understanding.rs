//! Product Understanding: raw description in, partitioned attributes out.

use tariffa_core::vocab::attr;
use tariffa_core::{ProductUnderstanding, UnderstandingSource};
use tracing::{info, warn};

use crate::heuristic::heuristic_draft;
use crate::{OracleError, ReasoningOracle, UnderstandingDraft, UnderstandingRequest};

/// An understanding plus the oracle failure that forced the fallback, if any.
#[derive(Debug)]
pub struct Understood {
    pub understanding: ProductUnderstanding,
    pub fallback: Option<OracleError>,
}

/// Extract attributes with the oracle, falling back to the keyword heuristic.
///
/// Never fails: any oracle error yields a heuristic understanding and is
/// handed back in [`Understood::fallback`].
pub async fn understand(oracle: &dyn ReasoningOracle, request: &UnderstandingRequest) -> Understood {
    match oracle.understand(request).await {
        Ok(draft) => {
            let source = if oracle.is_heuristic() {
                UnderstandingSource::Heuristic
            } else {
                UnderstandingSource::Oracle
            };
            let understanding = from_draft(request, draft, source);
            info!(
                oracle = oracle.name(),
                product_type = understanding.product_type(),
                unknowns = understanding.unknowns().len(),
                "understood product"
            );
            Understood {
                understanding,
                fallback: None,
            }
        }
        Err(e) => {
            warn!(oracle = oracle.name(), error = %e, "understanding fell back to heuristic");
            let understanding =
                from_draft(request, heuristic_draft(request), UnderstandingSource::Heuristic);
            Understood {
                understanding,
                fallback: Some(e),
            }
        }
    }
}

/// Enforce the stated/inferred/unknown partition on an untrusted draft.
///
/// A "stated" value that does not occur in the input is demoted to
/// inferred. Hints are stated facts and override the draft.
pub fn from_draft(
    request: &UnderstandingRequest,
    draft: UnderstandingDraft,
    source: UnderstandingSource,
) -> ProductUnderstanding {
    let input = request.input_text();
    let product_type = if draft.product_type.trim().is_empty() {
        heuristic_draft(request).product_type
    } else {
        draft.product_type
    };
    let mut u = ProductUnderstanding::new(request.description.trim(), product_type, source);

    for (key, value) in &draft.stated {
        if input.contains(&value.trim().to_lowercase()) {
            u.state(key, value);
        } else {
            u.infer(key, value);
        }
    }
    for (key, value) in &draft.inferred {
        u.infer(key, value);
    }
    if let Some(material) = &request.material {
        u.state(attr::MATERIAL, material);
    }
    if let Some(use_hint) = &request.intended_use {
        u.state(attr::FUNCTION, use_hint);
    }
    for key in &draft.unknowns {
        u.mark_unknown(key);
    }
    u
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BranchPick, BranchSummary, CodeSelection, HeuristicOracle};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tariffa_core::Candidate;

    struct Scripted(Result<UnderstandingDraft, ()>);

    #[async_trait]
    impl ReasoningOracle for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn understand(&self, _: &UnderstandingRequest) -> Result<UnderstandingDraft, OracleError> {
            self.0
                .clone()
                .map_err(|_| OracleError::Malformed("garbage".into()))
        }

        async fn shortlist_branches(
            &self,
            _: &ProductUnderstanding,
            _: &[BranchSummary],
            _: usize,
        ) -> Result<Vec<BranchPick>, OracleError> {
            Ok(vec![])
        }

        async fn select_code(&self, _: &ProductUnderstanding, _: &[Candidate]) -> Result<CodeSelection, OracleError> {
            Err(OracleError::RateLimited)
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn unsupported_stated_fact_is_demoted() {
        let oracle = Scripted(Ok(UnderstandingDraft {
            product_type: "mug".into(),
            stated: map(&[("material", "porcelain"), ("function", "drinking")]),
            inferred: map(&[("audience", "adults")]),
            unknowns: vec!["material".into(), "construction".into()],
        }));
        let req = UnderstandingRequest::new("mug for drinking coffee");
        let out = understand(&oracle, &req).await;
        let u = out.understanding;
        assert!(out.fallback.is_none());
        assert_eq!(u.source(), UnderstandingSource::Oracle);
        assert_eq!(u.stated().get("function").map(String::as_str), Some("drinking"));
        assert_eq!(u.inferred().get("material").map(String::as_str), Some("porcelain"));
        // Known keys never linger in unknowns.
        assert_eq!(u.unknowns().iter().collect::<Vec<_>>(), vec!["construction"]);
    }

    #[tokio::test]
    async fn hints_override_draft() {
        let oracle = Scripted(Ok(UnderstandingDraft {
            product_type: "mug".into(),
            inferred: map(&[("material", "glass")]),
            ..UnderstandingDraft::default()
        }));
        let mut req = UnderstandingRequest::new("coffee mug");
        req.material = Some("Ceramic".into());
        let u = understand(&oracle, &req).await.understanding;
        assert_eq!(u.stated().get("material").map(String::as_str), Some("Ceramic"));
        assert!(u.inferred().get("material").is_none());
    }

    #[tokio::test]
    async fn oracle_failure_falls_back() {
        let out = understand(&Scripted(Err(())), &UnderstandingRequest::new("coffee mug")).await;
        assert!(matches!(out.fallback, Some(OracleError::Malformed(_))));
        assert_eq!(out.understanding.source(), UnderstandingSource::Heuristic);
        assert_eq!(out.understanding.product_type(), "mug");
        assert!(out.understanding.unknowns().contains("material"));
    }

    #[tokio::test]
    async fn heuristic_oracle_marks_source() {
        let out = understand(&HeuristicOracle, &UnderstandingRequest::new("ceramic mug")).await;
        assert!(out.fallback.is_none());
        assert_eq!(out.understanding.source(), UnderstandingSource::Heuristic);
        assert_eq!(out.understanding.material(), Some("ceramic"));
    }
}
