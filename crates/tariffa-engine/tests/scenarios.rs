mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use std::time::Duration;

use common::{
    GarbageService, ScriptedOracle, assert_close, config, engine, engine_over, rows, taxonomy_from,
};
use tariffa_ai::{HeuristicOracle, LlmOracle};
use tariffa_core::{ClassificationStatus, RatePct, ShortlistMode};
use tariffa_engine::{AnswerRound, ClassifyOutcome, ClassifyRequest, NO_MATCH_MESSAGE};

fn mug_oracle() -> ScriptedOracle {
    ScriptedOracle::new("coffee mug")
        .unknown("material")
        .shortlist(&["69", "70", "39", "73"])
        .selects("6912004410", 0.9)
}

fn ring_oracle() -> ScriptedOracle {
    ScriptedOracle::new("ring")
        .stated("material", "rubber")
        .shortlist(&["40", "87"])
        .selects("40169350", 0.9)
}

#[tokio::test]
async fn mug_asks_for_material_then_settles_on_ceramic() {
    let engine = engine(Arc::new(mug_oracle()), config());
    let request = ClassifyRequest::new("ceramic coffee mug").with_origin("CN");

    let first = engine.classify(&request).await.unwrap();
    let ClassifyOutcome::NeedsInput { questions, best_so_far } = &first else {
        panic!("expected a question, got {first:?}");
    };
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].attribute, "material");
    assert_eq!(questions[0].options, vec!["Ceramic", "Glass", "Plastic", "Steel"]);
    assert_eq!(questions[0].impact_estimate, 3);
    assert_eq!(best_so_far.status, ClassificationStatus::NeedsInput);
    assert_eq!(best_so_far.selected_code, "6912004410");
    assert_close(best_so_far.confidence, 0.78465);
    assert_eq!(best_so_far.alternatives.len(), 3);

    let answered = request.with_answers([("material", "Ceramic")]);
    let second = engine.classify(&answered).await.unwrap();
    let ClassifyOutcome::Classified(result) = &second else {
        panic!("expected a classification, got {second:?}");
    };
    assert_eq!(result.status, ClassificationStatus::Confident);
    assert_eq!(result.selected_code, "6912004410");
    assert_eq!(result.formatted_code, "6912.00.44.10");
    assert_close(result.confidence, 0.939);
    assert!(result.alternatives.is_empty());
    assert!(result.rationale.contains("material=Ceramic: removed 3 of 4"));
    assert_eq!(result.hierarchy_path.len(), 4);
    assert_eq!(result.hierarchy_path[0].code, "69");
}

#[tokio::test]
async fn answer_restricts_bucket_to_ceramic_branch() {
    let engine = engine(Arc::new(mug_oracle()), config());
    let mut session = engine.start(ClassifyRequest::new("ceramic coffee mug")).await.unwrap();
    assert!(session.understanding().unknowns().contains("material"));
    assert_eq!(session.bucket().len(), 4);
    assert_eq!(session.branches(), ["69", "70", "39", "73"]);

    let answers = AnswerRound::from([("material".to_string(), "Ceramic".to_string())]);
    session.answer(&answers);
    assert!(session.understanding().unknowns().is_empty());
    assert!(session.bucket().candidates().iter().all(|c| c.code.starts_with("69")));
}

#[tokio::test]
async fn duty_for_classified_code_inherits_and_stacks() {
    let engine = engine(Arc::new(mug_oracle()), config());
    let request = ClassifyRequest::new("ceramic coffee mug")
        .with_origin("CN")
        .with_answers([("material", "Ceramic")]);
    let outcome = engine.classify(&request).await.unwrap();
    let duty = outcome.result().unwrap().duty_rate.clone().unwrap();

    assert_eq!(duty.general_rate, "5%");
    assert!(duty.rate_source.inherited);
    assert_eq!(duty.rate_source.code.as_deref(), Some("691200"));
    assert!(duty.notes.iter().any(|n| n.contains("inherited from 6912.00")));
    assert_eq!(duty.additional_total, RatePct::from_percent(45.0));
    assert_eq!(duty.effective_rate, RatePct::from_percent(50.0));
    assert_eq!(duty.special_programs.len(), 3);
}

#[tokio::test]
async fn body_worn_ring_is_moved_out_of_vehicle_parts() {
    let mut cfg = config();
    cfg.search.mode = ShortlistMode::WideNet;
    let engine = engine(Arc::new(ring_oracle()), cfg);

    let outcome = engine
        .classify(&ClassifyRequest::new("rubber ring worn on finger"))
        .await
        .unwrap();
    let ClassifyOutcome::Classified(result) = &outcome else {
        panic!("expected a classification, got {outcome:?}");
    };
    assert_eq!(result.selected_code, "71179090");
    assert_eq!(result.status, ClassificationStatus::Confident);
    assert_close(result.confidence, 0.985);
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.starts_with("body-worn-vs-vehicle-part") && w.contains("4016.93.50"))
    );
    assert!(result.rationale.contains("re-searched [7117]"));
    for alt in &result.alternatives {
        let desc = alt.description.to_lowercase();
        assert!(!desc.contains("motor vehicle") && !desc.contains("automotive"));
    }
    assert_eq!(result.duty_rate.as_ref().unwrap().general_rate, "11%");
}

#[tokio::test]
async fn merged_shortlist_also_lands_in_imitation_jewelry() {
    let engine = engine(Arc::new(ring_oracle()), config());
    let outcome = engine
        .classify(&ClassifyRequest::new("rubber ring worn on finger"))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.selected_code, "71179090");
    assert!(result.warnings.iter().any(|w| w.starts_with("body-worn-vs-vehicle-part")));
}

fn wide_net() -> tariffa_core::EngineConfig {
    let mut cfg = config();
    cfg.search.mode = ShortlistMode::WideNet;
    cfg
}

#[tokio::test]
async fn ring_keeps_original_when_jewelry_branch_is_missing() {
    let without_71 = rows().into_iter().filter(|r| !r.code.starts_with("71")).collect();
    let engine = engine_over(taxonomy_from(without_71), Arc::new(ring_oracle()), wide_net());

    let outcome = engine
        .classify(&ClassifyRequest::new("rubber ring worn on finger"))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.selected_code, "40169350");
    assert!(result.warnings.iter().any(|w| w.starts_with("body-worn-vs-vehicle-part")));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("no suggested branch exists") && w.contains("original result kept"))
    );
}

#[tokio::test]
async fn ring_keeps_original_when_jewelry_branch_only_conflicts() {
    let conflicting: Vec<_> = rows()
        .into_iter()
        .filter(|r| !r.code.starts_with("7117.19"))
        .map(|mut r| {
            if r.code == "7117.90.90" {
                r.description = "Other imitation jewelry and badges for motor vehicles".to_string();
            }
            r
        })
        .collect();
    let engine = engine_over(taxonomy_from(conflicting), Arc::new(ring_oracle()), wide_net());

    let outcome = engine
        .classify(&ClassifyRequest::new("rubber ring worn on finger"))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.selected_code, "40169350");
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.starts_with("body-worn-vs-vehicle-part") && w.contains("4016.93.50"))
    );
    assert!(result.warnings.iter().any(|w| {
        w.contains("re-search in [7117] found no conflict-free candidate") && w.contains("original result kept")
    }));
    assert!(!result.rationale.contains("re-searched [7117]"));
}

#[tokio::test]
async fn slow_selection_hits_session_deadline() {
    let oracle = Arc::new(mug_oracle().slow_select(Duration::from_secs(5)));
    let mut cfg = config();
    cfg.narrowing.session_deadline_secs = 1;
    let engine = engine(oracle.clone(), cfg);

    let outcome = engine
        .classify(&ClassifyRequest::new("ceramic coffee mug"))
        .await
        .unwrap();
    let ClassifyOutcome::Classified(result) = &outcome else {
        panic!("expected best-so-far classification, got {outcome:?}");
    };
    assert_eq!(result.status, ClassificationStatus::Ambiguous);
    assert!(result.selected_code.starts_with("69"));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w == "session deadline reached; returning best result so far")
    );
    assert_eq!(oracle.calls(), (1, 1, 1));
}

#[tokio::test]
async fn unparseable_oracle_falls_back_to_capped_heuristic() {
    let oracle = Arc::new(LlmOracle::new(GarbageService::default(), config().oracle));
    let engine = engine(oracle.clone(), config());

    let outcome = engine
        .classify(&ClassifyRequest::new("coffee mug").with_material("ceramic"))
        .await
        .unwrap();
    let ClassifyOutcome::Classified(result) = &outcome else {
        panic!("expected a heuristic classification, got {outcome:?}");
    };
    assert_eq!(oracle.service().calls.load(Ordering::SeqCst), 3);
    assert!(result.confidence <= 0.5);
    assert_eq!(result.status, ClassificationStatus::Ambiguous);
    assert!(result.warnings.iter().any(|w| w.contains("oracle unavailable")));
    assert!(result.selected_code.starts_with("69"));
}

#[tokio::test]
async fn offline_heuristic_oracle_is_capped_too() {
    let engine = engine(Arc::new(HeuristicOracle), config());
    let outcome = engine
        .classify(&ClassifyRequest::new("ceramic coffee mug"))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert!(result.confidence <= 0.5);
    assert_ne!(result.status, ClassificationStatus::Confident);
    assert!(result.warnings.iter().any(|w| w.starts_with("heuristic-only result")));
}

#[tokio::test]
async fn oracle_pick_outside_bucket_is_rescued() {
    let oracle = mug_oracle().selects("6912.00.44.20", 0.9);
    let engine = engine(Arc::new(oracle), config());
    let outcome = engine.classify(&ClassifyRequest::new("ceramic coffee mug")).await.unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.selected_code, "6912004420");
    assert_close(result.confidence, 0.6183);
    assert!(result.rationale.contains("rescued 6912.00.44.20"));
    // The scorer's favourite still outranks the rescued pick.
    assert_ne!(result.status, ClassificationStatus::Confident);
}

#[tokio::test]
async fn unknown_oracle_pick_falls_back_with_penalty() {
    let oracle = mug_oracle().selects("9999.99.99", 0.9);
    let engine = engine(Arc::new(oracle), config());
    let outcome = engine.classify(&ClassifyRequest::new("ceramic coffee mug")).await.unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.selected_code, "6912004410");
    assert_close(result.confidence, 0.705 * 0.85);
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("9999.99.99") && w.contains("reduced confidence"))
    );
}

#[tokio::test]
async fn narrowing_rounds_never_grow_bucket_or_lower_top() {
    let engine = engine(Arc::new(mug_oracle()), config());
    let mut session = engine.start(ClassifyRequest::new("ceramic coffee mug")).await.unwrap();

    let rounds = [
        [("material", "Ceramic")],
        [("function", "Household or kitchen use")],
        [("material", "Glass")],
    ];
    for round in rounds {
        let before_len = session.bucket().len();
        let before_top = session.bucket().top_confidence();
        let before_unknowns = session.understanding().unknowns().len();

        let answers: AnswerRound = round.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        session.answer(&answers);

        assert!(session.bucket().len() <= before_len);
        assert!(session.bucket().top_confidence() >= before_top);
        assert!(session.understanding().unknowns().len() <= before_unknowns);
    }
    assert_eq!(session.rounds(), 3);
}

#[tokio::test]
async fn outcome_leaves_session_state_untouched() {
    let engine = engine(Arc::new(mug_oracle()), config());
    let mut session = engine.start(ClassifyRequest::new("ceramic coffee mug")).await.unwrap();
    let bucket = session.bucket().clone();

    let first = session.outcome().await.unwrap();
    let second = session.outcome().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(session.bucket(), &bucket);
}

#[tokio::test]
async fn confident_status_keeps_unknowns_empty() {
    let engine = engine(Arc::new(mug_oracle()), config());
    let request = ClassifyRequest::new("ceramic coffee mug").with_answers([("material", "Ceramic")]);
    let mut session = engine.start(request.clone()).await.unwrap();
    session.answer(&request.answers[0]);
    let outcome = session.outcome().await.unwrap();
    assert_eq!(outcome.result().unwrap().status, ClassificationStatus::Confident);
    assert!(session.understanding().unknowns().is_empty());
}

#[tokio::test]
async fn empty_or_unmatched_description_is_no_match() {
    let oracle = Arc::new(ScriptedOracle::new("zzzz"));
    let engine = engine(oracle.clone(), config());

    let blank = engine.classify(&ClassifyRequest::new("   ")).await.unwrap();
    assert_eq!(
        blank,
        ClassifyOutcome::NoMatch {
            message: NO_MATCH_MESSAGE.to_string()
        }
    );
    assert_eq!(oracle.calls(), (0, 0, 0));

    let nothing = engine.classify(&ClassifyRequest::new("zzzz qqqq")).await.unwrap();
    assert!(matches!(nothing, ClassifyOutcome::NoMatch { .. }));
    // No candidates means nothing to select from.
    assert_eq!(oracle.calls(), (1, 1, 0));
}

#[tokio::test]
async fn extra_answer_rounds_are_ignored() {
    let mut cfg = config();
    cfg.narrowing.max_rounds = 1;
    let engine = engine(Arc::new(mug_oracle()), cfg);
    let request = ClassifyRequest::new("ceramic coffee mug")
        .with_answers([("material", "Ceramic")])
        .with_answers([("material", "Glass")]);
    let outcome = engine.classify(&request).await.unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.selected_code, "6912004410");
    assert!(!result.rationale.contains("material=Glass"));
}
