//! One classification session.
//!
//! A session exclusively owns its understanding and candidate bucket. Oracle
//! calls go through an [`OracleGate`] that enforces the session deadline and
//! switches the session to heuristic-only after the first oracle failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tariffa_ai::{HeuristicOracle, OracleError, Understood, understand};
use tariffa_core::{
    Alternative, Candidate, CandidateBucket, ClassificationResult, ClassificationStatus,
    ProductUnderstanding, is_within, normalize_code,
};
use tracing::{debug, info, warn};

use crate::engine::{AnswerRound, ClassifyOutcome, ClassifyRequest, Engine, EngineError};
use crate::narrowing::{self, Decision};
use crate::scorer::Scorer;
use crate::search::{branch_summaries, plan_branches, search_branches, search_terms};
use crate::validator::{self, Validation};

/// Runners-up reported with a result.
const MAX_ALTERNATIVES: usize = 3;

struct OracleGate {
    deadline: Instant,
    degraded: Option<String>,
    deadline_hit: bool,
}

impl OracleGate {
    fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
            degraded: None,
            deadline_hit: false,
        }
    }

    fn is_open(&self) -> bool {
        self.degraded.is_none() && !self.deadline_hit
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn degrade(&mut self, reason: String) {
        if self.degraded.is_none() {
            warn!(%reason, "oracle unavailable; continuing heuristic-only");
            self.degraded = Some(reason);
        }
    }

    /// Run one oracle call under the remaining session budget.
    ///
    /// Returns `None` once the gate is closed, on any oracle error, or when
    /// the deadline passes.
    async fn call<T, F>(&mut self, op: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        if !self.is_open() {
            debug!(op, "oracle gate closed; skipping call");
            return None;
        }
        match tokio::time::timeout(self.remaining(), fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.degrade(format!("{op}: {e}"));
                None
            }
            Err(_) => {
                warn!(op, "session deadline reached during oracle call");
                self.deadline_hit = true;
                None
            }
        }
    }
}

pub struct Session<'e> {
    engine: &'e Engine,
    request: ClassifyRequest,
    understanding: ProductUnderstanding,
    bucket: CandidateBucket,
    branches: Vec<String>,
    rounds: usize,
    gate: OracleGate,
}

impl<'e> Session<'e> {
    pub(crate) async fn start(engine: &'e Engine, request: ClassifyRequest) -> Result<Self, EngineError> {
        let started = Instant::now();
        let config = &engine.config;
        let mut gate = OracleGate::new(config.narrowing.session_deadline());

        let req = request.understanding_request();
        let understanding_call = understand(engine.oracle.as_ref(), &req);
        let understood = match tokio::time::timeout(gate.remaining(), understanding_call).await {
            Ok(understood) => understood,
            Err(_) => {
                gate.deadline_hit = true;
                Understood {
                    understanding: HeuristicOracle::understanding(&req),
                    fallback: Some(OracleError::Timeout(config.narrowing.session_deadline())),
                }
            }
        };
        if let Some(e) = understood.fallback {
            gate.degrade(format!("understanding: {e}"));
        }
        let understanding = understood.understanding;

        let chapters = branch_summaries(&engine.taxonomy)?;
        let picks = gate
            .call(
                "shortlist",
                engine
                    .oracle
                    .shortlist_branches(&understanding, &chapters, config.search.max_branches),
            )
            .await;
        let branches = plan_branches(
            config.search.mode,
            picks,
            &understanding,
            &chapters,
            config.search.max_branches,
        );

        let terms = search_terms(&understanding);
        let found = search_branches(
            Arc::clone(&engine.taxonomy),
            &branches,
            &terms,
            understanding.raw_description(),
            &config.search,
        )
        .await?;

        let scored = Scorer::new(&config.scoring).score_all(&understanding, &found.candidates);
        let mut bucket = CandidateBucket::new(scored, found.total_found);
        bucket.record(format!("searched branches [{}] for [{}]", branches.join(", "), terms.join(", ")));
        for note in found.notes {
            bucket.record(note);
        }
        bucket.truncate(config.search.bucket_limit);

        info!(
            product_type = understanding.product_type(),
            unknowns = understanding.unknowns().len(),
            branches = branches.len(),
            candidates = bucket.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session started"
        );
        Ok(Self {
            engine,
            request,
            understanding,
            bucket,
            branches,
            rounds: 0,
            gate,
        })
    }

    pub fn understanding(&self) -> &ProductUnderstanding {
        &self.understanding
    }

    pub fn bucket(&self) -> &CandidateBucket {
        &self.bucket
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// Apply one round of answers: each resolves an attribute and refines the bucket.
    pub fn answer(&mut self, round: &AnswerRound) {
        self.rounds += 1;
        let scorer = Scorer::new(&self.engine.config.scoring);
        for (attribute, value) in round {
            if value.trim().is_empty() {
                continue;
            }
            let resolved = self.understanding.apply_answer(attribute, value);
            self.bucket = scorer.refine(&self.bucket, attribute, value);
            debug!(%attribute, %value, resolved, round = self.rounds, "answer applied");
        }
    }

    /// Select, validate, decide and resolve duty for the current state.
    ///
    /// Works on a copy of the bucket, so calling it does not change what a
    /// later round sees.
    pub async fn outcome(&mut self) -> Result<ClassifyOutcome, EngineError> {
        let engine = self.engine;
        let config = &engine.config;
        let scorer = Scorer::new(&config.scoring);
        let mut bucket = self.bucket.clone();
        let mut warnings = Vec::new();

        if bucket.is_empty() {
            info!(description = self.understanding.raw_description(), "no candidates");
            return Ok(ClassifyOutcome::no_match());
        }

        // Selection.
        let pool: Vec<Candidate> = bucket
            .candidates()
            .iter()
            .take(config.search.selection_pool)
            .cloned()
            .collect();
        let selection = self
            .gate
            .call("select", engine.oracle.select_code(&self.understanding, &pool))
            .await;
        let mut reasoning = String::new();
        let mut leader_code = None;
        if let Some(selection) = selection {
            reasoning = selection.reasoning.clone();
            let endorse = |c: &Candidate| {
                if engine.oracle.is_heuristic() {
                    c.clone()
                } else {
                    scorer.endorse(c, selection.confidence)
                }
            };
            if let Some(picked) = bucket.get(&selection.code) {
                let endorsed = endorse(picked);
                upsert(&mut bucket, endorsed);
                leader_code = Some(selection.code.clone());
            } else if let Some(rescued) = self.rescue(&scorer, &selection.code)? {
                let endorsed = endorse(&rescued);
                bucket.record(format!("rescued {} from oracle selection", rescued.formatted_code));
                leader_code = Some(endorsed.code.clone());
                upsert(&mut bucket, endorsed);
            } else {
                warn!(code = %selection.code, "oracle selected a code that is not a classifiable leaf");
                warnings.push(format!(
                    "oracle selected {} which is not a classifiable code; \
                     using the top-ranked candidate with reduced confidence",
                    selection.code
                ));
                if let Some(top) = bucket.top() {
                    let penalized = top.rescored(
                        top.confidence * config.narrowing.rescue_penalty,
                        "oracle selection unavailable",
                    );
                    upsert(&mut bucket, penalized);
                }
            }
        }

        // Validation, with at most one re-search.
        let Some(chosen) = leader_of(&bucket, leader_code.as_deref()).cloned() else {
            return Ok(ClassifyOutcome::no_match());
        };
        let verdict = validator::validate(&self.understanding, &chosen);
        warnings.extend(verdict.warnings.iter().cloned());
        let replaced =
            verdict.critical && self.research(&scorer, &mut bucket, &verdict, &mut warnings).await?;
        // Without replacements the original stands, conflicts and all.
        leader_code = if replaced { None } else { Some(chosen.code.clone()) };
        drop_critical(&self.understanding, &mut bucket, leader_code.as_deref());

        // Heuristic-only results never claim more than the cap.
        let cap = config.narrowing.heuristic_confidence_cap;
        let heuristic_only = self.gate.degraded.is_some() || engine.oracle.is_heuristic();
        if heuristic_only {
            cap_confidence(&mut bucket, cap);
            warnings.push(match &self.gate.degraded {
                Some(reason) => format!(
                    "oracle unavailable ({reason}); heuristic-only result, confidence capped at {:.0}%",
                    cap * 100.0
                ),
                None => format!("heuristic-only result; confidence capped at {:.0}%", cap * 100.0),
            });
        }

        let Some(leader) = leader_of(&bucket, leader_code.as_deref()).cloned() else {
            return Ok(ClassifyOutcome::no_match());
        };
        if leader.code != chosen.code {
            let final_check = validator::validate(&self.understanding, &leader);
            for w in final_check.warnings {
                if !warnings.contains(&w) {
                    warnings.push(w);
                }
            }
        }

        if self.gate.deadline_hit {
            warnings.push("session deadline reached; returning best result so far".to_string());
        }
        let decision = narrowing::decide(
            &bucket,
            &leader,
            &self.understanding,
            self.rounds,
            &config.narrowing,
            self.gate.deadline_hit,
        );

        let duty_rate = match engine.duty.resolve(&leader.code, self.request.origin.as_deref()) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(code = %leader.code, error = %e, "duty resolution failed");
                warnings.push(format!("duty rate unavailable: {e}"));
                None
            }
        };

        let status = match &decision {
            Decision::Confident => ClassificationStatus::Confident,
            Decision::Ambiguous => ClassificationStatus::Ambiguous,
            Decision::NeedsInput(_) => ClassificationStatus::NeedsInput,
        };
        let result = ClassificationResult {
            selected_code: leader.code.clone(),
            formatted_code: leader.formatted_code.clone(),
            description: leader.description.clone(),
            hierarchy_path: leader.hierarchy_path.clone(),
            confidence: leader.confidence,
            duty_rate,
            rationale: rationale(&reasoning, &leader, &bucket),
            warnings,
            status,
            alternatives: bucket
                .candidates()
                .iter()
                .filter(|c| c.code != leader.code && c.confidence >= config.narrowing.min_viable)
                .take(MAX_ALTERNATIVES)
                .map(Alternative::from)
                .collect(),
        };
        info!(
            code = %result.formatted_code,
            confidence = result.confidence,
            status = result.status.as_str(),
            rounds = self.rounds,
            warnings = result.warnings.len(),
            "classification settled"
        );

        Ok(match decision {
            Decision::NeedsInput(questions) => ClassifyOutcome::NeedsInput {
                questions,
                best_so_far: result,
            },
            Decision::Confident | Decision::Ambiguous => ClassifyOutcome::Classified(result),
        })
    }

    /// Look up an oracle pick that is not in the bucket.
    fn rescue(&self, scorer: &Scorer<'_>, code: &str) -> Result<Option<Candidate>, EngineError> {
        let Ok(code) = normalize_code(code) else {
            return Ok(None);
        };
        let taxonomy = &self.engine.taxonomy;
        let Some(node) = taxonomy.node(&code)? else {
            return Ok(None);
        };
        if !taxonomy.store().is_leaf(&node.code)? {
            return Ok(None);
        }
        let path = taxonomy.path(&node.code)?;
        let in_shortlist = self.branches.iter().any(|b| is_within(&node.code, b));
        let candidate = Candidate::from_node(&node, path.to_vec(), in_shortlist, false);
        Ok(Some(scorer.score(&self.understanding, &candidate)))
    }

    /// Re-search once inside the suggested branches after a critical conflict.
    ///
    /// Returns whether conflict-free replacements were found. Without them the
    /// original stands and the conflict warnings stay on the result.
    async fn research(
        &self,
        scorer: &Scorer<'_>,
        bucket: &mut CandidateBucket,
        verdict: &Validation,
        warnings: &mut Vec<String>,
    ) -> Result<bool, EngineError> {
        let engine = self.engine;
        let mut branches = Vec::new();
        for b in &verdict.suggested_branches {
            if engine.taxonomy.node(b)?.is_some() {
                branches.push(b.clone());
            }
        }
        let rules = verdict.fired.join(", ");
        if branches.is_empty() {
            warnings.push(format!("{rules}: no suggested branch exists in the taxonomy; original result kept"));
            return Ok(false);
        }

        let terms = search_terms(&self.understanding);
        let found = search_branches(
            Arc::clone(&engine.taxonomy),
            &branches,
            &terms,
            self.understanding.raw_description(),
            &engine.config.search,
        )
        .await?;
        let within: Vec<Candidate> = found
            .candidates
            .into_iter()
            .filter(|c| branches.iter().any(|b| is_within(&c.code, b)))
            .collect();
        let replacements: Vec<Candidate> = scorer
            .score_all(&self.understanding, &within)
            .into_iter()
            .filter(|c| !validator::validate(&self.understanding, c).critical)
            .collect();

        info!(
            rules = %rules,
            branches = ?branches,
            replacements = replacements.len(),
            "re-searched after critical conflict"
        );
        if replacements.is_empty() {
            warnings.push(format!(
                "{rules}: re-search in [{}] found no conflict-free candidate; original result kept",
                branches.join(", ")
            ));
            return Ok(false);
        }
        bucket.record(format!(
            "re-searched [{}] after {rules}: {} candidates",
            branches.join(", "),
            replacements.len()
        ));
        for c in replacements {
            upsert(bucket, c);
        }
        Ok(true)
    }
}

/// The selected candidate if it is still present, else the top.
fn leader_of<'b>(bucket: &'b CandidateBucket, code: Option<&str>) -> Option<&'b Candidate> {
    code.and_then(|c| bucket.get(c)).or_else(|| bucket.top())
}

/// Replace the candidate with the same code, or add it.
fn upsert(bucket: &mut CandidateBucket, candidate: Candidate) {
    let mut candidates: Vec<Candidate> = bucket
        .candidates()
        .iter()
        .filter(|c| c.code != candidate.code)
        .cloned()
        .collect();
    candidates.push(candidate);
    bucket.replace_candidates(candidates);
}

/// Remove candidates with a critical conflict, unless that would empty the
/// bucket. A still-present oracle pick is kept either way: its conflict is
/// already reported.
fn drop_critical(understanding: &ProductUnderstanding, bucket: &mut CandidateBucket, keep: Option<&str>) {
    let (clean, conflicting): (Vec<Candidate>, Vec<Candidate>) = bucket
        .candidates()
        .iter()
        .cloned()
        .partition(|c| Some(c.code.as_str()) == keep || !validator::validate(understanding, c).critical);
    if clean.is_empty() || conflicting.is_empty() {
        return;
    }
    let dropped: Vec<&str> = conflicting.iter().map(|c| c.formatted_code.as_str()).collect();
    bucket.record(format!("dropped conflicting candidates [{}]", dropped.join(", ")));
    bucket.replace_candidates(clean);
}

/// Scale every confidence so the highest equals `cap`, when it exceeds it.
fn cap_confidence(bucket: &mut CandidateBucket, cap: f32) {
    let top = bucket
        .candidates()
        .iter()
        .map(|c| c.confidence)
        .fold(0.0_f32, f32::max);
    if top <= cap {
        return;
    }
    let factor = cap / top;
    let capped = bucket
        .candidates()
        .iter()
        .map(|c| c.rescored(c.confidence * factor, "heuristic-only cap"))
        .collect();
    bucket.replace_candidates(capped);
}

fn rationale(oracle_reasoning: &str, leader: &Candidate, bucket: &CandidateBucket) -> String {
    let mut parts = Vec::new();
    if !oracle_reasoning.trim().is_empty() {
        parts.push(oracle_reasoning.trim().to_string());
    }
    if !leader.reasoning.is_empty() {
        parts.push(format!("{}: {}", leader.formatted_code, leader.reasoning));
    }
    if !bucket.narrowed_by().is_empty() {
        parts.push(format!("narrowing: {}", bucket.narrowed_by().join("; ")));
    }
    parts.join("\n")
}
