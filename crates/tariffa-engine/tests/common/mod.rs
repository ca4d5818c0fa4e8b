//! Shared fixture: a small taxonomy slice, a program table, and scripted oracles.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tariffa_ai::{
    BranchPick, BranchSummary, CodeSelection, CompletionRequest, CompletionService, OracleError,
    ReasoningOracle, UnderstandingDraft, UnderstandingRequest,
};
use tariffa_core::{Candidate, EngineConfig, ProductUnderstanding};
use tariffa_duty::ProgramTable;
use tariffa_engine::Engine;
use tariffa_store::{MemoryStore, Taxonomy, TaxonomyRow};

pub fn taxonomy() -> Arc<Taxonomy> {
    taxonomy_from(rows())
}

pub fn taxonomy_from(rows: Vec<TaxonomyRow>) -> Arc<Taxonomy> {
    let store = MemoryStore::from_rows(rows).expect("fixture taxonomy is valid");
    Arc::new(Taxonomy::new(Arc::new(store)))
}

/// Rows of the fixture taxonomy slice.
pub fn rows() -> Vec<TaxonomyRow> {
    let row = TaxonomyRow::new;
    vec![
        row("39", "Plastics and articles thereof"),
        row("3924", "Tableware, kitchenware, other household articles, of plastics"),
        row("3924.10", "Tableware and kitchenware"),
        row("3924.10.40", "Drinking cups and mugs of plastics").rate("6.5%"),
        row("40", "Rubber and articles thereof"),
        row("4016", "Other articles of vulcanized rubber other than hard rubber"),
        row("4016.93", "Gaskets, washers and other seals"),
        row("4016.93.50", "Rubber O-rings and seals of a kind used in motor vehicles").rate("2.5%"),
        row("4016.99", "Other"),
        row("4016.99.60", "Rubber rings and bushings for automotive engines").rate("2.5%"),
        row("69", "Ceramic products"),
        row("6911", "Tableware and kitchenware, of porcelain or china"),
        row("6911.10", "Tableware and kitchenware"),
        row("6911.10.10", "Hotel or restaurant ware of porcelain").rate("25%"),
        row(
            "6912",
            "Ceramic tableware, kitchenware, other household articles, other than of porcelain or china",
        ),
        row("6912.00", "Ceramic tableware, kitchenware, other household articles")
            .rate("5%")
            .special("Free (A,AU,CA)"),
        row("6912.00.44", "Mugs and other steins"),
        row("6912.00.44.10", "Coffee mugs of stoneware ceramic"),
        row("6912.00.44.20", "Steins of earthenware ceramic"),
        row("6912.00.48", "Other ceramic tableware and kitchenware").rate("9.8%"),
        row("70", "Glass and glassware"),
        row("7013", "Glassware of a kind used for table, kitchen, office or indoor decoration"),
        row("7013.37", "Other drinking glasses, including mugs, of glass").rate("7.5%"),
        row("71", "Natural or cultured pearls, precious metals, imitation jewelry"),
        row("7117", "Imitation jewelry"),
        row("7117.19", "Of base metal: other"),
        row("7117.19.90", "Other imitation jewelry of base metal").rate("11%"),
        row("7117.90", "Other imitation jewelry"),
        row(
            "7117.90.90",
            "Other imitation jewelry, including finger rings and bracelets of rubber or plastics",
        )
        .rate("11%"),
        row("73", "Articles of iron or steel"),
        row("7323", "Table, kitchen or other household articles of iron or steel"),
        row("7323.93", "Of stainless steel"),
        row("7323.93.00", "Stainless steel household articles, including mugs").rate("2%"),
        row("87", "Vehicles other than railway"),
        row("8708", "Parts and accessories of motor vehicles"),
        row("8708.99", "Other parts"),
        row("8708.99.81", "Other parts of motor vehicles, including rubber rings").rate("2.5%"),
    ]
}

pub fn programs() -> ProgramTable {
    ProgramTable::from_json_str(
        r#"{
            "CN": [
                { "program": "IEEPA", "rate": 20 },
                { "program": "Section 301 List 3", "rate": 25, "code": "9903.88.03",
                  "scope": { "type": "specific_products", "prefixes": ["6912", "7013"] } }
            ]
        }"#,
    )
    .expect("fixture program table is valid")
}

pub fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.oracle.backoff_ms = 0;
    config
}

pub fn engine(oracle: Arc<dyn ReasoningOracle>, config: EngineConfig) -> Engine {
    engine_over(taxonomy(), oracle, config)
}

pub fn engine_over(taxonomy: Arc<Taxonomy>, oracle: Arc<dyn ReasoningOracle>, config: EngineConfig) -> Engine {
    Engine::new(taxonomy, oracle, programs(), config).expect("engine builds")
}

pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {expected}, got {actual}"
    );
}

/// An oracle that answers from a script and counts its calls.
#[derive(Default)]
pub struct ScriptedOracle {
    draft: UnderstandingDraft,
    branches: Vec<String>,
    selection: Option<CodeSelection>,
    select_delay: Option<Duration>,
    pub understand_calls: AtomicUsize,
    pub shortlist_calls: AtomicUsize,
    pub select_calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(product_type: &str) -> Self {
        Self {
            draft: UnderstandingDraft {
                product_type: product_type.to_string(),
                ..UnderstandingDraft::default()
            },
            ..Self::default()
        }
    }

    pub fn stated(mut self, key: &str, value: &str) -> Self {
        self.draft.stated.insert(key.to_string(), value.to_string());
        self
    }

    pub fn unknown(mut self, key: &str) -> Self {
        self.draft.unknowns.push(key.to_string());
        self
    }

    pub fn shortlist(mut self, codes: &[&str]) -> Self {
        self.branches = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn selects(mut self, code: &str, confidence: f32) -> Self {
        self.selection = Some(CodeSelection {
            code: code.to_string(),
            confidence,
            reasoning: format!("scripted pick {code}"),
        });
        self
    }

    /// Delay every selection by `delay`.
    pub fn slow_select(mut self, delay: Duration) -> Self {
        self.select_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.understand_calls.load(Ordering::SeqCst),
            self.shortlist_calls.load(Ordering::SeqCst),
            self.select_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn understand(&self, _: &UnderstandingRequest) -> Result<UnderstandingDraft, OracleError> {
        self.understand_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.draft.clone())
    }

    async fn shortlist_branches(
        &self,
        _: &ProductUnderstanding,
        _: &[BranchSummary],
        limit: usize,
    ) -> Result<Vec<BranchPick>, OracleError> {
        self.shortlist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .branches
            .iter()
            .take(limit)
            .map(|code| BranchPick {
                code: code.clone(),
                reason: "scripted".to_string(),
            })
            .collect())
    }

    async fn select_code(&self, _: &ProductUnderstanding, _: &[Candidate]) -> Result<CodeSelection, OracleError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.select_delay {
            tokio::time::sleep(delay).await;
        }
        self.selection
            .clone()
            .ok_or_else(|| OracleError::Malformed("no selection scripted".into()))
    }
}

/// A completion backend that never returns JSON.
#[derive(Default)]
pub struct GarbageService {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CompletionService for GarbageService {
    async fn complete(&self, _: &CompletionRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("I'm sorry, I can't produce that format right now.".to_string())
    }
}
