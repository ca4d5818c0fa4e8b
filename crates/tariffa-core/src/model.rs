//! Shared classification types.
//!
//! Everything here is plain data passed between the store, the oracle
//! adapter, the engine and the duty resolver. Types that the engine treats as
//! immutable (candidates, results, duty rates) are still plain structs; the
//! engine produces new values rather than editing them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::code::{CodeError, Level, format_code, normalize_code, parent_code};
use crate::vocab::attr;

// ── Taxonomy ──

/// One node of the commodity taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyNode {
    /// Bare digits, e.g. `6912004410`.
    pub code: String,
    /// Dotted form, e.g. `6912.00.44.10`.
    pub formatted_code: String,
    pub level: Level,
    pub parent_code: Option<String>,
    pub description: String,
    /// General (column 1) duty rate text, if this node carries one.
    #[serde(default)]
    pub base_rate: Option<String>,
    /// Preferential-program column text, e.g. `Free (A,AU,CA)`.
    #[serde(default)]
    pub special_rate: Option<String>,
}

impl TaxonomyNode {
    /// Build a node from a code in any accepted notation.
    ///
    /// The parent is set to the nominal parent code; ingest replaces it with
    /// the nearest ancestor actually present in the store.
    pub fn new(code: &str, description: impl Into<String>) -> Result<Self, CodeError> {
        let digits = normalize_code(code)?;
        let level = Level::from_digits(digits.len()).ok_or_else(|| CodeError::InvalidLength {
            code: code.to_string(),
            digits: digits.len(),
        })?;
        Ok(Self {
            formatted_code: format_code(&digits),
            parent_code: parent_code(&digits),
            code: digits,
            level,
            description: description.into(),
            base_rate: None,
            special_rate: None,
        })
    }

    pub fn with_base_rate(mut self, rate: impl Into<String>) -> Self {
        self.base_rate = Some(rate.into());
        self
    }

    pub fn with_special_rate(mut self, rate: impl Into<String>) -> Self {
        self.special_rate = Some(rate.into());
        self
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent_code = parent;
        self
    }
}

// ── Product understanding ──

/// Which path produced a [`ProductUnderstanding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderstandingSource {
    Oracle,
    Heuristic,
}

/// Structured attributes extracted from a product description.
///
/// Every attribute key lives in exactly one of `stated`, `inferred` or
/// `unknowns`. The mutators below keep the three buckets disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUnderstanding {
    raw_description: String,
    product_type: String,
    stated: BTreeMap<String, String>,
    inferred: BTreeMap<String, String>,
    unknowns: BTreeSet<String>,
    source: UnderstandingSource,
}

impl ProductUnderstanding {
    pub fn new(
        raw_description: impl Into<String>,
        product_type: impl Into<String>,
        source: UnderstandingSource,
    ) -> Self {
        Self {
            raw_description: raw_description.into(),
            product_type: product_type.into().trim().to_string(),
            stated: BTreeMap::new(),
            inferred: BTreeMap::new(),
            unknowns: BTreeSet::new(),
            source,
        }
    }

    pub fn raw_description(&self) -> &str {
        &self.raw_description
    }

    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    pub fn stated(&self) -> &BTreeMap<String, String> {
        &self.stated
    }

    pub fn inferred(&self) -> &BTreeMap<String, String> {
        &self.inferred
    }

    pub fn unknowns(&self) -> &BTreeSet<String> {
        &self.unknowns
    }

    pub fn source(&self) -> UnderstandingSource {
        self.source
    }

    /// Record an explicitly stated fact. Overrides inferred and unknown.
    pub fn state(&mut self, key: &str, value: &str) {
        let (key, value) = (normalize_key(key), value.trim());
        if key.is_empty() || value.is_empty() {
            return;
        }
        self.inferred.remove(&key);
        self.unknowns.remove(&key);
        self.stated.insert(key, value.to_string());
    }

    /// Record a deduced fact unless the key is already stated.
    pub fn infer(&mut self, key: &str, value: &str) {
        let (key, value) = (normalize_key(key), value.trim());
        if key.is_empty() || value.is_empty() || self.stated.contains_key(&key) {
            return;
        }
        self.unknowns.remove(&key);
        self.inferred.insert(key, value.to_string());
    }

    /// Record a needed-but-absent attribute unless it is already known.
    ///
    /// Only understanding construction calls this; a session never re-opens
    /// a resolved attribute.
    pub fn mark_unknown(&mut self, key: &str) {
        let key = normalize_key(key);
        if key.is_empty() || self.is_known(&key) {
            return;
        }
        self.unknowns.insert(key);
    }

    /// Apply a user answer. Returns `true` when it resolved an open unknown.
    pub fn apply_answer(&mut self, key: &str, value: &str) -> bool {
        let was_unknown = self.unknowns.contains(&normalize_key(key));
        self.state(key, value);
        was_unknown && !self.unknowns.contains(&normalize_key(key))
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.stated.contains_key(key) || self.inferred.contains_key(key)
    }

    /// Stated value, falling back to the inferred one.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.stated
            .get(key)
            .or_else(|| self.inferred.get(key))
            .map(String::as_str)
    }

    pub fn material(&self) -> Option<&str> {
        self.attribute(attr::MATERIAL)
    }

    pub fn function(&self) -> Option<&str> {
        self.attribute(attr::FUNCTION)
    }

    pub fn construction(&self) -> Option<&str> {
        self.attribute(attr::CONSTRUCTION)
    }

    pub fn audience(&self) -> Option<&str> {
        self.attribute(attr::AUDIENCE)
    }

    /// Lowercased product type plus every known attribute value.
    pub fn attribute_text(&self) -> String {
        let mut parts = vec![self.product_type.clone(), self.raw_description.clone()];
        parts.extend(self.stated.values().cloned());
        parts.extend(self.inferred.values().cloned());
        parts.join(" ").to_lowercase()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace([' ', '-'], "_")
}

// ── Candidates ──

/// A leaf code proposed as a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub formatted_code: String,
    pub description: String,
    /// Ancestors from chapter down to (excluding) this node.
    pub hierarchy_path: Vec<TaxonomyNode>,
    pub confidence: f32,
    pub reasoning: String,
    /// Attributes whose values would confirm this candidate.
    pub required_info: Vec<String>,
    /// Attribute values that would rule this candidate out.
    pub eliminating_info: Vec<String>,
    /// Whether the candidate lies inside a shortlisted branch.
    pub in_shortlist: bool,
    /// Whether it came from a zero-match branch sample.
    pub sampled: bool,
    /// Previous confidences, oldest first.
    pub history: Vec<f32>,
}

impl Candidate {
    pub fn from_node(
        node: &TaxonomyNode,
        hierarchy_path: Vec<TaxonomyNode>,
        in_shortlist: bool,
        sampled: bool,
    ) -> Self {
        Self {
            code: node.code.clone(),
            formatted_code: node.formatted_code.clone(),
            description: node.description.clone(),
            hierarchy_path,
            confidence: 0.0,
            reasoning: String::new(),
            required_info: Vec::new(),
            eliminating_info: Vec::new(),
            in_shortlist,
            sampled,
            history: Vec::new(),
        }
    }

    /// A copy carrying a new confidence, with the old one kept in `history`.
    pub fn rescored(&self, confidence: f32, note: &str) -> Candidate {
        let mut next = self.clone();
        next.history.push(self.confidence);
        next.confidence = confidence.clamp(0.0, 1.0);
        if !note.is_empty() {
            if next.reasoning.is_empty() {
                next.reasoning = note.to_string();
            } else {
                next.reasoning = format!("{}; {note}", next.reasoning);
            }
        }
        next
    }

    /// Lowercased descriptions of the full path including this node.
    pub fn path_text(&self) -> String {
        let mut parts: Vec<&str> = self
            .hierarchy_path
            .iter()
            .map(|n| n.description.as_str())
            .collect();
        parts.push(&self.description);
        parts.join(" | ").to_lowercase()
    }

    pub fn chapter(&self) -> &str {
        crate::code::chapter_of(&self.code)
    }

    pub fn level(&self) -> Option<Level> {
        Level::from_digits(self.code.len())
    }
}

/// Ordering for candidate lists: confidence, then shortlist membership,
/// then the more specific (longer) description, then code.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.in_shortlist.cmp(&a.in_shortlist))
        .then_with(|| b.description.len().cmp(&a.description.len()))
        .then_with(|| a.code.cmp(&b.code))
}

/// Candidates of one search pass, kept sorted by [`rank`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateBucket {
    candidates: Vec<Candidate>,
    total_found: usize,
    narrowed_by: Vec<String>,
}

impl CandidateBucket {
    pub fn new(mut candidates: Vec<Candidate>, total_found: usize) -> Self {
        candidates.sort_by(rank);
        Self {
            candidates,
            total_found,
            narrowed_by: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn total_found(&self) -> usize {
        self.total_found
    }

    pub fn narrowed_by(&self) -> &[String] {
        &self.narrowed_by
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn runner_up(&self) -> Option<&Candidate> {
        self.candidates.get(1)
    }

    pub fn top_confidence(&self) -> f32 {
        self.top().map(|c| c.confidence).unwrap_or(0.0)
    }

    pub fn get(&self, code: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.code == code)
    }

    /// Append a narrowing action to the log.
    pub fn record(&mut self, action: impl Into<String>) {
        self.narrowed_by.push(action.into());
    }

    /// Swap in a re-scored candidate list, keeping the narrowing log.
    pub fn replace_candidates(&mut self, mut candidates: Vec<Candidate>) {
        candidates.sort_by(rank);
        self.candidates = candidates;
    }

    /// Keep only the `limit` best candidates.
    pub fn truncate(&mut self, limit: usize) {
        self.candidates.truncate(limit);
    }
}

// ── Narrowing ──

/// A disambiguating question for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrowingQuestion {
    pub id: String,
    /// Attribute the answer resolves.
    pub attribute: String,
    pub question_text: String,
    pub options: Vec<String>,
    /// Expected number of candidates an answer eliminates.
    pub impact_estimate: usize,
    /// 1 is asked first.
    pub priority: u8,
}

// ── Results ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Confident,
    Ambiguous,
    NeedsInput,
}

impl ClassificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confident => "confident",
            Self::Ambiguous => "ambiguous",
            Self::NeedsInput => "needs_input",
        }
    }
}

/// A runner-up code reported alongside the selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub code: String,
    pub formatted_code: String,
    pub description: String,
    pub confidence: f32,
}

impl From<&Candidate> for Alternative {
    fn from(c: &Candidate) -> Self {
        Self {
            code: c.code.clone(),
            formatted_code: c.formatted_code.clone(),
            description: c.description.clone(),
            confidence: c.confidence,
        }
    }
}

/// Terminal output of a classification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub selected_code: String,
    pub formatted_code: String,
    pub description: String,
    pub hierarchy_path: Vec<TaxonomyNode>,
    pub confidence: f32,
    pub duty_rate: Option<DutyRate>,
    pub rationale: String,
    pub warnings: Vec<String>,
    pub status: ClassificationStatus,
    pub alternatives: Vec<Alternative>,
}

// ── Duty ──

/// A percentage held in thousandths of a percent.
///
/// Integer storage keeps program stacking exactly commutative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "f64", into = "f64")]
pub struct RatePct(i64);

impl RatePct {
    pub const ZERO: RatePct = RatePct(0);

    pub fn from_thousandths(v: i64) -> Self {
        Self(v)
    }

    pub fn from_percent(pct: f64) -> Self {
        Self((pct * 1000.0).round() as i64)
    }

    pub fn thousandths(&self) -> i64 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<f64> for RatePct {
    fn from(pct: f64) -> Self {
        Self::from_percent(pct)
    }
}

impl From<RatePct> for f64 {
    fn from(r: RatePct) -> Self {
        r.as_percent()
    }
}

impl std::ops::Add for RatePct {
    type Output = RatePct;
    fn add(self, rhs: RatePct) -> RatePct {
        RatePct(self.0 + rhs.0)
    }
}

impl std::iter::Sum for RatePct {
    fn sum<I: Iterator<Item = RatePct>>(iter: I) -> RatePct {
        iter.fold(RatePct::ZERO, |a, b| a + b)
    }
}

impl std::fmt::Display for RatePct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 1000;
        let frac = (self.0 % 1000).abs();
        if frac == 0 {
            return write!(f, "{whole}%");
        }
        let sign = if self.0 < 0 && whole == 0 { "-" } else { "" };
        let digits = format!("{frac:03}");
        write!(f, "{sign}{whole}.{}%", digits.trim_end_matches('0'))
    }
}

/// Which node supplied the general rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSource {
    /// `None` when no node in the chain had a rate and the default applied.
    pub code: Option<String>,
    pub inherited: bool,
}

/// A preferential-program rate from the special column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialProgram {
    pub program: String,
    pub rate: String,
}

/// An additive trade-remedy program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalProgram {
    pub program: String,
    pub rate: RatePct,
    /// Heading under which the additional duty is reported, if any.
    pub code: Option<String>,
    pub note: Option<String>,
}

/// Resolved duty for one `(code, origin)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyRate {
    pub code: String,
    pub origin: Option<String>,
    /// General rate text as published, e.g. `5%`, `Free`, `2.5¢/kg + 3%`.
    pub general_rate: String,
    pub rate_source: RateSource,
    pub special_programs: Vec<SpecialProgram>,
    /// Programs applied to the effective rate.
    pub additional_programs: Vec<AdditionalProgram>,
    /// Programs that apply only to specific products not confirmed for this code.
    pub conditional_programs: Vec<AdditionalProgram>,
    pub base_ad_valorem: RatePct,
    pub has_specific_component: bool,
    pub additional_total: RatePct,
    pub effective_rate: RatePct,
    pub notes: Vec<String>,
}

impl DutyRate {
    /// Effective rate for display, flagging a non-ad-valorem base component.
    pub fn effective_display(&self) -> String {
        if self.has_specific_component {
            format!("{} + specific ({})", self.effective_rate, self.general_rate)
        } else {
            self.effective_rate.to_string()
        }
    }
}
