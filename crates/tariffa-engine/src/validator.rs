//! Semantic Validator: a fixed table of domain conflict rules.
//!
//! Rules are plain predicates over the understanding and one candidate; the
//! table is iterated uniformly so adding a rule never touches control flow.
//! Nothing here consults the oracle.

use tariffa_core::vocab::{self, AUDIENCES, BODY_WORN, FUNCTIONS, MATERIALS, TermGroup, attr};
use tariffa_core::{Candidate, ProductUnderstanding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    /// Forces one re-search restricted to the rule's suggested branches.
    Critical,
}

pub struct ConflictRule {
    pub id: &'static str,
    pub condition: fn(&ProductUnderstanding, &Candidate) -> bool,
    pub message: &'static str,
    pub severity: Severity,
    pub suggested_branches: &'static [&'static str],
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub is_valid: bool,
    pub critical: bool,
    pub warnings: Vec<String>,
    pub fired: Vec<&'static str>,
    pub suggested_branches: Vec<String>,
}

const VEHICLE_OR_INDUSTRIAL: TermGroup = TermGroup {
    label: "Vehicle or industrial part",
    terms: &["motor vehicle", "automotive", "vehicle", "engine", "industrial", "machinery"],
};

const MACHINERY: TermGroup = TermGroup {
    label: "Machinery",
    terms: &["machine", "machinery", "industrial", "engine", "motor vehicle"],
};

const EDIBLE: TermGroup = TermGroup {
    label: "Edible",
    terms: &["edible", "foodstuff", "snack", "candy", "chocolate", "confectionery"],
};

const GARMENT: TermGroup = TermGroup {
    label: "Garment",
    terms: &[
        "garment", "apparel", "clothing", "shirt", "t-shirt", "sweater", "jacket", "trousers", "dress",
    ],
};

const INDUSTRIAL: TermGroup = TermGroup {
    label: "Industrial",
    terms: &["industrial", "machinery", "factory"],
};

fn product_text(u: &ProductUnderstanding) -> String {
    u.attribute_text()
}

fn chapter_number(c: &Candidate) -> u32 {
    c.chapter().parse().unwrap_or(0)
}

fn body_worn_vs_vehicle(u: &ProductUnderstanding, c: &Candidate) -> bool {
    let adornment = u
        .function()
        .and_then(|f| vocab::group_for(attr::FUNCTION, f))
        .is_some_and(|g| g.label == "Personal adornment");
    let worn = adornment || BODY_WORN.mentioned_in(&product_text(u));
    worn && VEHICLE_OR_INDUSTRIAL.mentioned_in(&c.path_text())
}

fn toy_vs_machinery(u: &ProductUnderstanding, c: &Candidate) -> bool {
    let text = product_text(u);
    let for_children = FUNCTIONS.iter().any(|g| g.label == "Toy or game" && g.mentioned_in(&text))
        || AUDIENCES
            .iter()
            .any(|g| g.label == "Infants or children" && g.mentioned_in(&text));
    for_children && MACHINERY.mentioned_in(&c.path_text())
}

fn edible_vs_nonfood(u: &ProductUnderstanding, c: &Candidate) -> bool {
    EDIBLE.mentioned_in(&product_text(u)) && chapter_number(c) > 24
}

fn garment_vs_non_apparel(u: &ProductUnderstanding, c: &Candidate) -> bool {
    GARMENT.mentioned_in(&product_text(u)) && !(61..=65).contains(&chapter_number(c))
}

/// A stated material whose group the candidate never names while naming another.
fn material_contradiction(u: &ProductUnderstanding, c: &Candidate) -> bool {
    let Some(stated) = u.stated().get(attr::MATERIAL) else {
        return false;
    };
    let Some(group) = vocab::group_for(attr::MATERIAL, stated) else {
        return false;
    };
    let text = c.path_text();
    !group.mentioned_in(&text) && !vocab::groups_in(&text, MATERIALS).is_empty()
}

fn household_vs_industrial(u: &ProductUnderstanding, c: &Candidate) -> bool {
    let household = FUNCTIONS
        .iter()
        .any(|g| g.label == "Household or kitchen use" && g.mentioned_in(&product_text(u)));
    household && INDUSTRIAL.mentioned_in(&c.path_text())
}

pub static RULES: &[ConflictRule] = &[
    ConflictRule {
        id: "body-worn-vs-vehicle-part",
        condition: body_worn_vs_vehicle,
        message: "product is worn on the body but the code covers vehicle or industrial parts",
        severity: Severity::Critical,
        suggested_branches: &["7117"],
    },
    ConflictRule {
        id: "toy-vs-machinery",
        condition: toy_vs_machinery,
        message: "product is a toy or for children but the code covers machinery",
        severity: Severity::Critical,
        suggested_branches: &["95"],
    },
    ConflictRule {
        id: "edible-vs-non-food",
        condition: edible_vs_nonfood,
        message: "product is edible but the code is outside the food chapters",
        severity: Severity::Critical,
        suggested_branches: &["16", "17", "18", "19", "20", "21"],
    },
    ConflictRule {
        id: "garment-vs-non-apparel",
        condition: garment_vs_non_apparel,
        message: "product is a garment but the code is outside the apparel chapters",
        severity: Severity::Warning,
        suggested_branches: &["61", "62"],
    },
    ConflictRule {
        id: "material-contradiction",
        condition: material_contradiction,
        message: "the code names a different material than the one stated",
        severity: Severity::Warning,
        suggested_branches: &[],
    },
    ConflictRule {
        id: "household-vs-industrial",
        condition: household_vs_industrial,
        message: "product is for household use but the code covers industrial articles",
        severity: Severity::Warning,
        suggested_branches: &[],
    },
];

/// Run the rule table against one candidate.
pub fn validate(understanding: &ProductUnderstanding, candidate: &Candidate) -> Validation {
    validate_with(RULES, understanding, candidate)
}

pub fn validate_with(rules: &[ConflictRule], understanding: &ProductUnderstanding, candidate: &Candidate) -> Validation {
    let mut v = Validation {
        is_valid: true,
        ..Validation::default()
    };
    for rule in rules {
        if !(rule.condition)(understanding, candidate) {
            continue;
        }
        v.fired.push(rule.id);
        v.warnings.push(format!(
            "{}: {} ({})",
            rule.id, rule.message, candidate.formatted_code
        ));
        if rule.severity == Severity::Critical {
            v.is_valid = false;
            v.critical = true;
            for b in rule.suggested_branches {
                if !v.suggested_branches.iter().any(|s| s == b) {
                    v.suggested_branches.push(b.to_string());
                }
            }
        }
    }
    v
}
