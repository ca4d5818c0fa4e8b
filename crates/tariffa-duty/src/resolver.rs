use std::sync::Arc;

use tariffa_core::{AdditionalProgram, DutyRate, RatePct, RateSource, TaxonomyNode};
use tariffa_store::{StoreError, Taxonomy};
use tracing::{debug, info};

use crate::{DutyError, ParsedRate, ProgramTable, RateParser, ScopeMatch};

const DEFAULT_RATE: &str = "Free";

/// Resolves duty for `(code, origin)` pairs.
///
/// Pure over its inputs: the taxonomy and the program table are read-only,
/// so the same pair always yields the same [`DutyRate`].
pub struct DutyResolver {
    taxonomy: Arc<Taxonomy>,
    programs: ProgramTable,
    parser: RateParser,
}

impl DutyResolver {
    pub fn new(taxonomy: Arc<Taxonomy>, programs: ProgramTable) -> Result<Self, DutyError> {
        Ok(Self {
            taxonomy,
            programs,
            parser: RateParser::new()?,
        })
    }

    pub fn programs(&self) -> &ProgramTable {
        &self.programs
    }

    pub fn resolve(&self, code: &str, origin: Option<&str>) -> Result<DutyRate, DutyError> {
        let node = self
            .taxonomy
            .node(code)?
            .ok_or_else(|| StoreError::UnknownCode(code.to_string()))?;
        let path = self.taxonomy.path(&node.code)?;

        // Nearest first: the node itself, then ancestors up to the chapter.
        let chain: Vec<&TaxonomyNode> = std::iter::once(&node).chain(path.iter().rev()).collect();
        let mut notes = Vec::new();

        let (general_rate, rate_source) = match chain.iter().find(|n| n.base_rate.is_some()) {
            Some(source) => {
                let inherited = source.code != node.code;
                if inherited {
                    notes.push(format!("general rate inherited from {}", source.formatted_code));
                }
                (
                    source.base_rate.clone().unwrap_or_default(),
                    RateSource {
                        code: Some(source.code.clone()),
                        inherited,
                    },
                )
            }
            None => {
                notes.push(format!(
                    "no rate on {} or any ancestor; defaulted to {DEFAULT_RATE}",
                    node.formatted_code
                ));
                (
                    DEFAULT_RATE.to_string(),
                    RateSource {
                        code: None,
                        inherited: false,
                    },
                )
            }
        };

        let parsed = self.parser.parse(&general_rate).unwrap_or_else(|| {
            notes.push(format!("rate text {general_rate:?} has no ad valorem component"));
            ParsedRate {
                ad_valorem: RatePct::ZERO,
                has_specific: true,
            }
        });

        let special_programs = chain
            .iter()
            .find_map(|n| n.special_rate.as_deref())
            .map(|text| self.parser.parse_special(text))
            .unwrap_or_default();

        let mut additional_programs = Vec::new();
        let mut conditional_programs = Vec::new();
        if let Some(origin) = origin {
            for entry in self.programs.programs_for(origin) {
                let program = AdditionalProgram {
                    program: entry.program.clone(),
                    rate: entry.rate,
                    code: entry.code.clone(),
                    note: entry.note.clone(),
                };
                match entry.scope.check(&node.code) {
                    ScopeMatch::Applies => additional_programs.push(program),
                    ScopeMatch::Conditional => conditional_programs.push(program),
                    ScopeMatch::Excluded => {
                        debug!(program = %entry.program, code = %node.code, "program excludes code");
                    }
                }
            }
        }
        if !conditional_programs.is_empty() {
            notes.push(format!(
                "{} program(s) apply only to specific products and are not included",
                conditional_programs.len()
            ));
        }

        let additional_total: RatePct = additional_programs.iter().map(|p| p.rate).sum();
        let effective_rate = parsed.ad_valorem + additional_total;

        info!(
            code = %node.formatted_code,
            origin = origin.unwrap_or("-"),
            general = %general_rate,
            effective = %effective_rate,
            "resolved duty"
        );

        Ok(DutyRate {
            code: node.code.clone(),
            origin: origin.map(|o| o.trim().to_uppercase()),
            general_rate,
            rate_source,
            special_programs,
            additional_programs,
            conditional_programs,
            base_ad_valorem: parsed.ad_valorem,
            has_specific_component: parsed.has_specific,
            additional_total,
            effective_rate,
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProgramEntry, ProgramScope};
    use tariffa_store::{MemoryStore, TaxonomyRow};

    fn taxonomy() -> Arc<Taxonomy> {
        let store = MemoryStore::from_rows(vec![
            TaxonomyRow::new("69", "Ceramic products"),
            TaxonomyRow::new("6912", "Ceramic tableware"),
            TaxonomyRow::new("6912.00", "Tableware and kitchenware").rate("5%").special("Free (A,AU)"),
            TaxonomyRow::new("6912.00.44", "Mugs and other steins"),
            TaxonomyRow::new("6912.00.44.10", "Coffee mugs of stoneware"),
            TaxonomyRow::new("6912.00.48", "Other").rate("9.8%"),
            TaxonomyRow::new("70", "Glass"),
            TaxonomyRow::new("7013", "Glassware"),
            TaxonomyRow::new("7013.37", "Drinking glasses").rate("1.5¢/kg + 4%"),
            TaxonomyRow::new("98", "Special classification provisions"),
            TaxonomyRow::new("9801", "Returned goods"),
        ])
        .unwrap();
        Arc::new(Taxonomy::new(Arc::new(store)))
    }

    fn entry(program: &str, pct: f64, scope: ProgramScope) -> ProgramEntry {
        ProgramEntry {
            program: program.to_string(),
            rate: RatePct::from_percent(pct),
            code: None,
            note: None,
            scope,
        }
    }

    fn all() -> ProgramScope {
        ProgramScope::default()
    }

    fn resolver(programs: ProgramTable) -> DutyResolver {
        DutyResolver::new(taxonomy(), programs).unwrap()
    }

    #[test]
    fn inherits_from_subheading() {
        let r = resolver(ProgramTable::new());
        let duty = r.resolve("6912.00.44.10", None).unwrap();
        assert_eq!(duty.general_rate, "5%");
        assert_eq!(duty.rate_source.code.as_deref(), Some("691200"));
        assert!(duty.rate_source.inherited);
        assert!(duty.notes.iter().any(|n| n.contains("inherited from 6912.00")));
        assert_eq!(duty.effective_rate, RatePct::from_percent(5.0));
        assert_eq!(duty.special_programs.len(), 2);
    }

    #[test]
    fn direct_rate_is_not_inherited() {
        let duty = resolver(ProgramTable::new()).resolve("69120048", None).unwrap();
        assert_eq!(duty.general_rate, "9.8%");
        assert!(!duty.rate_source.inherited);
        assert!(duty.notes.is_empty());
    }

    #[test]
    fn no_rate_anywhere_defaults_free() {
        let duty = resolver(ProgramTable::new()).resolve("9801", None).unwrap();
        assert_eq!(duty.general_rate, "Free");
        assert!(duty.rate_source.code.is_none());
        assert!(duty.effective_rate.is_zero());
        assert_eq!(duty.notes.len(), 1);
    }

    #[test]
    fn stacks_programs_additively() {
        let mut programs = ProgramTable::new();
        programs.insert("CN", entry("IEEPA", 20.0, all())).unwrap();
        programs.insert("CN", entry("Section 301", 25.0, all())).unwrap();
        let duty = resolver(programs).resolve("6912004410", Some("cn")).unwrap();
        assert_eq!(duty.origin.as_deref(), Some("CN"));
        assert_eq!(duty.additional_total, RatePct::from_percent(45.0));
        assert_eq!(duty.effective_rate, RatePct::from_percent(50.0));
    }

    #[test]
    fn stacking_is_order_independent() {
        let rates = [("A", 20.0), ("B", 25.0), ("C", 7.5)];
        let orders = [[0, 1, 2], [2, 0, 1], [1, 2, 0]];
        let totals: Vec<DutyRate> = orders
            .iter()
            .map(|order| {
                let mut programs = ProgramTable::new();
                for &i in order {
                    programs.insert("CN", entry(rates[i].0, rates[i].1, all())).unwrap();
                }
                resolver(programs).resolve("6912004410", Some("CN")).unwrap()
            })
            .collect();
        for d in &totals {
            assert_eq!(d.effective_rate, RatePct::from_percent(57.5));
            assert_eq!(d.additional_total, totals[0].additional_total);
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut programs = ProgramTable::new();
        programs.insert("CN", entry("IEEPA", 20.0, all())).unwrap();
        let r = resolver(programs);
        assert_eq!(
            r.resolve("6912004410", Some("CN")).unwrap(),
            r.resolve("6912004410", Some("CN")).unwrap()
        );
    }

    #[test]
    fn specific_products_gated_by_prefix() {
        let mut programs = ProgramTable::new();
        programs.insert(
            "CN",
            entry(
                "Section 301 List 3",
                25.0,
                ProgramScope::SpecificProducts {
                    prefixes: vec!["7013".into()],
                },
            ),
        )
        .unwrap();
        programs.insert(
            "CN",
            entry(
                "IEEPA",
                20.0,
                ProgramScope::AllProducts {
                    excluded_prefixes: vec!["98".into()],
                },
            ),
        )
        .unwrap();
        let r = resolver(programs);

        let mug = r.resolve("6912004410", Some("CN")).unwrap();
        assert_eq!(mug.additional_programs.len(), 1);
        assert_eq!(mug.conditional_programs[0].program, "Section 301 List 3");
        assert_eq!(mug.effective_rate, RatePct::from_percent(25.0));

        let glass = r.resolve("701337", Some("CN")).unwrap();
        assert_eq!(glass.additional_total, RatePct::from_percent(45.0));
        assert!(glass.has_specific_component);
        assert_eq!(glass.effective_rate, RatePct::from_percent(49.0));
        assert_eq!(glass.effective_display(), "49% + specific (1.5¢/kg + 4%)");

        let returned = r.resolve("9801", Some("CN")).unwrap();
        assert!(returned.additional_programs.is_empty());
    }

    #[test]
    fn unknown_code_is_store_error() {
        let err = resolver(ProgramTable::new()).resolve("7117", None).unwrap_err();
        assert!(matches!(err, DutyError::Store(StoreError::UnknownCode(_))));
    }
}
