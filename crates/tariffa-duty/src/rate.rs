//! Parsing of published rate text.
//!
//! General column examples: `Free`, `5%`, `2.5¢/kg + 3%`, `$1.20/doz.`.
//! Special column example: `Free (A,AU,CA) 2.5% (JO)`.

use regex::Regex;
use tariffa_core::{RatePct, SpecialProgram};

/// The ad valorem part of a rate and whether a specific (per-unit) part exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRate {
    pub ad_valorem: RatePct,
    pub has_specific: bool,
}

impl ParsedRate {
    pub const FREE: ParsedRate = ParsedRate {
        ad_valorem: RatePct::ZERO,
        has_specific: false,
    };
}

pub struct RateParser {
    percent: Regex,
    specific: Regex,
    special: Regex,
}

impl RateParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            percent: Regex::new(r"(\d+(?:\.\d+)?)\s*%")?,
            specific: Regex::new(r"(?:\$\s*\d+(?:\.\d+)?|\d+(?:\.\d+)?\s*¢)\s*/\s*[A-Za-z]")?,
            special: Regex::new(r"([^()]+?)\s*\(([^)]*)\)")?,
        })
    }

    /// Parse a general-column rate. `None` when the text is not a rate.
    pub fn parse(&self, text: &str) -> Option<ParsedRate> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("free") {
            return Some(ParsedRate::FREE);
        }
        let ad_valorem: RatePct = self
            .percent
            .captures_iter(text)
            .filter_map(|c| c[1].parse::<f64>().ok())
            .map(RatePct::from_percent)
            .sum();
        let has_specific = self.specific.is_match(text);
        let has_percent = self.percent.is_match(text);
        if !has_percent && !has_specific {
            return None;
        }
        Some(ParsedRate {
            ad_valorem,
            has_specific,
        })
    }

    /// Split a special-column text into one entry per program code.
    pub fn parse_special(&self, text: &str) -> Vec<SpecialProgram> {
        let mut out = Vec::new();
        for caps in self.special.captures_iter(text) {
            let rate = caps[1].trim().trim_start_matches(',').trim().to_string();
            for program in caps[2].split(',') {
                let program = program.trim();
                if !program.is_empty() {
                    out.push(SpecialProgram {
                        program: program.to_string(),
                        rate: rate.clone(),
                    });
                }
            }
        }
        out
    }
}
