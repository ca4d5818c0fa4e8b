//! Code arithmetic for the hierarchical commodity taxonomy.
//!
//! Codes nest by digit count: a 2-digit chapter contains 4-digit headings,
//! which contain 6-digit subheadings, 8-digit tariff lines, and finally
//! 10-digit statistical suffixes. Every level's code is a strict prefix of
//! its children's codes, so most hierarchy questions reduce to string
//! slicing on the bare digits.
//!
//! # Formatting conventions
//!
//! - Chapter: `69`
//! - Heading: `6912`
//! - Subheading: `6912.00`
//! - Tariff line: `6912.00.44`
//! - Statistical suffix: `6912.00.44.10`

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("empty code")]
    Empty,
    #[error("code {0:?} contains characters other than digits and separators")]
    InvalidCharacter(String),
    #[error("code {code:?} has {digits} digits; expected 2, 4, 6, 8 or 10")]
    InvalidLength { code: String, digits: usize },
}

/// Depth of a node in the taxonomy, derived from its digit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Chapter,
    Heading,
    Subheading,
    TariffLine,
    Statistical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Chapter,
        Level::Heading,
        Level::Subheading,
        Level::TariffLine,
        Level::Statistical,
    ];

    /// Level for a bare digit count, if the count is a valid nesting depth.
    pub fn from_digits(n: usize) -> Option<Level> {
        match n {
            2 => Some(Level::Chapter),
            4 => Some(Level::Heading),
            6 => Some(Level::Subheading),
            8 => Some(Level::TariffLine),
            10 => Some(Level::Statistical),
            _ => None,
        }
    }

    pub fn digits(&self) -> usize {
        match self {
            Level::Chapter => 2,
            Level::Heading => 4,
            Level::Subheading => 6,
            Level::TariffLine => 8,
            Level::Statistical => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Chapter => "chapter",
            Level::Heading => "heading",
            Level::Subheading => "subheading",
            Level::TariffLine => "tariff_line",
            Level::Statistical => "statistical",
        }
    }

    pub fn parse(s: &str) -> Option<Level> {
        Level::ALL.into_iter().find(|l| l.as_str() == s)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip separators from a code and validate its digit count.
///
/// Accepts `6912.00.44`, `6912 00 44`, `6912-00-44` and `69120044` alike.
pub fn normalize_code(code: &str) -> Result<String, CodeError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(CodeError::Empty);
    }

    let mut digits = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '0'..='9' => digits.push(c),
            '.' | ' ' | '-' => {}
            _ => return Err(CodeError::InvalidCharacter(code.to_string())),
        }
    }

    if Level::from_digits(digits.len()).is_none() {
        return Err(CodeError::InvalidLength {
            code: code.to_string(),
            digits: digits.len(),
        });
    }
    Ok(digits)
}

/// Render bare digits in the dotted 4.2.2.2 form.
///
/// Input that is not a valid depth is returned unchanged.
pub fn format_code(digits: &str) -> String {
    if Level::from_digits(digits.len()).is_none() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.to_string();
    }
    if digits.len() <= 4 {
        return digits.to_string();
    }

    let mut out = String::with_capacity(digits.len() + 3);
    out.push_str(&digits[..4]);
    let mut pos = 4;
    while pos < digits.len() {
        out.push('.');
        out.push_str(&digits[pos..pos + 2]);
        pos += 2;
    }
    out
}

/// Code of the structural parent (one level up), or `None` for chapters.
///
/// This is the *nominal* parent; a store may lack that exact node, in which
/// case the nearest present ancestor is the real parent.
pub fn parent_code(digits: &str) -> Option<String> {
    match digits.len() {
        4 | 6 | 8 | 10 => Some(digits[..digits.len() - 2].to_string()),
        _ => None,
    }
}

/// All nominal ancestor codes, nearest first, ending with the chapter.
///
/// `6912004410` → `["69120044", "691200", "6912", "69"]`
pub fn ancestor_codes(digits: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(4);
    let mut current = parent_code(digits);
    while let Some(code) = current {
        current = parent_code(&code);
        out.push(code);
    }
    out
}

/// Two-digit chapter of a code.
pub fn chapter_of(digits: &str) -> &str {
    &digits[..digits.len().min(2)]
}

/// Whether `code` sits at or below `prefix` in the hierarchy.
pub fn is_within(code: &str, prefix: &str) -> bool {
    !prefix.is_empty() && code.starts_with(prefix)
}
