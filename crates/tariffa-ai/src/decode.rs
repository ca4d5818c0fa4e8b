//! Strict decoding of oracle text into typed values.
//!
//! Models sometimes wrap JSON in markdown fences or add a sentence before
//! it. The first balanced `{...}` object is taken; anything that does not
//! then deserialize into the requested shape is [`OracleError::Malformed`].

use serde::de::DeserializeOwned;

use crate::OracleError;

/// Decode the first JSON object in `text` as `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let json = first_object(text)
        .ok_or_else(|| OracleError::Malformed(format!("no JSON object in {:?}", preview(text))))?;
    serde_json::from_str(json).map_err(|e| OracleError::Malformed(e.to_string()))
}

/// Byte span of the first balanced JSON object, respecting string literals.
pub fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}
