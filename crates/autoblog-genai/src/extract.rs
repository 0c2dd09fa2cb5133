//! Tolerant JSON extraction from model output.
//!
//! Models asked for "raw JSON" still wrap it in prose or markdown fences, leave
//! trailing commas, or emit literal newlines inside strings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::GenAiError;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("valid fenced-json regex"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing-comma regex"));

/// Pull the first JSON document out of `text`.
///
/// Order: fenced ```json block, outermost `{ … }`, bare top-level array, then
/// one cleanup pass over the `{ … }` candidate.
pub fn extract_json(text: &str) -> Result<Value, GenAiError> {
    if let Some(block) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        match serde_json::from_str(block.as_str()) {
            Ok(value) => return Ok(value),
            Err(e) => debug!("Fenced JSON block did not parse ({e}), trying generic extraction"),
        }
    }

    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(first), Some(last)) if first < last => &text[first..=last],
        _ => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if let Ok(value) = serde_json::from_str(trimmed) {
                    return Ok(value);
                }
            }
            return Err(GenAiError::Parse(
                "no JSON object structure found in AI response".into(),
            ));
        }
    };

    serde_json::from_str(candidate).or_else(|first_err| {
        debug!("JSON candidate did not parse ({first_err}), cleaning up");
        let cleaned = TRAILING_COMMA.replace_all(candidate, "$1");
        let cleaned = escape_raw_control_chars(&cleaned);
        serde_json::from_str(&cleaned).map_err(|e| GenAiError::Parse(e.to_string()))
    })
}

/// Escape literal newlines, carriage returns and tabs inside string literals.
fn escape_raw_control_chars(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in json.chars() {
        if in_string {
            match ch {
                _ if escaped => {
                    escaped = false;
                    out.push(ch);
                }
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(ch),
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
    }
    out
}
