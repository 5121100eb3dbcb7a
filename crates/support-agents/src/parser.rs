//! Extraction of a single JSON object from free-form model text.
//!
//! Models often wrap the object in prose or markdown fences. The extractor
//! locates a brace-delimited span, parses it, and fails with
//! `PipelineError::MalformedOutput` (carrying the raw text) when no span
//! exists or the span is not a JSON object. Failures are logged here and then
//! propagated; callers decide whether a fallback applies.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::PipelineError;
use crate::types::JsonObject;

/// Greedy: first `{` through last `}` across lines.
static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

/// How to choose the candidate span inside model text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// First `{` to last `}`. Two adjacent objects merge into one invalid span.
    #[default]
    Greedy,
    /// First brace-balanced object, skipping braces inside string literals.
    FirstBalanced,
}

impl ExtractionStrategy {
    fn candidate<'a>(self, text: &'a str) -> Option<&'a str> {
        match self {
            Self::Greedy => GREEDY_OBJECT.find(text).map(|m| m.as_str()),
            Self::FirstBalanced => first_balanced_object(text),
        }
    }
}

/// Parse the JSON object embedded in `text`.
pub fn extract_json_object(
    text: &str,
    strategy: ExtractionStrategy,
) -> Result<JsonObject, PipelineError> {
    let result = parse_candidate(text, strategy);
    if let Err(ref e) = result {
        warn!(error = %e, raw = %text, "Failed to parse JSON from model output");
    }
    result
}

fn parse_candidate(text: &str, strategy: ExtractionStrategy) -> Result<JsonObject, PipelineError> {
    let span = strategy
        .candidate(text)
        .ok_or_else(|| PipelineError::malformed("no JSON object found", text))?;

    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(PipelineError::malformed(
            format!("expected a JSON object, found {}", json_kind(&other)),
            text,
        )),
        Err(e) => Err(PipelineError::malformed(format!("invalid JSON: {e}"), text)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Scan for the first `{ ... }` whose braces balance outside string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
