//! # Response Parsing Module
//!
//! Turns the free text returned by a vision model into a JSON object.
//!
//! Parsing runs in two explicit stages:
//!
//! 1. **Strict**: strip markdown code fences, trim, and parse the whole text.
//! 2. **Braced**: take the span from the first `{` to the last `}` and parse that.
//!
//! Each stage is exposed on its own so callers and tests can exercise them
//! independently; [`parse_payload`] chains them.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"```[A-Za-z0-9_+-]*").expect("Invalid code fence regex pattern");
    static ref BRACED_OBJECT: Regex =
        Regex::new(r"\{[\s\S]*\}").expect("Invalid braced object regex pattern");
}

/// Stage that recovered the JSON object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Strict,
    Braced,
}

/// A JSON object recovered from model output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub value: Value,
    pub stage: ParseStage,
}

/// Neither stage produced a JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadParseError {
    pub message: String,
}

impl std::fmt::Display for PayloadParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[PARSE] {}", self.message)
    }
}

impl std::error::Error for PayloadParseError {}

/// Remove every markdown fence marker (with optional language tag) and trim
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Stage 1: the whole cleaned text must be a JSON object
pub fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

/// Stage 2: the greedy `{ ... }` span must be a JSON object
pub fn extract_braced(text: &str) -> Option<Value> {
    let candidate = BRACED_OBJECT.find(text)?;
    serde_json::from_str::<Value>(candidate.as_str())
        .ok()
        .filter(Value::is_object)
}

/// Run both stages over model output
pub fn parse_payload(text: &str) -> Result<ParsedPayload, PayloadParseError> {
    let cleaned = strip_code_fences(text);

    if let Some(value) = parse_strict(&cleaned) {
        return Ok(ParsedPayload {
            value,
            stage: ParseStage::Strict,
        });
    }

    if let Some(value) = extract_braced(&cleaned) {
        tracing::debug!("Recovered JSON object from surrounding prose");
        return Ok(ParsedPayload {
            value,
            stage: ParseStage::Braced,
        });
    }

    let preview: String = cleaned.chars().take(80).collect();
    Err(PayloadParseError {
        message: format!("no JSON object found in model output: '{}'", preview),
    })
}
