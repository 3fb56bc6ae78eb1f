//! Recovers one JSON value from free-form model output.
//!
//! Vision models wrap JSON in prose, in code fences, or cut it short. The
//! strategies below are tried in order and the first successful parse wins:
//!
//! 1. the trimmed text as-is
//! 2. the text with code-fence markers removed
//! 3. the greedy span from the first `{` to the last `}`
//! 4. the greedy span from the first `[` to the last `]`
//!
//! Anything else is a `MalformedResponse`. No defaults are ever invented here.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::pipeline::PipelineError;

/// Characters of the offending text kept in the error for diagnosis.
const SNIPPET_CHARS: usize = 200;

static FENCE_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\s*").expect("valid regex"));
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```\s*").expect("valid regex"));

/// Parse the JSON value contained in `text`.
pub fn recover_json(text: &str) -> Result<Value, PipelineError> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    let unfenced = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(unfenced.trim()) {
        return Ok(value);
    }

    if let Some(value) = parse_span(&unfenced, '{', '}') {
        return Ok(value);
    }

    if let Some(value) = parse_span(&unfenced, '[', ']') {
        return Ok(value);
    }

    Err(PipelineError::MalformedResponse(snippet(text)))
}

/// Recover a JSON object. Arrays and scalars are rejected.
pub fn recover_object(text: &str) -> Result<serde_json::Map<String, Value>, PipelineError> {
    match recover_json(text)? {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::MalformedResponse(format!(
            "expected a JSON object, got {}: {}",
            kind_of(&other),
            snippet(text)
        ))),
    }
}

fn strip_code_fences(text: &str) -> String {
    let without_json = FENCE_JSON_RE.replace_all(text, "");
    FENCE_RE.replace_all(&without_json, "").into_owned()
}

/// Greedy span between the first `open` and the last `close`.
fn parse_span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
