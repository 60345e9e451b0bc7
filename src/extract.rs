//! Pulls a [`TaskRecord`] out of free-form LLM text.
//!
//! The reply is supposed to be one JSON object, but models wrap it in
//! markdown fences, apologies and commentary. Finding the object is lenient;
//! decoding it is strict. The first candidate always wins.

use serde_json::Value;

use crate::error::ExtractionError;
use crate::types::TaskRecord;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";
const REQUIRED_KEYS: [&str; 3] = ["task", "code", "content"];

/// Which rule located the object in the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// A `{...}` span inside a ```` ```json ```` fence.
    FencedBlock,
    /// First `{` through last `}` anywhere in the text.
    FirstBraceSpan,
}

/// Find the candidate object span, trying each strategy in order.
pub fn locate_object(text: &str) -> Option<(Strategy, &str)> {
    if let Some(span) = fenced_block(text) {
        return Some((Strategy::FencedBlock, span));
    }
    first_brace_span(text).map(|span| (Strategy::FirstBraceSpan, span))
}

/// ```` ```json ````, optional whitespace, `{ ... }`, optional whitespace,
/// closing fence. The body runs to the first closing fence.
fn fenced_block(text: &str) -> Option<&str> {
    let mut cursor = 0;
    while let Some(rel) = text[cursor..].find(FENCE_OPEN) {
        let body_start = cursor + rel + FENCE_OPEN.len();
        cursor = body_start;

        let rest = &text[body_start..];
        let close = rest.find(FENCE_CLOSE)?;
        let body = rest[..close].trim();
        if body.starts_with('{') && body.ends_with('}') {
            return Some(body);
        }
    }
    None
}

/// First `{` to the last `}` after it. Not nesting-aware.
fn first_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Decode a candidate span into a task record, naming the first missing key.
pub fn decode_task_record(span: &str) -> Result<TaskRecord, ExtractionError> {
    let value: Value = serde_json::from_str(span).map_err(ExtractionError::Malformed)?;
    let Some(object) = value.as_object() else {
        return Err(ExtractionError::NotAnObject);
    };
    if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
        return Err(ExtractionError::MissingKey(*missing));
    }
    serde_json::from_value(value).map_err(ExtractionError::Schema)
}

/// Locate and decode the task record in an LLM reply.
pub fn extract_task_record(text: &str) -> Result<(Strategy, TaskRecord), ExtractionError> {
    let (strategy, span) = locate_object(text).ok_or(ExtractionError::NoObject)?;
    decode_task_record(span).map(|record| (strategy, record))
}
