//! Response Extraction
//!
//! Pulls a structured JSON object out of a free-text oracle reply. Replies
//! routinely carry a reasoning preamble, markdown code fences, or trailing
//! prose, so extraction is an explicit ordered list of pure strategies:
//!
//! 1. Strip fenced code-block markers (always applied first)
//! 2. [`Strategy::AnswerMarker`]: balanced block right after `ANSWER:`
//! 3. [`Strategy::KeyedBlock`]: first balanced object with a top-level category key
//! 4. [`Strategy::WholeText`]: the whole trimmed text
//!
//! A strategy that finds a candidate which does not parse yields to the next
//! one. When every strategy fails the caller gets [`MalformedResponse`];
//! nothing is defaulted here. Defaulting belongs to the validator and only
//! happens after a successful parse.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

/// Marker that introduces the final structured answer
pub const ANSWER_MARKER: &str = "ANSWER:";

/// Top-level keys that identify a judgment block
pub const CATEGORY_KEYS: [&str; 2] = ["intent", "category"];

/// Characters of the reply kept in a `MalformedResponse` for audit
const PREVIEW_CHARS: usize = 120;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("static fence pattern"));

/// Parsed JSON object of a reply
pub type JsonObject = Map<String, Value>;

/// No structured payload could be located in a reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed oracle response: no structured answer found (reply starts with {preview:?})")]
pub struct MalformedResponse {
    /// Leading characters of the reply
    pub preview: String,
}

impl MalformedResponse {
    fn for_reply(reply: &str) -> Self {
        Self {
            preview: reply.trim().chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

/// One extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Balanced block immediately after [`ANSWER_MARKER`]
    AnswerMarker,
    /// First balanced block containing a category key
    KeyedBlock,
    /// Entire trimmed text
    WholeText,
}

impl Strategy {
    /// Priority order in which strategies are tried
    pub const ORDER: [Strategy; 3] = [
        Strategy::AnswerMarker,
        Strategy::KeyedBlock,
        Strategy::WholeText,
    ];

    /// Apply this strategy to fence-stripped text
    pub fn apply(&self, text: &str) -> Option<JsonObject> {
        match self {
            Strategy::AnswerMarker => after_answer_marker(text),
            Strategy::KeyedBlock => first_keyed_block(text),
            Strategy::WholeText => parse_object(text.trim()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::AnswerMarker => "answer_marker",
            Strategy::KeyedBlock => "keyed_block",
            Strategy::WholeText => "whole_text",
        }
    }
}

/// Extract the structured answer from a raw oracle reply
///
/// # Example
///
/// ```
/// use dialog_judge::core::extract::extract_response;
///
/// let reply = "REASONING: polite but unresolved.\nANSWER:\n{\"intent\": \"refund\", \"quality_score\": 2}";
/// let object = extract_response(reply).unwrap();
/// assert_eq!(object["intent"], "refund");
/// ```
pub fn extract_response(reply: &str) -> Result<JsonObject, MalformedResponse> {
    let text = strip_code_fences(reply);

    for strategy in Strategy::ORDER {
        if let Some(object) = strategy.apply(&text) {
            debug!(strategy = strategy.name(), "Extracted structured answer");
            return Ok(object);
        }
    }

    warn!(reply_hash = %hash_content(reply), "No structured answer in oracle reply");
    Err(MalformedResponse::for_reply(reply))
}

/// Remove markdown code-fence markers (with optional language tag)
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

/// Return the balanced `{...}` block starting at byte offset `start`
///
/// `start` must point at `{`. Braces inside JSON string literals are not
/// counted. Returns `None` when the balance never returns to zero.
pub fn balanced_block(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn after_answer_marker(text: &str) -> Option<JsonObject> {
    text.match_indices(ANSWER_MARKER).find_map(|(idx, marker)| {
        let rest = &text[idx + marker.len()..];
        let open = rest.len() - rest.trim_start().len();
        balanced_block(rest, open).and_then(parse_object)
    })
}

fn first_keyed_block(text: &str) -> Option<JsonObject> {
    text.match_indices('{').find_map(|(idx, _)| {
        // Wrapper objects are skipped; a later `{` reaches the nested judgment
        let object = parse_object(balanced_block(text, idx)?)?;
        CATEGORY_KEYS
            .iter()
            .any(|key| object.contains_key(*key))
            .then_some(object)
    })
}

fn parse_object(text: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Hash content for logging without echoing oracle output
fn hash_content(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
