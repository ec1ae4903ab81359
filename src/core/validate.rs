//! Judgment Validation
//!
//! Canonicalizes a parsed reply object into a [`Judgment`]. Total over any
//! input: every field is checked independently and an invalid field is
//! replaced by its default instead of rejecting the whole judgment.
//!
//! | Field     | Keys accepted                     | Default   |
//! |-----------|-----------------------------------|-----------|
//! | category  | `intent`, `category`              | `other`   |
//! | sentiment | `satisfaction`, `sentiment`       | `neutral` |
//! | score     | `quality_score`, `score`          | `3`       |
//! | flags     | `agent_mistakes`, `flags`         | unknown labels dropped |

use crate::core::extract::JsonObject;
use crate::core::judgment::{Category, Flag, FlagSet, Judgment, Score, Sentiment};
use serde_json::Value;

const CATEGORY_FIELDS: [&str; 2] = ["intent", "category"];
const SENTIMENT_FIELDS: [&str; 2] = ["satisfaction", "sentiment"];
const SCORE_FIELDS: [&str; 2] = ["quality_score", "score"];
const FLAG_FIELDS: [&str; 2] = ["agent_mistakes", "flags"];

/// Canonicalize a parsed reply into the closed label domain. Never fails.
pub fn validate_judgment(raw: &JsonObject) -> Judgment {
    let category = field(raw, &CATEGORY_FIELDS)
        .and_then(Value::as_str)
        .and_then(Category::parse)
        .unwrap_or_default();

    let sentiment = field(raw, &SENTIMENT_FIELDS)
        .and_then(Value::as_str)
        .and_then(Sentiment::parse)
        .unwrap_or_default();

    // JSON integers only: 4.0, "4" and true are all invalid scores
    let score = field(raw, &SCORE_FIELDS)
        .and_then(Value::as_i64)
        .and_then(Score::from_i64)
        .unwrap_or_default();

    let flags = match field(raw, &FLAG_FIELDS) {
        Some(Value::Array(labels)) => labels
            .iter()
            .filter_map(Value::as_str)
            .filter_map(Flag::parse)
            .collect(),
        _ => FlagSet::new(),
    };

    Judgment::new(category, sentiment, score, flags)
}

/// First present key wins
fn field<'a>(raw: &'a JsonObject, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| raw.get(*key))
}
