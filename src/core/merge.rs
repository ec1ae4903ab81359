//! Hybrid merge of consensus and verified judgments
//!
//! The verifier may only make a record *worse*, never better, and only when
//! the consensus already carries evidence of an unsolved problem.
//!
//! # Escalation-only law
//!
//! For every pair `(consensus, verified)` the merged judgment `m` satisfies:
//!
//! - `m.category == consensus.category` and `m.flags == consensus.flags`
//! - `m.sentiment >= consensus.sentiment` in dissatisfaction order
//! - `m.score <= consensus.score`
//!
//! The override fires when the verifier says `unsatisfied`, consensus did
//! not, and either consensus flagged `no_resolution`, or the verifier
//! flagged `no_resolution` while consensus flagged anything at all.

use crate::core::judgment::{Flag, Judgment, Record, Score, Sentiment};
use crate::events::{EventBus, JudgeEvent};
use std::collections::HashMap;

/// Reconciles a consensus judgment with its verified counterpart
pub trait MergePolicy: Send + Sync {
    fn merge(&self, consensus: &Judgment, verified: &Judgment) -> Judgment;

    fn name(&self) -> &'static str;
}

/// Escalate to `unsatisfied` on corroborated `no_resolution`, nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationOnly;

impl EscalationOnly {
    /// Whether the verifier's judgment escalates the consensus
    pub fn triggers(consensus: &Judgment, verified: &Judgment) -> bool {
        if verified.sentiment != Sentiment::Unsatisfied
            || consensus.sentiment == Sentiment::Unsatisfied
        {
            return false;
        }
        consensus.flags.contains(Flag::NoResolution)
            || (verified.flags.contains(Flag::NoResolution) && !consensus.flags.is_empty())
    }
}

impl MergePolicy for EscalationOnly {
    fn merge(&self, consensus: &Judgment, verified: &Judgment) -> Judgment {
        let mut merged = consensus.clone();
        if Self::triggers(consensus, verified) {
            merged.sentiment = Sentiment::Unsatisfied;
            merged.score = merged.score.min(Score::ESCALATED_MAX);
        }
        merged
    }

    fn name(&self) -> &'static str {
        "escalation_only"
    }
}

/// Merge record sets by id
///
/// Consensus records drive the output: one hybrid record per consensus
/// record, ascending by id. Error records and records without a verified
/// counterpart are carried unchanged.
pub fn merge_records(
    consensus: &[Record],
    verified: &[Record],
    policy: &dyn MergePolicy,
    events: Option<&EventBus>,
) -> Vec<Record> {
    let verified: HashMap<_, _> = verified.iter().map(|r| (r.id, r)).collect();

    let mut merged: Vec<Record> = consensus
        .iter()
        .map(|record| {
            let counterpart = match verified.get(&record.id) {
                Some(v) if !record.is_error() && !v.is_error() => v,
                _ => return record.clone(),
            };

            let before = record.judgment();
            let after = policy.merge(before, counterpart.judgment());
            if after.sentiment != before.sentiment {
                if let Some(bus) = events {
                    bus.emit(JudgeEvent::hybrid_override(
                        record.id,
                        before.sentiment,
                        before.score,
                        after.score,
                    ));
                }
            }
            Record::judged(record.id, after)
        })
        .collect();

    merged.sort_by_key(|record| record.id);
    merged
}
