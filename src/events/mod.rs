//! Event-Driven Observability
//!
//! Structured events for monitoring a judgment run:
//! - Oracle rounds requested and completed
//! - Malformed replies
//! - Consensus and dispatch failures
//! - Verification outcomes and hybrid overrides
//! - Phase completion
//!
//! # Architecture
//!
//! Events are emitted via an `EventBus` backed by a broadcast channel.
//! Emitting never blocks the pipeline; observers subscribe independently:
//!
//! ```text
//! Dispatcher / Verifier / Merger → EventBus → [LoggingObserver, MetricsObserver, ...]
//! ```

pub mod bus;
pub mod observers;

use crate::core::judgment::{Category, ItemId, Judgment, Phase, Score, Sentiment};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// All events emitted during a run
///
/// Tagged with their type for JSON serialization; timestamps serialize as
/// Unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JudgeEvent {
    /// An oracle round was requested for an item
    RoundRequested {
        item_id: ItemId,
        round: usize,
        /// Index into the persona list
        persona: usize,
        model: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// An oracle round returned text
    RoundCompleted {
        item_id: ItemId,
        round: usize,
        tokens_used: usize,
        latency_ms: u64,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// No structured answer could be extracted from a reply
    ResponseMalformed {
        item_id: ItemId,
        round: usize,
        /// Leading characters of the reply
        preview: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// Votes for an item were aggregated
    ConsensusReached {
        item_id: ItemId,
        category: Category,
        sentiment: Sentiment,
        score: Score,
        flag_count: usize,
        /// Valid judgments that took part in the vote
        votes: usize,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// An item fell back to the explicit error record
    DispatchFailed {
        item_id: ItemId,
        reason: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// The verifier produced a judgment for an item
    VerificationCompleted {
        item_id: ItemId,
        /// Whether the verified judgment differs from consensus
        changed: bool,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// Verification failed and the consensus record was kept
    VerificationFallback {
        item_id: ItemId,
        reason: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// The merger escalated an item to unsatisfied
    HybridOverride {
        item_id: ItemId,
        from_sentiment: Sentiment,
        from_score: Score,
        to_score: Score,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// A phase finished (or was interrupted)
    RunFinished {
        phase: Phase,
        completed: usize,
        skipped: usize,
        errors: usize,
        interrupted: bool,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },
}

impl JudgeEvent {
    pub fn round_requested(item_id: ItemId, round: usize, persona: usize, model: &str) -> Self {
        Self::RoundRequested {
            item_id,
            round,
            persona,
            model: model.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn round_completed(
        item_id: ItemId,
        round: usize,
        tokens_used: usize,
        latency_ms: u64,
    ) -> Self {
        Self::RoundCompleted {
            item_id,
            round,
            tokens_used,
            latency_ms,
            timestamp: SystemTime::now(),
        }
    }

    pub fn response_malformed(item_id: ItemId, round: usize, preview: &str) -> Self {
        Self::ResponseMalformed {
            item_id,
            round,
            preview: preview.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn consensus_reached(item_id: ItemId, consensus: &Judgment, votes: usize) -> Self {
        Self::ConsensusReached {
            item_id,
            category: consensus.category,
            sentiment: consensus.sentiment,
            score: consensus.score,
            flag_count: consensus.flags.len(),
            votes,
            timestamp: SystemTime::now(),
        }
    }

    pub fn dispatch_failed(item_id: ItemId, reason: &str) -> Self {
        Self::DispatchFailed {
            item_id,
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn verification_completed(item_id: ItemId, changed: bool) -> Self {
        Self::VerificationCompleted {
            item_id,
            changed,
            timestamp: SystemTime::now(),
        }
    }

    pub fn verification_fallback(item_id: ItemId, reason: &str) -> Self {
        Self::VerificationFallback {
            item_id,
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn hybrid_override(
        item_id: ItemId,
        from_sentiment: Sentiment,
        from_score: Score,
        to_score: Score,
    ) -> Self {
        Self::HybridOverride {
            item_id,
            from_sentiment,
            from_score,
            to_score,
            timestamp: SystemTime::now(),
        }
    }

    pub fn run_finished(
        phase: Phase,
        completed: usize,
        skipped: usize,
        errors: usize,
        interrupted: bool,
    ) -> Self {
        Self::RunFinished {
            phase,
            completed,
            skipped,
            errors,
            interrupted,
            timestamp: SystemTime::now(),
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoundRequested { .. } => "RoundRequested",
            Self::RoundCompleted { .. } => "RoundCompleted",
            Self::ResponseMalformed { .. } => "ResponseMalformed",
            Self::ConsensusReached { .. } => "ConsensusReached",
            Self::DispatchFailed { .. } => "DispatchFailed",
            Self::VerificationCompleted { .. } => "VerificationCompleted",
            Self::VerificationFallback { .. } => "VerificationFallback",
            Self::HybridOverride { .. } => "HybridOverride",
            Self::RunFinished { .. } => "RunFinished",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::RoundRequested { timestamp, .. }
            | Self::RoundCompleted { timestamp, .. }
            | Self::ResponseMalformed { timestamp, .. }
            | Self::ConsensusReached { timestamp, .. }
            | Self::DispatchFailed { timestamp, .. }
            | Self::VerificationCompleted { timestamp, .. }
            | Self::VerificationFallback { timestamp, .. }
            | Self::HybridOverride { timestamp, .. }
            | Self::RunFinished { timestamp, .. } => *timestamp,
        }
    }
}

/// SystemTime as Unix milliseconds
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

pub use bus::EventBus;
