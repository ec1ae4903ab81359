//! Logging Observer
//!
//! Structured logging of judge events through `tracing`:
//! - INFO: ConsensusReached, VerificationCompleted with a change, HybridOverride, RunFinished
//! - WARN: ResponseMalformed, DispatchFailed, VerificationFallback, interrupted runs
//! - DEBUG: RoundRequested, RoundCompleted, unchanged verifications

use crate::events::{EventBus, JudgeEvent};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Observer that logs judge events
pub struct LoggingObserver {
    receiver: broadcast::Receiver<JudgeEvent>,
}

impl LoggingObserver {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            receiver: bus.subscribe(),
        }
    }

    /// Log events until the bus closes
    ///
    /// ```rust,ignore
    /// tokio::spawn(LoggingObserver::new(&bus).run());
    /// ```
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => Self::log_event(&event),
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventBus closed, logging observer stopping");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Logging observer lagged");
                }
            }
        }
    }

    /// Log a single event at its level
    pub fn log_event(event: &JudgeEvent) {
        match event {
            JudgeEvent::RoundRequested {
                item_id,
                round,
                persona,
                model,
                ..
            } => {
                debug!(item = item_id, round, persona, model = %model, "Round requested");
            }

            JudgeEvent::RoundCompleted {
                item_id,
                round,
                tokens_used,
                latency_ms,
                ..
            } => {
                debug!(
                    item = item_id,
                    round,
                    tokens = tokens_used,
                    latency_ms,
                    "Round completed"
                );
            }

            JudgeEvent::ResponseMalformed {
                item_id,
                round,
                preview,
                ..
            } => {
                warn!(item = item_id, round, preview = %preview, "Malformed oracle reply");
            }

            JudgeEvent::ConsensusReached {
                item_id,
                category,
                sentiment,
                score,
                flag_count,
                votes,
                ..
            } => {
                info!(
                    item = item_id,
                    category = %category,
                    sentiment = %sentiment,
                    score = %score,
                    flags = flag_count,
                    votes,
                    "Consensus reached"
                );
            }

            JudgeEvent::DispatchFailed {
                item_id, reason, ..
            } => {
                warn!(item = item_id, reason = %reason, "Dispatch failed, error record written");
            }

            JudgeEvent::VerificationCompleted {
                item_id, changed, ..
            } => {
                if *changed {
                    info!(item = item_id, "Verifier revised consensus");
                } else {
                    debug!(item = item_id, "Verifier confirmed consensus");
                }
            }

            JudgeEvent::VerificationFallback {
                item_id, reason, ..
            } => {
                warn!(item = item_id, reason = %reason, "Verification failed, keeping consensus");
            }

            JudgeEvent::HybridOverride {
                item_id,
                from_sentiment,
                from_score,
                to_score,
                ..
            } => {
                info!(
                    item = item_id,
                    from_sentiment = %from_sentiment,
                    from_score = %from_score,
                    to_score = %to_score,
                    "Escalated to unsatisfied"
                );
            }

            JudgeEvent::RunFinished {
                phase,
                completed,
                skipped,
                errors,
                interrupted,
                ..
            } => {
                if *interrupted {
                    warn!(phase = %phase, completed, skipped, errors, "Phase interrupted");
                } else {
                    info!(phase = %phase, completed, errors, "Phase finished");
                }
            }
        }
    }
}
