//! Verification pass
//!
//! A second, independent oracle call per item: the auditor persona gets the
//! dialog, the consensus as a hint and a six-point checklist, at temperature
//! 0 with a JSON-mode hint. The reply goes through the same extractor and
//! validator as the analysis rounds.
//!
//! Verification is best-effort. Any failure keeps the consensus record, and
//! error records from the analysis phase pass through without a call.

use crate::core::controller::Keyed;
use crate::core::extract::{extract_response, MalformedResponse};
use crate::core::judgment::{Item, ItemId, Judgment, Record};
use crate::core::prompts::{verification_prompt, AUDITOR_PERSONA};
use crate::core::validate::validate_judgment;
use crate::events::{EventBus, JudgeEvent};
use crate::llm::{Oracle, OracleRequest, RetryError};
use tracing::{debug, warn};

/// Default verifier sampling temperature
pub const VERIFIER_TEMPERATURE: f64 = 0.0;

/// Why a verification produced no judgment
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Oracle(#[from] RetryError),

    #[error(transparent)]
    Malformed(#[from] MalformedResponse),
}

/// One verification job: the dialog and its consensus record
#[derive(Debug, Clone)]
pub struct VerifyJob {
    pub item: Item,
    pub consensus: Record,
}

impl Keyed for VerifyJob {
    fn key(&self) -> ItemId {
        self.consensus.id
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    oracle: Oracle,
    temperature: f64,
    events: Option<EventBus>,
}

impl Verifier {
    pub fn new(oracle: Oracle) -> Self {
        Self {
            oracle,
            temperature: VERIFIER_TEMPERATURE,
            events: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: JudgeEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Ask the auditor for a corrected judgment
    pub async fn verify(
        &self,
        item: &Item,
        consensus: &Judgment,
    ) -> Result<Judgment, VerifyError> {
        let request = OracleRequest::new(AUDITOR_PERSONA, verification_prompt(item, consensus))
            .with_temperature(Some(self.temperature))
            .json();
        let response = self.oracle.ask(&request).await?;
        let raw = extract_response(&response.content)?;
        Ok(validate_judgment(&raw))
    }

    /// Verified record, or the consensus record when verification fails
    pub async fn verify_or_keep(&self, item: &Item, consensus: &Record) -> Record {
        if consensus.is_error() {
            debug!(item = consensus.id, "Skipping verification of error record");
            return consensus.clone();
        }

        match self.verify(item, consensus.judgment()).await {
            Ok(verified) => {
                let changed = &verified != consensus.judgment();
                self.emit(JudgeEvent::verification_completed(consensus.id, changed));
                Record::judged(consensus.id, verified)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    item = consensus.id,
                    reason = %reason,
                    "Verification failed, keeping consensus"
                );
                self.emit(JudgeEvent::verification_fallback(consensus.id, &reason));
                consensus.clone()
            }
        }
    }

    /// Run one pooled job
    pub async fn run_job(&self, job: VerifyJob) -> Record {
        self.verify_or_keep(&job.item, &job.consensus).await
    }
}
