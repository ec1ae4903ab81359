//! Round Dispatcher
//!
//! Issues the voting rounds for one item: each round sends the analysis
//! prompt under the next persona, then runs the reply through the extractor
//! and the validator.
//!
//! # Failure policy
//!
//! - Oracle exhaustion in any round fails the whole item.
//! - A malformed reply fails the item under the default strict policy. With
//!   `min_votes` set it is a lost vote, and the item only fails once fewer
//!   than `min_votes` valid judgments remain.
//!
//! [`RoundDispatcher::judge`] turns every failure into the explicit error
//! record (`other`, `neutral`, 3, no flags, `error = <reason>`) so that no
//! item is ever dropped.

use crate::core::extract::{extract_response, MalformedResponse};
use crate::core::judgment::{Item, Judgment, Record};
use crate::core::prompts::{analysis_prompt, PERSONAS};
use crate::core::validate::validate_judgment;
use crate::core::voting::aggregate;
use crate::events::{EventBus, JudgeEvent};
use crate::llm::{Oracle, OracleRequest, RetryError};
use tracing::{debug, warn};

/// Default number of voting rounds per item
pub const DEFAULT_ROUNDS: usize = 3;

/// Validated judgments of one item, in round order
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub judgments: Vec<Judgment>,
    /// Rounds discarded as malformed (only non-zero with `min_votes`)
    pub lost: usize,
}

/// The item could not obtain a usable round set
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("round {round}: {source}")]
    Oracle {
        round: usize,
        #[source]
        source: RetryError,
    },

    #[error("round {round}: {source}")]
    Malformed {
        round: usize,
        #[source]
        source: MalformedResponse,
    },

    #[error("only {valid} valid judgment(s), {required} required")]
    InsufficientVotes { valid: usize, required: usize },
}

/// Runs the voting rounds for single items
#[derive(Debug, Clone)]
pub struct RoundDispatcher {
    oracle: Oracle,
    personas: Vec<String>,
    rounds: usize,
    min_votes: Option<usize>,
    temperature: Option<f64>,
    events: Option<EventBus>,
}

impl RoundDispatcher {
    /// Dispatcher with the built-in personas and [`DEFAULT_ROUNDS`] rounds
    pub fn new(oracle: Oracle) -> Self {
        Self {
            oracle,
            personas: PERSONAS.iter().map(|p| p.to_string()).collect(),
            rounds: DEFAULT_ROUNDS,
            min_votes: None,
            temperature: None,
            events: None,
        }
    }

    /// Number of rounds per item (at least 1)
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Replace the persona list; an empty list keeps the current one
    pub fn with_personas<I, S>(mut self, personas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let personas: Vec<String> = personas.into_iter().map(Into::into).collect();
        if !personas.is_empty() {
            self.personas = personas;
        }
        self
    }

    /// Tolerate malformed rounds as long as `min_votes` judgments remain
    pub fn with_min_votes(mut self, min_votes: Option<usize>) -> Self {
        self.min_votes = min_votes.map(|m| m.max(1));
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Persona used by `round`
    pub fn persona_index(&self, round: usize) -> usize {
        round % self.personas.len()
    }

    fn emit(&self, event: JudgeEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Run every round for `item`
    pub async fn dispatch(&self, item: &Item) -> Result<RoundResult, DispatchError> {
        let prompt = analysis_prompt(item);
        let mut judgments = Vec::with_capacity(self.rounds);
        let mut lost = 0;

        for round in 0..self.rounds {
            let persona = self.persona_index(round);
            self.emit(JudgeEvent::round_requested(
                item.id,
                round,
                persona,
                self.oracle.model_name(),
            ));

            let request = OracleRequest::new(self.personas[persona].as_str(), prompt.as_str())
                .with_temperature(self.temperature);
            let response = self
                .oracle
                .ask(&request)
                .await
                .map_err(|source| DispatchError::Oracle { round, source })?;

            self.emit(JudgeEvent::round_completed(
                item.id,
                round,
                response.tokens.total(),
                response.latency.as_millis() as u64,
            ));

            match extract_response(&response.content) {
                Ok(raw) => {
                    let judgment = validate_judgment(&raw);
                    debug!(item = item.id, round, category = %judgment.category, "Round judged");
                    judgments.push(judgment);
                }
                Err(source) => {
                    self.emit(JudgeEvent::response_malformed(item.id, round, &source.preview));
                    if self.min_votes.is_none() {
                        return Err(DispatchError::Malformed { round, source });
                    }
                    lost += 1;
                }
            }
        }

        let required = self.min_votes.unwrap_or(self.rounds);
        if judgments.len() < required {
            return Err(DispatchError::InsufficientVotes {
                valid: judgments.len(),
                required,
            });
        }

        Ok(RoundResult { judgments, lost })
    }

    /// Consensus record for `item`, or its explicit error record
    pub async fn judge(&self, item: &Item) -> Record {
        let outcome = self
            .dispatch(item)
            .await
            .map_err(|e| e.to_string())
            .and_then(|result| {
                aggregate(&result.judgments)
                    .map(|consensus| (consensus, result.judgments.len()))
                    .map_err(|e| e.to_string())
            });

        match outcome {
            Ok((consensus, votes)) => {
                self.emit(JudgeEvent::consensus_reached(item.id, &consensus, votes));
                Record::judged(item.id, consensus)
            }
            Err(reason) => {
                warn!(item = item.id, reason = %reason, "Dispatch failed");
                self.emit(JudgeEvent::dispatch_failed(item.id, &reason));
                Record::failed(item.id, reason)
            }
        }
    }
}
