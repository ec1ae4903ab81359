//! Core judgment pipeline
//!
//! - `judgment`: closed label domain, items and records
//! - `extract`: structured payload extraction from free-text replies
//! - `validate`: canonicalization into the label domain
//! - `prompts`: analyst and auditor prompts
//! - `voting`: plurality / median / strict-majority aggregation
//! - `dispatch`: voting rounds for one item
//! - `controller`: bounded worker pool with cancellation
//! - `verify`: independent verification pass
//! - `merge`: escalation-only hybrid merge
//! - `pipeline`: phase wiring

pub mod controller;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod judgment;
pub mod merge;
pub mod pipeline;
pub mod prompts;
pub mod validate;
pub mod verify;
pub mod voting;

pub use controller::{CancellationToken, ConcurrencyController, RunReport};
pub use dispatch::{DispatchError, RoundDispatcher, RoundResult};
pub use error::PipelineError;
pub use extract::{extract_response, MalformedResponse, Strategy};
pub use judgment::{
    Category, Flag, FlagSet, Item, ItemId, Judgment, Phase, Record, Role, Score, Sentiment, Turn,
};
pub use merge::{merge_records, EscalationOnly, MergePolicy};
pub use pipeline::{PhaseOutcome, Pipeline};
pub use validate::validate_judgment;
pub use verify::{Verifier, VerifyError, VerifyJob};
pub use voting::{aggregate, majority_flags, median_score, plurality, AggregateError, VoteTally};
