//! Phase wiring
//!
//! ```text
//! analyze: items ─► pool ─► RoundDispatcher::judge ─► consensus records
//! verify:  (item, consensus) ─► pool ─► Verifier::verify_or_keep ─► verified records
//! merge:   consensus + verified ─► MergePolicy ─► hybrid records
//! ```
//!
//! The `run_*` methods drive a phase against a [`Store`]: load its inputs,
//! run it, persist whatever was collected and only then report an
//! interruption.

use crate::config::PipelineConfig;
use crate::core::controller::{CancellationToken, ConcurrencyController, RunReport};
use crate::core::dispatch::RoundDispatcher;
use crate::core::error::PipelineError;
use crate::core::judgment::{Item, Phase, Record};
use crate::core::merge::{merge_records, EscalationOnly, MergePolicy};
use crate::core::verify::{Verifier, VerifyJob};
use crate::events::{EventBus, JudgeEvent};
use crate::llm::{create_provider, LlmClient, Oracle};
use crate::store::{Distribution, Store};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Summary of one finished phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub records: usize,
    pub errors: usize,
    /// Hybrid records escalated by the merge policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<usize>,
    pub distribution: Distribution,
}

impl PhaseOutcome {
    fn new(phase: Phase, records: &[Record]) -> Self {
        let distribution = Distribution::from_records(records);
        Self {
            phase,
            records: records.len(),
            errors: distribution.errors,
            overrides: None,
            distribution,
        }
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    dispatcher: RoundDispatcher,
    verifier: Verifier,
    controller: ConcurrencyController,
    policy: Arc<dyn MergePolicy>,
    events: EventBus,
}

impl Pipeline {
    /// Pipeline over explicit analyst and verifier clients
    pub fn new(
        config: Arc<PipelineConfig>,
        analyst: Arc<dyn LlmClient>,
        verifier: Arc<dyn LlmClient>,
        events: EventBus,
    ) -> Self {
        let retry = config.retry.to_retry_config();
        let dispatcher = RoundDispatcher::new(Oracle::new(analyst, retry.clone()))
            .with_rounds(config.rounds)
            .with_min_votes(config.min_votes)
            .with_temperature(config.analyst_temperature)
            .with_events(events.clone());
        let verifier = Verifier::new(Oracle::new(verifier, retry))
            .with_temperature(config.verifier_temperature)
            .with_events(events.clone());

        Self {
            controller: ConcurrencyController::new(config.workers),
            config,
            dispatcher,
            verifier,
            policy: Arc::new(EscalationOnly),
            events,
        }
    }

    /// Pipeline with providers built from the configuration
    pub fn from_config(
        config: Arc<PipelineConfig>,
        events: EventBus,
    ) -> Result<Self, PipelineError> {
        let analyst = create_provider(&config.analyst)?;
        let verifier = create_provider(&config.verifier)?;
        Ok(Self::new(config, analyst, verifier, events))
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.controller = self.controller.with_cancel_token(token);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn MergePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.controller.cancel_token()
    }

    fn finish(&self, phase: Phase, report: &RunReport) {
        self.events.emit(JudgeEvent::run_finished(
            phase,
            report.completed,
            report.skipped,
            report.error_count(),
            report.interrupted,
        ));
    }

    /// Consensus records for every item
    pub async fn analyze(&self, items: Vec<Item>) -> RunReport {
        info!(
            items = items.len(),
            rounds = self.dispatcher.rounds(),
            workers = self.controller.workers(),
            "Starting analysis"
        );
        let dispatcher = self.dispatcher.clone();
        let report = self
            .controller
            .run(items, move |item: Item| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.judge(&item).await }
            })
            .await;
        self.finish(Phase::Consensus, &report);
        report
    }

    /// Verified records; consensus records without a dialog are carried over
    pub async fn verify(&self, items: &[Item], consensus: &[Record]) -> RunReport {
        let dialogs: HashMap<_, _> = items.iter().map(|item| (item.id, item)).collect();
        let mut carried = Vec::new();
        let mut jobs = Vec::with_capacity(consensus.len());
        for record in consensus {
            match dialogs.get(&record.id) {
                Some(item) => jobs.push(VerifyJob {
                    item: (*item).clone(),
                    consensus: record.clone(),
                }),
                None => carried.push(record.clone()),
            }
        }
        info!(jobs = jobs.len(), carried = carried.len(), "Starting verification");

        let verifier = self.verifier.clone();
        let mut report = self
            .controller
            .run(jobs, move |job: VerifyJob| {
                let verifier = verifier.clone();
                async move { verifier.run_job(job).await }
            })
            .await;

        report.completed += carried.len();
        report.records.extend(carried);
        report.records.sort_by_key(|record| record.id);
        self.finish(Phase::Verified, &report);
        report
    }

    /// Hybrid records under the configured policy
    pub fn merge(&self, consensus: &[Record], verified: &[Record]) -> Vec<Record> {
        merge_records(consensus, verified, self.policy.as_ref(), Some(&self.events))
    }

    fn check(phase: Phase, report: &RunReport) -> Result<(), PipelineError> {
        if report.interrupted {
            return Err(PipelineError::Interrupted {
                phase,
                completed: report.completed,
                skipped: report.skipped,
            });
        }
        Ok(())
    }

    pub async fn run_analyze(&self, store: &Store) -> Result<PhaseOutcome, PipelineError> {
        let items = store.load_items().await?;
        let report = self.analyze(items).await;
        store.save_records(Phase::Consensus, &report.records).await?;
        Self::check(Phase::Consensus, &report)?;
        Ok(PhaseOutcome::new(Phase::Consensus, &report.records))
    }

    pub async fn run_verify(&self, store: &Store) -> Result<PhaseOutcome, PipelineError> {
        let items = store.load_items().await?;
        let consensus = store.load_records(Phase::Consensus).await?;
        let report = self.verify(&items, &consensus).await;
        store.save_records(Phase::Verified, &report.records).await?;
        Self::check(Phase::Verified, &report)?;
        Ok(PhaseOutcome::new(Phase::Verified, &report.records))
    }

    pub async fn run_merge(&self, store: &Store) -> Result<PhaseOutcome, PipelineError> {
        merge_phase(store, self.policy.as_ref(), &self.events).await
    }

    /// Analyze, verify and merge in sequence
    pub async fn run_all(&self, store: &Store) -> Result<Vec<PhaseOutcome>, PipelineError> {
        Ok(vec![
            self.run_analyze(store).await?,
            self.run_verify(store).await?,
            self.run_merge(store).await?,
        ])
    }
}

/// Merge the stored consensus and verified sets into the hybrid set
///
/// Needs no oracle, so it is usable without a configured provider.
pub async fn merge_phase(
    store: &Store,
    policy: &dyn MergePolicy,
    events: &EventBus,
) -> Result<PhaseOutcome, PipelineError> {
    let consensus = store.load_records(Phase::Consensus).await?;
    let verified = store.load_records(Phase::Verified).await?;
    let hybrid = merge_records(&consensus, &verified, policy, Some(events));
    store.save_records(Phase::Hybrid, &hybrid).await?;

    let before: HashMap<_, _> = consensus
        .iter()
        .map(|record| (record.id, record.judgment().sentiment))
        .collect();
    let overrides = hybrid
        .iter()
        .filter(|record| before.get(&record.id) != Some(&record.judgment().sentiment))
        .count();
    let mut outcome = PhaseOutcome::new(Phase::Hybrid, &hybrid);
    outcome.overrides = Some(overrides);
    events.emit(JudgeEvent::run_finished(
        Phase::Hybrid,
        hybrid.len(),
        0,
        outcome.errors,
        false,
    ));
    Ok(outcome)
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .finish()
    }
}
