//! Metrics Observer
//!
//! Prometheus-compatible counters and a latency histogram built from the
//! event stream:
//! - Counters: rounds by model, malformed replies, dispatch failures,
//!   verification outcomes, hybrid overrides, consensus by category
//! - Histogram: oracle round latency
//! - Gauge: tokens used

use crate::events::{EventBus, JudgeEvent};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Histogram bucket boundaries for round latency (milliseconds)
pub const LATENCY_BUCKETS: [u64; 7] = [100, 500, 1000, 2500, 5000, 10000, 30000];

/// Metrics collected from judge events
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Rounds requested, by model
    pub rounds_total: BTreeMap<String, u64>,
    /// Consensus records, by category label
    pub consensus_total: BTreeMap<String, u64>,
    pub malformed_total: u64,
    pub dispatch_failures_total: u64,
    pub verifications_changed: u64,
    pub verifications_unchanged: u64,
    pub verification_fallbacks_total: u64,
    pub overrides_total: u64,
    /// Round latency histogram (bucket -> count, non-cumulative)
    pub latency_histogram: BTreeMap<u64, u64>,
    pub latency_sum_ms: u64,
    pub latency_count: u64,
    pub tokens_total: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_round(&mut self, model: &str) {
        *self.rounds_total.entry(model.to_string()).or_insert(0) += 1;
    }

    pub fn record_consensus(&mut self, category: &str) {
        *self.consensus_total.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Record round latency; values above the last bucket land in it
    pub fn record_latency(&mut self, latency_ms: u64) {
        let last = LATENCY_BUCKETS[LATENCY_BUCKETS.len() - 1];
        let bucket = LATENCY_BUCKETS
            .iter()
            .copied()
            .find(|&b| latency_ms <= b)
            .unwrap_or(last);
        *self.latency_histogram.entry(bucket).or_insert(0) += 1;

        self.latency_sum_ms += latency_ms;
        self.latency_count += 1;
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            0.0
        } else {
            self.latency_sum_ms as f64 / self.latency_count as f64
        }
    }

    /// Apply one event
    pub fn apply(&mut self, event: &JudgeEvent) {
        match event {
            JudgeEvent::RoundRequested { model, .. } => self.record_round(model),
            JudgeEvent::RoundCompleted {
                tokens_used,
                latency_ms,
                ..
            } => {
                self.record_latency(*latency_ms);
                self.tokens_total += *tokens_used as u64;
            }
            JudgeEvent::ResponseMalformed { .. } => self.malformed_total += 1,
            JudgeEvent::ConsensusReached { category, .. } => {
                self.record_consensus(category.as_str())
            }
            JudgeEvent::DispatchFailed { .. } => self.dispatch_failures_total += 1,
            JudgeEvent::VerificationCompleted { changed: true, .. } => {
                self.verifications_changed += 1
            }
            JudgeEvent::VerificationCompleted { changed: false, .. } => {
                self.verifications_unchanged += 1
            }
            JudgeEvent::VerificationFallback { .. } => self.verification_fallbacks_total += 1,
            JudgeEvent::HybridOverride { .. } => self.overrides_total += 1,
            JudgeEvent::RunFinished { .. } => {}
        }
    }

    /// Format metrics as Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP judge_rounds_total Oracle rounds requested\n");
        output.push_str("# TYPE judge_rounds_total counter\n");
        for (model, count) in &self.rounds_total {
            output.push_str(&format!("judge_rounds_total{{model=\"{}\"}} {}\n", model, count));
        }

        output.push_str("# HELP judge_consensus_total Consensus records by category\n");
        output.push_str("# TYPE judge_consensus_total counter\n");
        for (category, count) in &self.consensus_total {
            output.push_str(&format!(
                "judge_consensus_total{{category=\"{}\"}} {}\n",
                category, count
            ));
        }

        let counters = [
            (
                "judge_malformed_total",
                "Replies with no structured answer",
                self.malformed_total,
            ),
            (
                "judge_dispatch_failures_total",
                "Items written as error records",
                self.dispatch_failures_total,
            ),
            (
                "judge_verification_fallbacks_total",
                "Verifications that kept consensus",
                self.verification_fallbacks_total,
            ),
            (
                "judge_overrides_total",
                "Hybrid escalations to unsatisfied",
                self.overrides_total,
            ),
            (
                "judge_tokens_total",
                "Tokens reported by the oracle",
                self.tokens_total,
            ),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
                name, help, name, name, value
            ));
        }

        output.push_str("# HELP judge_verifications_total Verifier outcomes\n");
        output.push_str("# TYPE judge_verifications_total counter\n");
        output.push_str(&format!(
            "judge_verifications_total{{outcome=\"changed\"}} {}\n",
            self.verifications_changed
        ));
        output.push_str(&format!(
            "judge_verifications_total{{outcome=\"unchanged\"}} {}\n",
            self.verifications_unchanged
        ));

        output.push_str("# HELP judge_round_latency_ms Oracle round latency in milliseconds\n");
        output.push_str("# TYPE judge_round_latency_ms histogram\n");
        let mut cumulative = 0u64;
        for &bucket in &LATENCY_BUCKETS {
            cumulative += self.latency_histogram.get(&bucket).copied().unwrap_or(0);
            output.push_str(&format!(
                "judge_round_latency_ms_bucket{{le=\"{}\"}} {}\n",
                bucket, cumulative
            ));
        }
        output.push_str(&format!(
            "judge_round_latency_ms_bucket{{le=\"+Inf\"}} {}\n",
            self.latency_count
        ));
        output.push_str(&format!("judge_round_latency_ms_sum {}\n", self.latency_sum_ms));
        output.push_str(&format!("judge_round_latency_ms_count {}\n", self.latency_count));

        output
    }

    /// Human-readable summary
    pub fn report(&self) -> String {
        let mut output = String::from("=== Judge Metrics ===\n\n");

        output.push_str("Rounds by model:\n");
        for (model, count) in &self.rounds_total {
            output.push_str(&format!("  {}: {}\n", model, count));
        }

        output.push_str(&format!(
            "\nMalformed replies: {}\nDispatch failures: {}\n",
            self.malformed_total, self.dispatch_failures_total
        ));
        output.push_str(&format!(
            "Verification: changed={}, unchanged={}, fallbacks={}\n",
            self.verifications_changed,
            self.verifications_unchanged,
            self.verification_fallbacks_total
        ));
        output.push_str(&format!("Hybrid overrides: {}\n", self.overrides_total));
        output.push_str(&format!(
            "Latency: avg={:.1}ms, count={}\nTokens: {}\n",
            self.avg_latency_ms(),
            self.latency_count,
            self.tokens_total
        ));

        output
    }
}

/// Observer that aggregates metrics from the bus
pub struct MetricsObserver {
    receiver: broadcast::Receiver<JudgeEvent>,
    metrics: Arc<Mutex<Metrics>>,
}

impl MetricsObserver {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            receiver: bus.subscribe(),
            metrics: Arc::new(Mutex::new(Metrics::new())),
        }
    }

    /// Shared handle for reading metrics while the observer runs
    pub fn metrics(&self) -> Arc<Mutex<Metrics>> {
        Arc::clone(&self.metrics)
    }

    /// Collect metrics until the bus closes
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Ok(mut metrics) = self.metrics.lock() {
                        metrics.apply(&event);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }
}
