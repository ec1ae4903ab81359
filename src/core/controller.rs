//! Concurrency Controller
//!
//! Bounded worker pool over all jobs of a phase: a `Semaphore` caps the
//! number of in-flight jobs and a `JoinSet` collects them. Completion order
//! is unconstrained; the returned records are sorted by item id.
//!
//! A [`CancellationToken`] stops admission of new jobs and aborts in-flight
//! ones. Records already collected are returned untouched; every item is
//! either fully processed or absent. A job that panics becomes an explicit
//! error record for its item.

use crate::core::judgment::{Item, ItemId, Record};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Default pool width
pub const DEFAULT_WORKERS: usize = 5;

/// Cloneable cancellation flag that can also be awaited
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A unit of work keyed by the item it produces a record for
pub trait Keyed {
    fn key(&self) -> ItemId;
}

impl Keyed for Item {
    fn key(&self) -> ItemId {
        self.id
    }
}

/// Outcome of one pooled phase
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Collected records, ascending by id
    pub records: Vec<Record>,
    pub completed: usize,
    /// Jobs never started or aborted by cancellation
    pub skipped: usize,
    pub interrupted: bool,
}

impl RunReport {
    /// Records that carry an error
    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_error()).count()
    }
}

/// Bounded pool shared by the analysis and verification phases
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    workers: usize,
    cancel: CancellationToken,
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl ConcurrencyController {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `job` over every input with at most `workers` in flight
    pub async fn run<T, F, Fut>(&self, jobs: Vec<T>, job: F) -> RunReport
    where
        T: Keyed + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Record> + Send + 'static,
    {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let job = Arc::new(job);
        let mut set: JoinSet<(ItemId, Option<Record>)> = JoinSet::new();

        for input in jobs {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let id = input.key();
            let job = Arc::clone(&job);
            let cancel = self.cancel.clone();
            set.spawn(async move {
                let _permit = permit;
                // Inner task isolates panics from the pool bookkeeping
                let mut task = tokio::spawn(job(input));
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        task.abort();
                        (id, None)
                    }
                    joined = &mut task => match joined {
                        Ok(record) => (id, Some(record)),
                        Err(err) if err.is_panic() => {
                            error!(item = id, "Worker panicked");
                            (id, Some(Record::failed(id, "worker panicked")))
                        }
                        Err(_) => (id, None),
                    },
                }
            });
        }

        let mut records = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Some(record))) => records.push(record),
                Ok((id, None)) => debug!(item = id, "Job cancelled"),
                Err(err) => error!(error = %err, "Pool task failed"),
            }
        }
        records.sort_by_key(|record| record.id);

        let completed = records.len();
        let skipped = total - completed;
        RunReport {
            records,
            completed,
            skipped,
            interrupted: self.cancel.is_cancelled() && skipped > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::judgment::Judgment;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn items(n: u64) -> Vec<Item> {
        (0..n).map(|id| Item::new(id, Vec::new())).collect()
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_sorted_despite_completion_order() {
        let controller = ConcurrencyController::new(4);
        let report = controller
            .run(items(8), |item: Item| async move {
                // Later ids finish first
                tokio::time::sleep(Duration::from_millis(100 - item.id * 10)).await;
                Record::judged(item.id, Judgment::fallback())
            })
            .await;

        let ids: Vec<ItemId> = report.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert_eq!(report.completed, 8);
        assert_eq!(report.skipped, 0);
        assert!(!report.interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_width_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let controller = ConcurrencyController::new(3);

        let report = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            controller
                .run(items(12), move |item: Item| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Record::judged(item.id, Judgment::fallback())
                    }
                })
                .await
        };

        assert_eq!(report.completed, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_error_record() {
        let report = ConcurrencyController::new(2)
            .run(items(3), |item: Item| async move {
                if item.id == 1 {
                    panic!("boom");
                }
                Record::judged(item.id, Judgment::fallback())
            })
            .await;

        assert_eq!(report.completed, 3);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.records[1].error(), Some("worker panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_yields_subset() {
        let token = CancellationToken::new();
        let controller = ConcurrencyController::new(2).with_cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            token.cancel();
        });

        let report = controller
            .run(items(10), |item: Item| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Record::judged(item.id, Judgment::fallback())
            })
            .await;
        canceller.await.unwrap();

        assert!(report.interrupted);
        assert!(report.completed > 0 && report.completed < 10);
        assert_eq!(report.completed + report.skipped, 10);
        assert!(report.records.iter().all(|r| !r.is_error()));
        assert!(report.records.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let report = ConcurrencyController::new(2)
            .with_cancel_token(token)
            .run(items(4), |item: Item| async move {
                Record::judged(item.id, Judgment::fallback())
            })
            .await;
        assert_eq!(report.completed, 0);
        assert_eq!(report.skipped, 4);
        assert!(report.interrupted);
    }
}
