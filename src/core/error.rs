//! Run-level errors
//!
//! Per-item failures never surface here: they become error records. Only
//! setup problems and cancellation abort a run.

use crate::config::ConfigError;
use crate::core::judgment::Phase;
use crate::llm::adapter::ProviderError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Cancelled; the partial record set was persisted first
    #[error("{phase} phase interrupted: {completed} completed, {skipped} skipped")]
    Interrupted {
        phase: Phase,
        completed: usize,
        skipped: usize,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
