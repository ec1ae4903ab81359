//! dialog-judge - Ensemble LLM judgments for support dialogs
//!
//! Turns noisy, non-deterministic oracle replies into one stable structured
//! classification per customer-support dialog:
//!
//! - **Voting rounds**: several independent judgments per dialog, each under
//!   a different analyst persona
//! - **Robust extraction**: reasoning preambles, code fences and stray prose
//!   are tolerated; invalid labels are canonicalized to explicit defaults
//! - **Deterministic aggregation**: plurality labels, median score,
//!   strict-majority flags
//! - **Verification**: a second, independent auditor pass
//! - **Escalation-only merge**: the auditor can expose a hidden problem but
//!   never hide a detected one
//!
//! # Quick Start
//!
//! ```rust
//! use dialog_judge::core::{aggregate, Category, FlagSet, Judgment, Score, Sentiment};
//!
//! let vote = |category, score| {
//!     Judgment::new(category, Sentiment::Neutral, Score::new(score).unwrap(), FlagSet::new())
//! };
//! let consensus = aggregate(&[
//!     vote(Category::Refund, 2),
//!     vote(Category::Other, 5),
//!     vote(Category::Refund, 3),
//! ])
//! .unwrap();
//!
//! assert_eq!(consensus.category, Category::Refund);
//! assert_eq!(consensus.score.get(), 3);
//! ```

pub mod config;
pub mod core;
pub mod events;
pub mod llm;
pub mod store;

// Re-export commonly used items at crate root
pub use crate::config::PipelineConfig;
pub use crate::core::{Judgment, Pipeline, PipelineError, Record};
pub use events::observers::{LoggingObserver, MetricsObserver};
pub use events::{EventBus, JudgeEvent};
pub use store::Store;
