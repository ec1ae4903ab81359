//! Vote Aggregation
//!
//! Reduces the N validated judgments of one item into a single consensus.
//!
//! # Rules
//!
//! - **category / sentiment**: plurality. Ties go to the tied label that
//!   first appeared at the earliest round index.
//! - **score**: median. For even N the two middle values are averaged and a
//!   `.5` rounds toward the higher score.
//! - **flags**: kept iff present in strictly more than N/2 judgments.
//!
//! Score and flag results do not depend on round order. The label tie-break
//! does, so identical ordered round outputs always reproduce the same
//! consensus.

use crate::core::judgment::{Flag, FlagSet, Judgment, Score};
use std::collections::HashMap;
use std::hash::Hash;

/// Error type for aggregation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Aggregation needs at least one judgment
    #[error("cannot aggregate zero judgments")]
    NoJudgments,
}

/// Plurality tally over labels cast in round order
///
/// Tracks, per label, the vote count and the first round index at which the
/// label appeared.
#[derive(Debug, Clone)]
pub struct VoteTally<T> {
    votes: HashMap<T, (usize, usize)>,
    rounds: usize,
}

impl<T> Default for VoteTally<T> {
    fn default() -> Self {
        Self {
            votes: HashMap::new(),
            rounds: 0,
        }
    }
}

impl<T: Copy + Eq + Hash> VoteTally<T> {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Cast the vote of the next round, returning the label's new count
    pub fn cast_vote(&mut self, label: T) -> usize {
        let round = self.rounds;
        self.rounds += 1;
        let entry = self.votes.entry(label).or_insert((0, round));
        entry.0 += 1;
        entry.0
    }

    /// Votes cast for a label
    pub fn votes_for(&self, label: T) -> usize {
        self.votes.get(&label).map(|(count, _)| *count).unwrap_or(0)
    }

    /// Total votes cast
    pub fn total_votes(&self) -> usize {
        self.rounds
    }

    /// Plurality winner, ties broken by earliest first appearance
    pub fn leader(&self) -> Option<T> {
        self.votes
            .iter()
            .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_a.cmp(count_b).then(first_b.cmp(first_a))
            })
            .map(|(label, _)| *label)
    }
}

impl<T: Copy + Eq + Hash> FromIterator<T> for VoteTally<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tally = Self::new();
        for label in iter {
            tally.cast_vote(label);
        }
        tally
    }
}

/// Plurality winner of labels in round order
pub fn plurality<T: Copy + Eq + Hash>(labels: impl IntoIterator<Item = T>) -> Option<T> {
    labels.into_iter().collect::<VoteTally<T>>().leader()
}

/// Median score, rounding an even-count `.5` toward the higher score
pub fn median_score(scores: &[Score]) -> Option<Score> {
    if scores.is_empty() {
        return None;
    }
    let mut values: Vec<u8> = scores.iter().map(|s| s.get()).collect();
    values.sort_unstable();

    let mid = values.len() / 2;
    let median = if values.len() % 2 == 1 {
        values[mid]
    } else {
        let (lo, hi) = (values[mid - 1], values[mid]);
        (lo + hi + 1) / 2
    };
    Score::new(median)
}

/// Flags present in strictly more than half of the judgments
pub fn majority_flags(judgments: &[Judgment]) -> FlagSet {
    let total = judgments.len();
    Flag::ALL
        .into_iter()
        .filter(|&flag| {
            let votes = judgments.iter().filter(|j| j.flags.contains(flag)).count();
            // votes > total / 2 without fractional division
            2 * votes > total
        })
        .collect()
}

/// Reduce round-ordered judgments into one consensus judgment
///
/// # Errors
///
/// Returns `AggregateError::NoJudgments` for empty input.
///
/// # Example
///
/// ```
/// use dialog_judge::core::judgment::{Category, FlagSet, Judgment, Score, Sentiment};
/// use dialog_judge::core::voting::aggregate;
///
/// let vote = |category, score| {
///     Judgment::new(category, Sentiment::Neutral, Score::new(score).unwrap(), FlagSet::new())
/// };
/// let consensus = aggregate(&[
///     vote(Category::Refund, 1),
///     vote(Category::PaymentIssue, 5),
///     vote(Category::PaymentIssue, 3),
/// ])
/// .unwrap();
/// assert_eq!(consensus.category, Category::PaymentIssue);
/// assert_eq!(consensus.score.get(), 3);
/// ```
pub fn aggregate(judgments: &[Judgment]) -> Result<Judgment, AggregateError> {
    let category = plurality(judgments.iter().map(|j| j.category));
    let sentiment = plurality(judgments.iter().map(|j| j.sentiment));
    let scores: Vec<Score> = judgments.iter().map(|j| j.score).collect();

    match (category, sentiment, median_score(&scores)) {
        (Some(category), Some(sentiment), Some(score)) => Ok(Judgment::new(
            category,
            sentiment,
            score,
            majority_flags(judgments),
        )),
        _ => Err(AggregateError::NoJudgments),
    }
}
