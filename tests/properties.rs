//! Property-based tests for the judgment pipeline
//!
//! Validator totality, aggregation laws, the escalation-only merge law and
//! answer recovery, checked with proptest.

use dialog_judge::core::extract::extract_response;
use dialog_judge::core::judgment::{Category, Flag, FlagSet, Judgment, Score, Sentiment};
use dialog_judge::core::merge::{EscalationOnly, MergePolicy};
use dialog_judge::core::validate::validate_judgment;
use dialog_judge::core::voting::{aggregate, median_score};
use proptest::prelude::*;
use serde_json::{Map, Value};

// ============================================================================
// Strategies
// ============================================================================

fn arb_category() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

fn arb_sentiment() -> impl Strategy<Value = Sentiment> {
    prop::sample::select(Sentiment::ALL.to_vec())
}

fn arb_score() -> impl Strategy<Value = Score> {
    (1u8..=5).prop_map(|value| Score::new(value).unwrap())
}

fn arb_flags() -> impl Strategy<Value = FlagSet> {
    prop::sample::subsequence(Flag::ALL.to_vec(), 0..=Flag::ALL.len())
        .prop_map(|flags| flags.into_iter().collect())
}

fn arb_judgment() -> impl Strategy<Value = Judgment> {
    (arb_category(), arb_sentiment(), arb_score(), arb_flags())
        .prop_map(|(category, sentiment, score, flags)| {
            Judgment::new(category, sentiment, score, flags)
        })
}

/// Arbitrary JSON, biased toward strings that look like labels
fn arb_json() -> impl Strategy<Value = Value> {
    let label = prop::sample::select(vec![
        "refund",
        " Payment_Issue ",
        "billing",
        "unsatisfied",
        "SATISFIED",
        "no_resolution",
        "fake_mistake",
        "",
    ])
    .prop_map(|s| Value::String(s.to_string()));

    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-10i64..10).prop_map(Value::from),
        (-100.0f64..100.0).prop_map(Value::from),
        ".{0,12}".prop_map(Value::String),
        label,
    ];

    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((".{0,6}", inner), 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

/// Objects using the judgment keys (and some noise) with arbitrary values
fn arb_reply_object() -> impl Strategy<Value = Map<String, Value>> {
    let key = prop::sample::select(vec![
        "intent",
        "category",
        "satisfaction",
        "sentiment",
        "quality_score",
        "score",
        "agent_mistakes",
        "flags",
        "reasoning",
    ]);
    prop::collection::vec((key, arb_json()), 0..8)
        .prop_map(|entries| entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn as_object(judgment: &Judgment) -> Map<String, Value> {
    match serde_json::to_value(judgment).unwrap() {
        Value::Object(map) => map,
        other => panic!("judgment serialized to {other:?}"),
    }
}

// ============================================================================
// Validator Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: the validator is total and its output survives the wire format
    #[test]
    fn prop_validator_total_and_in_domain(raw in arb_reply_object()) {
        let judgment = validate_judgment(&raw);

        prop_assert!((1..=5).contains(&judgment.score.get()));
        let wire = serde_json::to_value(&judgment).unwrap();
        let back: Judgment = serde_json::from_value(wire).unwrap();
        prop_assert_eq!(back, judgment);
    }

    /// Property: an in-domain object is canonicalized to itself
    #[test]
    fn prop_validator_preserves_valid_judgments(judgment in arb_judgment()) {
        prop_assert_eq!(validate_judgment(&as_object(&judgment)), judgment);
    }

    /// Property: invalid fields default independently of valid ones
    #[test]
    fn prop_invalid_score_only_touches_score(judgment in arb_judgment(), bad in 6i64..1000) {
        let mut raw = as_object(&judgment);
        raw.insert("quality_score".to_string(), Value::from(bad));

        let validated = validate_judgment(&raw);
        prop_assert_eq!(validated.score, Score::DEFAULT);
        prop_assert_eq!(validated.category, judgment.category);
        prop_assert_eq!(validated.sentiment, judgment.sentiment);
        prop_assert_eq!(validated.flags, judgment.flags);
    }
}

// ============================================================================
// Extraction Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Property: ANSWER block after brace-free prose is recovered exactly
    #[test]
    fn prop_answer_after_prose_recovered(
        prose in "[A-Za-z0-9 .,:;!?'\n-]{0,200}",
        trailing in "[A-Za-z .]{0,40}",
        judgment in arb_judgment(),
    ) {
        let payload = serde_json::to_string(&judgment).unwrap();
        let reply = format!("REASONING: {}\nANSWER:\n{}\n{}", prose, payload, trailing);

        let raw = extract_response(&reply).unwrap();
        prop_assert_eq!(validate_judgment(&raw), judgment);
    }

    /// Property: fenced payloads are recovered
    #[test]
    fn prop_fenced_answer_recovered(judgment in arb_judgment(), lang in "(json|JSON|)") {
        let payload = serde_json::to_string_pretty(&judgment).unwrap();
        let reply = format!("Here you go:\n```{}\n{}\n```", lang, payload);

        let raw = extract_response(&reply).unwrap();
        prop_assert_eq!(validate_judgment(&raw), judgment);
    }

    /// Property: brace-free text never yields an object
    #[test]
    fn prop_brace_free_text_is_malformed(text in "[^{}]{0,200}") {
        prop_assert!(extract_response(&text).is_err());
    }
}

// ============================================================================
// Aggregation Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: aggregation is a pure function of its input
    #[test]
    fn prop_aggregate_deterministic(judgments in prop::collection::vec(arb_judgment(), 1..8)) {
        prop_assert_eq!(aggregate(&judgments).unwrap(), aggregate(&judgments).unwrap());
    }

    /// Property: the winning category has the highest count, ties to the earliest
    #[test]
    fn prop_category_is_earliest_plurality(
        judgments in prop::collection::vec(arb_judgment(), 1..8),
    ) {
        let consensus = aggregate(&judgments).unwrap();
        let count = |c: Category| judgments.iter().filter(|j| j.category == c).count();
        let best = count(consensus.category);

        prop_assert!(Category::ALL.iter().all(|&c| count(c) <= best));
        let first_winner = judgments.iter().position(|j| j.category == consensus.category);
        let first_tied = judgments.iter().position(|j| count(j.category) == best);
        prop_assert_eq!(first_winner, first_tied);
    }

    /// Property: the median lies within the observed scores
    #[test]
    fn prop_median_within_range(scores in prop::collection::vec(arb_score(), 1..9)) {
        let median = median_score(&scores).unwrap();
        let min = scores.iter().min().unwrap();
        let max = scores.iter().max().unwrap();
        prop_assert!(*min <= median && median <= *max);
    }

    /// Property: score and flags do not depend on round order
    #[test]
    fn prop_score_and_flags_order_independent(
        judgments in prop::collection::vec(arb_judgment(), 1..8),
    ) {
        let mut reversed = judgments.clone();
        reversed.reverse();
        let forward = aggregate(&judgments).unwrap();
        let backward = aggregate(&reversed).unwrap();
        prop_assert_eq!(forward.score, backward.score);
        prop_assert_eq!(forward.flags, backward.flags);
    }

    /// Property: a flag survives iff strictly more than half the rounds carry it
    #[test]
    fn prop_flags_strict_majority(judgments in prop::collection::vec(arb_judgment(), 1..8)) {
        let consensus = aggregate(&judgments).unwrap();
        for flag in Flag::ALL {
            let votes = judgments.iter().filter(|j| j.flags.contains(flag)).count();
            prop_assert_eq!(consensus.flags.contains(flag), 2 * votes > judgments.len());
        }
    }
}

// ============================================================================
// Merge Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Property: the merge never improves a record and never touches labels
    #[test]
    fn prop_merge_is_escalation_only(consensus in arb_judgment(), verified in arb_judgment()) {
        let merged = EscalationOnly.merge(&consensus, &verified);

        prop_assert!(merged.sentiment >= consensus.sentiment);
        prop_assert!(merged.score <= consensus.score);
        prop_assert_eq!(merged.category, consensus.category);
        prop_assert_eq!(&merged.flags, &consensus.flags);
        if merged.sentiment != consensus.sentiment {
            prop_assert_eq!(merged.sentiment, Sentiment::Unsatisfied);
            prop_assert!(merged.score <= Score::ESCALATED_MAX);
        }
    }

    /// Property: an echoing verifier changes nothing
    #[test]
    fn prop_merge_identity_on_echo(consensus in arb_judgment()) {
        prop_assert_eq!(EscalationOnly.merge(&consensus, &consensus), consensus);
    }

    /// Property: the merge is idempotent
    #[test]
    fn prop_merge_idempotent(consensus in arb_judgment(), verified in arb_judgment()) {
        let once = EscalationOnly.merge(&consensus, &verified);
        prop_assert_eq!(EscalationOnly.merge(&once, &verified), once);
    }
}

// ============================================================================
// Fixed Examples
// ============================================================================

fn vote(category: Category, score: u8, flags: &[Flag]) -> Judgment {
    Judgment::new(
        category,
        Sentiment::Neutral,
        Score::new(score).unwrap(),
        flags.iter().copied().collect(),
    )
}

#[test]
fn test_aba_picks_a() {
    let consensus = aggregate(&[
        vote(Category::Refund, 3, &[]),
        vote(Category::Other, 3, &[]),
        vote(Category::Refund, 3, &[]),
    ])
    .unwrap();
    assert_eq!(consensus.category, Category::Refund);
}

#[test]
fn test_abb_with_scores_picks_b_and_median() {
    let consensus = aggregate(&[
        vote(Category::Refund, 1, &[]),
        vote(Category::Other, 5, &[]),
        vote(Category::Other, 3, &[]),
    ])
    .unwrap();
    assert_eq!(consensus.category, Category::Other);
    assert_eq!(consensus.score.get(), 3);
}

#[test]
fn test_flag_thresholds() {
    let nr = [Flag::NoResolution];
    let two_of_three = aggregate(&[
        vote(Category::Refund, 3, &nr),
        vote(Category::Refund, 3, &nr),
        vote(Category::Refund, 3, &[]),
    ])
    .unwrap();
    assert!(two_of_three.flags.contains(Flag::NoResolution));

    let one_of_four = aggregate(&[
        vote(Category::Refund, 3, &nr),
        vote(Category::Refund, 3, &[]),
        vote(Category::Refund, 3, &[]),
        vote(Category::Refund, 3, &[]),
    ])
    .unwrap();
    assert!(one_of_four.flags.is_empty());

    let two_of_four = aggregate(&[
        vote(Category::Refund, 3, &nr),
        vote(Category::Refund, 3, &nr),
        vote(Category::Refund, 3, &[]),
        vote(Category::Refund, 3, &[]),
    ])
    .unwrap();
    assert!(two_of_four.flags.is_empty());
}
