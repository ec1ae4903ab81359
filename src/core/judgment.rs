//! Judgment Data Model
//!
//! The closed label domain every oracle reply is canonicalized into, plus the
//! input items and the per-phase output records.
//!
//! # Domain
//!
//! - `Category`: six primary-reason labels, `Other` is the catch-all
//! - `Sentiment`: three levels ordered by dissatisfaction
//! - `Score`: integer quality rating in `1..=5`
//! - `FlagSet`: subset of five agent-defect labels
//!
//! An out-of-domain `Judgment` is unrepresentable; the validator is the only
//! place raw oracle output becomes one.
//!
//! # Wire Format
//!
//! Records keep the field names of the established dataset files
//! (`intent`, `satisfaction`, `quality_score`, `agent_mistakes`). The shorter
//! names (`category`, `sentiment`, `score`, `flags`) are accepted on input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of an input item
pub type ItemId = u64;

/// Primary reason the customer made contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Failed, duplicated, pending or wrong charge
    PaymentIssue,
    /// Platform malfunction unrelated to payments
    TechnicalError,
    /// Login, password, lockout, 2FA
    AccountAccess,
    /// Plans, pricing, upgrades and downgrades
    PricingPlan,
    /// Money back, refund status or policy
    Refund,
    /// Catch-all
    Other,
}

impl Category {
    /// All categories in declaration order
    pub const ALL: [Category; 6] = [
        Category::PaymentIssue,
        Category::TechnicalError,
        Category::AccountAccess,
        Category::PricingPlan,
        Category::Refund,
        Category::Other,
    ];

    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PaymentIssue => "payment_issue",
            Category::TechnicalError => "technical_error",
            Category::AccountAccess => "account_access",
            Category::PricingPlan => "pricing_plan",
            Category::Refund => "refund",
            Category::Other => "other",
        }
    }

    /// Parse a wire label (trimmed, ASCII case-insensitive)
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer sentiment at the end of the dialog
///
/// Variants are declared from least to most dissatisfied, so the derived
/// `Ord` is the dissatisfaction ordering: `Satisfied < Neutral < Unsatisfied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    /// Problem resolved, genuine gratitude
    Satisfied,
    /// Partial resolution, lukewarm
    Neutral,
    /// Unresolved, frustrated, or politely dissatisfied
    Unsatisfied,
}

impl Sentiment {
    /// All sentiments in dissatisfaction order
    pub const ALL: [Sentiment; 3] = [
        Sentiment::Satisfied,
        Sentiment::Neutral,
        Sentiment::Unsatisfied,
    ];

    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Satisfied => "satisfied",
            Sentiment::Neutral => "neutral",
            Sentiment::Unsatisfied => "unsatisfied",
        }
    }

    /// Parse a wire label (trimmed, ASCII case-insensitive)
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Sentiment::Neutral
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality rating in `1..=5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    /// Lowest rating
    pub const MIN: Score = Score(1);
    /// Highest rating
    pub const MAX: Score = Score(5);
    /// Rating substituted for invalid input
    pub const DEFAULT: Score = Score(3);
    /// Highest rating a record escalated to `unsatisfied` may keep
    pub const ESCALATED_MAX: Score = Score(3);

    /// Create a score, `None` when outside `1..=5`
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&value)
            .then_some(Self(value))
    }

    /// Create a score from any integer, `None` when outside `1..=5`
    pub fn from_i64(value: i64) -> Option<Self> {
        u8::try_from(value).ok().and_then(Self::new)
    }

    /// The rating value
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("score must be in 1..=5, got {}", value))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Agent defect label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// A direct customer question was skipped entirely
    IgnoredQuestion,
    /// Agent stated something demonstrably false
    IncorrectInfo,
    /// Dismissive, condescending or hostile language
    RudeTone,
    /// The primary problem remains unsolved
    NoResolution,
    /// Transfer for something the agent could have handled
    UnnecessaryEscalation,
}

impl Flag {
    /// All flags in declaration order
    pub const ALL: [Flag; 5] = [
        Flag::IgnoredQuestion,
        Flag::IncorrectInfo,
        Flag::RudeTone,
        Flag::NoResolution,
        Flag::UnnecessaryEscalation,
    ];

    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::IgnoredQuestion => "ignored_question",
            Flag::IncorrectInfo => "incorrect_info",
            Flag::RudeTone => "rude_tone",
            Flag::NoResolution => "no_resolution",
            Flag::UnnecessaryEscalation => "unnecessary_escalation",
        }
    }

    /// Parse a wire label (trimmed, ASCII case-insensitive)
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of defect flags; serialized as an array in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeSet<Flag>);

impl FlagSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag; returns false when it was already present
    pub fn insert(&mut self, flag: Flag) -> bool {
        self.0.insert(flag)
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Flags in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Flag; N]> for FlagSet {
    fn from(flags: [Flag; N]) -> Self {
        flags.into_iter().collect()
    }
}

/// One structured judgment of a dialog
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Judgment {
    /// Primary contact reason
    #[serde(rename = "intent", alias = "category")]
    pub category: Category,
    /// Customer sentiment
    #[serde(rename = "satisfaction", alias = "sentiment")]
    pub sentiment: Sentiment,
    /// Quality rating
    #[serde(rename = "quality_score", alias = "score")]
    pub score: Score,
    /// Agent defects
    #[serde(rename = "agent_mistakes", alias = "flags", default)]
    pub flags: FlagSet,
}

impl Judgment {
    /// Create a judgment from in-domain parts
    pub fn new(category: Category, sentiment: Sentiment, score: Score, flags: FlagSet) -> Self {
        Self {
            category,
            sentiment,
            score,
            flags,
        }
    }

    /// The explicit default used for error fallbacks: `other`, `neutral`, 3, no flags
    pub fn fallback() -> Self {
        Self::default()
    }
}

/// Speaker of a dialog turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Agent,
}

impl Role {
    /// Label used when rendering a dialog into a prompt
    pub fn label(&self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Agent => "Agent",
        }
    }
}

/// One dialog turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn customer(text: impl Into<String>) -> Self {
        Self {
            role: Role::Customer,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }
}

/// One input record: an identified dialog
///
/// Dataset files may carry extra descriptive fields; they are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub messages: Vec<Turn>,
}

impl Item {
    pub fn new(id: ItemId, messages: Vec<Turn>) -> Self {
        Self { id, messages }
    }
}

/// Judgment body of a record, with the failure reason of an explicit fallback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(flatten)]
    pub judgment: Judgment,
    /// Present only on error fallback records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-item output of a pipeline phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: ItemId,
    pub analysis: Assessment,
}

impl Record {
    /// A successful judgment for an item
    pub fn judged(id: ItemId, judgment: Judgment) -> Self {
        Self {
            id,
            analysis: Assessment {
                judgment,
                error: None,
            },
        }
    }

    /// An explicit, clearly flagged default record carrying the failure reason
    pub fn failed(id: ItemId, reason: impl Into<String>) -> Self {
        Self {
            id,
            analysis: Assessment {
                judgment: Judgment::fallback(),
                error: Some(reason.into()),
            },
        }
    }

    pub fn judgment(&self) -> &Judgment {
        &self.analysis.judgment
    }

    pub fn error(&self) -> Option<&str> {
        self.analysis.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.analysis.error.is_some()
    }
}

/// Which pipeline artifact a record set is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Vote aggregation output
    Consensus,
    /// Verifier output
    Verified,
    /// Escalation-only merge output
    Hybrid,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Consensus, Phase::Verified, Phase::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Consensus => "consensus",
            Phase::Verified => "verified",
            Phase::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==========================================
    // Label Parsing Tests
    // ==========================================

    #[test]
    fn test_category_parse_roundtrips_all_labels() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn test_category_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(Category::parse("  Refund "), Some(Category::Refund));
        assert_eq!(Category::parse("PAYMENT_ISSUE"), Some(Category::PaymentIssue));
        assert_eq!(Category::parse("billing"), None);
    }

    #[test]
    fn test_sentiment_ordering_is_dissatisfaction() {
        assert!(Sentiment::Satisfied < Sentiment::Neutral);
        assert!(Sentiment::Neutral < Sentiment::Unsatisfied);
    }

    #[test]
    fn test_flag_parse_rejects_unknown() {
        assert_eq!(Flag::parse("no_resolution"), Some(Flag::NoResolution));
        assert_eq!(Flag::parse("fake_mistake"), None);
    }

    // ==========================================
    // Score Tests
    // ==========================================

    #[test]
    fn test_score_bounds() {
        assert!(Score::new(0).is_none());
        assert_eq!(Score::new(1), Some(Score::MIN));
        assert_eq!(Score::new(5), Some(Score::MAX));
        assert!(Score::new(6).is_none());
        assert!(Score::from_i64(-3).is_none());
        assert!(Score::from_i64(300).is_none());
    }

    #[test]
    fn test_score_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_value::<Score>(json!(4)).is_ok());
        assert!(serde_json::from_value::<Score>(json!(9)).is_err());
    }

    // ==========================================
    // Serialization Tests
    // ==========================================

    #[test]
    fn test_judgment_uses_dataset_field_names() {
        let judgment = Judgment::new(
            Category::Refund,
            Sentiment::Unsatisfied,
            Score::new(2).unwrap(),
            FlagSet::from([Flag::NoResolution, Flag::IgnoredQuestion]),
        );
        let value = serde_json::to_value(&judgment).unwrap();
        assert_eq!(
            value,
            json!({
                "intent": "refund",
                "satisfaction": "unsatisfied",
                "quality_score": 2,
                "agent_mistakes": ["ignored_question", "no_resolution"]
            })
        );
    }

    #[test]
    fn test_judgment_accepts_short_field_names() {
        let judgment: Judgment = serde_json::from_value(json!({
            "category": "other",
            "sentiment": "neutral",
            "score": 3,
            "flags": []
        }))
        .unwrap();
        assert_eq!(judgment, Judgment::fallback());
    }

    #[test]
    fn test_error_record_flattens_reason_into_analysis() {
        let record = Record::failed(7, "oracle unavailable");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["analysis"]["intent"], "other");
        assert_eq!(value["analysis"]["quality_score"], 3);
        assert_eq!(value["analysis"]["error"], "oracle unavailable");

        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_judged_record_omits_error() {
        let record = Record::judged(1, Judgment::fallback());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["analysis"].get("error").is_none());
        assert!(!record.is_error());
    }

    #[test]
    fn test_item_ignores_extra_dataset_fields() {
        let item: Item = serde_json::from_value(json!({
            "id": 12,
            "scenario": {"intent": "refund"},
            "messages": [
                {"role": "customer", "text": "Hi"},
                {"role": "agent", "text": "Hello"}
            ]
        }))
        .unwrap();
        assert_eq!(item.id, 12);
        assert_eq!(item.messages[1], Turn::agent("Hello"));
    }
}
