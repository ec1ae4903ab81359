//! Prompt construction for the analyst and auditor oracles
//!
//! The analysis prompt carries calibration examples, the label rubric and
//! the `REASONING:` / `ANSWER:` reply contract the extractor relies on. The
//! verification prompt carries the consensus as a hint plus six checks.

use crate::core::extract::ANSWER_MARKER;
use crate::core::judgment::{Item, Judgment, Turn};

/// Analyst personas, cycled by round index
pub const PERSONAS: [&str; 3] = [
    "You are a senior support quality analyst. You judge interactions precisely and you are \
     good at spotting customers who stay polite while their problem stays unsolved.",
    "You are a customer experience evaluator. You care about whether the customer's actual \
     problem got solved, not whether the conversation ended on a friendly note.",
    "You are a strict support auditor. For every interaction you ask whether the core issue \
     was resolved, which mistakes the agent made, and whether the customer is truly satisfied. \
     You rely only on evidence in the dialog.",
];

/// Persona of the verification pass
pub const AUDITOR_PERSONA: &str = "You are a precision auditor of customer support analyses. \
     Work through every verification check, then return the corrected JSON object only.";

const CALIBRATION_EXAMPLES: &str = r#"--- Example A: satisfied ---
Customer: I was charged twice for order #9912, can you check?
Agent: I see two charges of $45.00. I've refunded the duplicate, it will show in 3-5 business days.
Customer: Great, thank you so much!

REASONING: Double charge found and refunded on the spot. Genuine thanks, nothing left open.
ANSWER:
{"intent": "payment_issue", "satisfaction": "satisfied", "quality_score": 5, "agent_mistakes": []}

--- Example B: polite but unsatisfied ---
Customer: I was billed $99 instead of $49. I never changed my plan.
Agent: Your account is on Premium at $99, so the charge is correct.
Customer: I didn't authorize that... can I at least get this month's difference back?
Agent: Current-cycle charges are non-refundable. I've scheduled a downgrade for next cycle.
Customer: Alright, thanks for your help.

REASONING: The thanks is politeness. The unauthorized change was never investigated and no refund was given, and calling the charge correct contradicts the customer's account of events.
ANSWER:
{"intent": "pricing_plan", "satisfaction": "unsatisfied", "quality_score": 2, "agent_mistakes": ["incorrect_info", "no_resolution"]}

--- Example C: a pending fix is still a resolution ---
Customer: My $200 payment has been pending for 3 days.
Agent: Your bank is holding the authorization. I've sent a release request, it should clear within 24 hours. Calling your bank with reference TXN-88421 can speed it up.
Customer: Okay, I'll call them. Thanks.

REASONING: The agent acted and gave a concrete next step. Not no_resolution, no question skipped.
ANSWER:
{"intent": "payment_issue", "satisfaction": "satisfied", "quality_score": 4, "agent_mistakes": []}

--- Example D: redirect without help ---
Customer: My order was cancelled but I was charged $150. Can I get a refund?
Agent: For refunds you'll need to contact billing.
Customer: Can you transfer me or give me their contact?
Agent: They are available during business hours. Anything else?
Customer: You haven't helped me with anything yet...

REASONING: No refund, no transfer, no contact details. The follow-up question went unanswered and the redirect was for a routine refund.
ANSWER:
{"intent": "refund", "satisfaction": "unsatisfied", "quality_score": 1, "agent_mistakes": ["ignored_question", "no_resolution", "unnecessary_escalation"]}"#;

const RUBRIC: &str = r#"INTENT (the customer's primary reason for contact, judged by what they asked first):
- payment_issue: a specific charge or transaction failed, duplicated, pending or wrong
- technical_error: a platform malfunction that is not a payment failure
- account_access: login, password, lockout, 2FA
- pricing_plan: plans, prices, upgrades, downgrades, billing cycle
- refund: getting money back, refund status or policy
- other: none of the above

SATISFACTION (the customer's real state at the end):
- satisfied: problem fully resolved and the gratitude is genuine
- neutral: partial resolution, lukewarm reply, no strong emotion
- unsatisfied: unresolved, frustrated, or hidden dissatisfaction
Strip the polite words from the last customer turns. If the core problem is not solved, the customer is unsatisfied.

QUALITY SCORE (integer 1-5):
5 fast, accurate and fully resolved; 4 resolved with minor flaws; 3 partial, adequate;
2 significant mistakes; 1 hostile or completely unhelpful.

AGENT MISTAKES (high precision, avoid false positives):
- ignored_question: an explicit customer question the agent never addressed at all
- incorrect_info: a statement that is demonstrably false given the dialog
- rude_tone: dismissive, condescending, sarcastic or hostile language
- no_resolution: the primary problem is still unsolved at the end; an initiated fix that only needs time is a resolution
- unnecessary_escalation: a transfer or redirect for something the agent could have handled"#;

/// Render dialog turns as `Role: text` lines
pub fn format_dialog(messages: &[Turn]) -> String {
    messages
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for one analysis round
pub fn analysis_prompt(item: &Item) -> String {
    format!(
        "Study these calibration examples first:\n\n{examples}\n\n\
         ===\n\nANALYZE THIS DIALOG:\n{dialog}\n\n===\n\n{rubric}\n\n\
         Reply in exactly this format:\n\
         REASONING: <two or three sentences>\n\
         {marker}\n\
         {{\"intent\": \"...\", \"satisfaction\": \"...\", \"quality_score\": N, \"agent_mistakes\": [...]}}",
        examples = CALIBRATION_EXAMPLES,
        dialog = format_dialog(&item.messages),
        rubric = RUBRIC,
        marker = ANSWER_MARKER,
    )
}

/// Prompt for the verification pass, with the consensus as a hint
pub fn verification_prompt(item: &Item, consensus: &Judgment) -> String {
    let hint = serde_json::to_string(consensus).unwrap_or_default();
    format!(
        "Verify the initial analysis of this support dialog and correct it where the \
         evidence disagrees.\n\n\
         DIALOG:\n{dialog}\n\n\
         INITIAL ANALYSIS:\n{hint}\n\n\
         CHECK 1 (no_resolution): list what the agent concretely did. An action taken, \
         accepted actionable steps, or a workaround for the immediate need removes \
         no_resolution. Generic advice or a redirect without details keeps it.\n\
         CHECK 2 (hidden dissatisfaction): drop the polite words from the customer's last \
         two messages. If the original problem is not solved, satisfaction is \"unsatisfied\".\n\
         CHECK 3 (ignored_question): list every explicit customer question. Keep \
         ignored_question only if one was skipped entirely.\n\
         CHECK 4 (unnecessary_escalation): keep it only for a transfer of a routine task \
         the agent could have handled.\n\
         CHECK 5 (incorrect_info): keep it only for verifiably false statements.\n\
         CHECK 6 (score consistency): satisfied with no mistakes scores 4-5; unsatisfied \
         with two or more mistakes scores 1-2; neutral scores 2-4.\n\n\
         Return ONLY the corrected JSON object:\n\
         {{\"intent\": \"...\", \"satisfaction\": \"...\", \"quality_score\": N, \"agent_mistakes\": [...]}}",
        dialog = format_dialog(&item.messages),
        hint = hint,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::judgment::{Category, Flag, FlagSet, Score, Sentiment};

    fn item() -> Item {
        Item::new(
            4,
            vec![
                Turn::customer("My login fails."),
                Turn::agent("Try resetting your password."),
            ],
        )
    }

    #[test]
    fn test_format_dialog() {
        assert_eq!(
            format_dialog(&item().messages),
            "Customer: My login fails.\nAgent: Try resetting your password."
        );
    }

    #[test]
    fn test_personas_are_distinct() {
        assert_ne!(PERSONAS[0], PERSONAS[1]);
        assert_ne!(PERSONAS[1], PERSONAS[2]);
        assert_ne!(PERSONAS[0], PERSONAS[2]);
    }

    #[test]
    fn test_analysis_prompt_contains_dialog_and_contract() {
        let prompt = analysis_prompt(&item());
        assert!(prompt.contains("Customer: My login fails."));
        assert!(prompt.contains("REASONING:"));
        assert!(prompt.contains(ANSWER_MARKER));
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()), "missing {}", category);
        }
        for flag in Flag::ALL {
            assert!(prompt.contains(flag.as_str()), "missing {}", flag);
        }
    }

    #[test]
    fn test_verification_prompt_embeds_consensus() {
        let consensus = Judgment::new(
            Category::AccountAccess,
            Sentiment::Neutral,
            Score::new(3).unwrap(),
            FlagSet::from([Flag::NoResolution]),
        );
        let prompt = verification_prompt(&item(), &consensus);
        assert!(prompt.contains("\"intent\":\"account_access\""));
        assert!(prompt.contains("\"agent_mistakes\":[\"no_resolution\"]"));
        assert!(prompt.contains("CHECK 6"));
    }
}
