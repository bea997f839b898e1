//! Escalation detection: urgency keywords or escalation-prone intents.

use super::Intent;

const URGENT_KEYWORDS: &[&str] = &[
    "urgent",
    "immediately",
    "asap",
    "critical",
    "emergency",
    "now",
    "frustrated",
    "angry",
    "legal",
];

/// Intents flagged for human follow-up even without urgency keywords.
const ESCALATION_INTENTS: &[Intent] = &[Intent::RefundRequest, Intent::AccountIssue];

/// True when the message contains any urgency keyword (case-insensitive) or
/// the intent is escalation-prone.
pub fn should_escalate(intent: Intent, text: &str) -> bool {
    let lower = text.to_lowercase();
    URGENT_KEYWORDS.iter().any(|k| lower.contains(k)) || ESCALATION_INTENTS.contains(&intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_keyword_escalates_regardless_of_intent() {
        assert!(should_escalate(
            Intent::GeneralInquiry,
            "this is URGENT, please"
        ));
        assert!(should_escalate(Intent::HelpRequest, "I am so frustrated"));
        assert!(should_escalate(Intent::BillingInquiry, "I'll take legal action"));
    }

    #[test]
    fn escalation_prone_intents_escalate_without_keywords() {
        assert!(should_escalate(Intent::RefundRequest, "money back please"));
        assert!(should_escalate(Intent::AccountIssue, "my login is stuck"));
    }

    #[test]
    fn calm_message_with_other_intent_does_not_escalate() {
        assert!(!should_escalate(Intent::GeneralInquiry, "hello there"));
        assert!(!should_escalate(Intent::HelpRequest, "how to export data"));
        assert!(!should_escalate(Intent::TechnicalIssue, "the page shows a bug"));
    }
}
