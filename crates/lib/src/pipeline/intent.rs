//! Intent classification: fixed keyword sets checked in priority order.

use serde::{Deserialize, Serialize};

/// Ordered keyword sets. Checked top to bottom; the first set with a match
/// decides the intent, so an input with both refund and billing keywords is
/// a refund request.
const REFUND_KEYWORDS: &[&str] = &["refund", "money back", "cancel"];
const TECHNICAL_KEYWORDS: &[&str] = &["bug", "error", "not working", "broken"];
const HELP_KEYWORDS: &[&str] = &["how to", "help", "guide", "tutorial"];
const BILLING_KEYWORDS: &[&str] = &["billing", "invoice", "charge", "payment"];
const ACCOUNT_KEYWORDS: &[&str] = &["account", "login", "password", "access"];

/// Category of a user message. Closed set; classification always lands on
/// exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RefundRequest,
    TechnicalIssue,
    HelpRequest,
    BillingInquiry,
    AccountIssue,
    GeneralInquiry,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

impl Intent {
    /// Classify a raw user message. Case-insensitive substring matching; no
    /// scoring, no ties (ordered short-circuit). Unmatched input is a
    /// general inquiry.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if contains_any(&lower, REFUND_KEYWORDS) {
            Self::RefundRequest
        } else if contains_any(&lower, TECHNICAL_KEYWORDS) {
            Self::TechnicalIssue
        } else if contains_any(&lower, HELP_KEYWORDS) {
            Self::HelpRequest
        } else if contains_any(&lower, BILLING_KEYWORDS) {
            Self::BillingInquiry
        } else if contains_any(&lower, ACCOUNT_KEYWORDS) {
            Self::AccountIssue
        } else {
            Self::GeneralInquiry
        }
    }

    /// Wire label (matches the serde representation).
    pub fn label(&self) -> &'static str {
        match self {
            Self::RefundRequest => "refund_request",
            Self::TechnicalIssue => "technical_issue",
            Self::HelpRequest => "help_request",
            Self::BillingInquiry => "billing_inquiry",
            Self::AccountIssue => "account_issue",
            Self::GeneralInquiry => "general_inquiry",
        }
    }

    /// Human-readable form used in the intent notice (label with spaces).
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::RefundRequest => "refund request",
            Self::TechnicalIssue => "technical issue",
            Self::HelpRequest => "help request",
            Self::BillingInquiry => "billing inquiry",
            Self::AccountIssue => "account issue",
            Self::GeneralInquiry => "general inquiry",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_keywords_classify_as_refund_request() {
        assert_eq!(Intent::classify("I want a refund"), Intent::RefundRequest);
        assert_eq!(
            Intent::classify("give me my money back"),
            Intent::RefundRequest
        );
        assert_eq!(
            Intent::classify("please cancel my subscription"),
            Intent::RefundRequest
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(Intent::classify("I NEED A REFUND"), Intent::RefundRequest);
        assert_eq!(Intent::classify("My Login Is Stuck"), Intent::AccountIssue);
    }

    #[test]
    fn refund_wins_over_billing_when_both_match() {
        // "refund" and "invoice" both present; refund set is checked first.
        assert_eq!(
            Intent::classify("I want a refund for this invoice"),
            Intent::RefundRequest
        );
    }

    #[test]
    fn one_sample_per_category() {
        assert_eq!(Intent::classify("the app is broken"), Intent::TechnicalIssue);
        assert_eq!(
            Intent::classify("how to export my data?"),
            Intent::HelpRequest
        );
        assert_eq!(
            Intent::classify("question about my last payment"),
            Intent::BillingInquiry
        );
        assert_eq!(
            Intent::classify("I forgot my password"),
            Intent::AccountIssue
        );
    }

    #[test]
    fn unmatched_input_is_general_inquiry() {
        assert_eq!(
            Intent::classify("what are your opening hours?"),
            Intent::GeneralInquiry
        );
        assert_eq!(Intent::classify(""), Intent::GeneralInquiry);
    }

    #[test]
    fn serializes_as_wire_label() {
        let json = serde_json::to_string(&Intent::RefundRequest).expect("serialize");
        assert_eq!(json, "\"refund_request\"");
        assert_eq!(Intent::RefundRequest.label(), "refund_request");
    }
}
