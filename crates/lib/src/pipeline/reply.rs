//! Canned replies: one fixed response string per intent.

use super::Intent;

/// The reply for an intent. The table is total over the closed [`Intent`]
/// set, so there is no fallback path.
pub fn canned_reply(intent: Intent) -> &'static str {
    match intent {
        Intent::RefundRequest => {
            "I understand you're requesting a refund. Our refund policy allows returns within 30 days of purchase. I'll need to verify your order details to process this. Could you please provide your order number?"
        }
        Intent::TechnicalIssue => {
            "I'm sorry you're experiencing technical difficulties. I've logged this issue and our technical team will investigate. In the meantime, have you tried clearing your cache or using a different browser?"
        }
        Intent::HelpRequest => {
            "I'd be happy to help! I can provide you with step-by-step guidance or direct you to our comprehensive knowledge base. What specific feature or process would you like assistance with?"
        }
        Intent::BillingInquiry => {
            "I can help you with your billing question. Our billing team can provide detailed information about your charges, payment methods, and invoices. What specific aspect of your billing would you like to discuss?"
        }
        Intent::AccountIssue => {
            "I understand you're having account access issues. For security purposes, I'll need to verify your identity. Could you please confirm the email address associated with your account?"
        }
        Intent::GeneralInquiry => {
            "Thank you for reaching out! I'm here to assist you with any questions you have about our services. How can I help you today?"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_the_exact_table_string() {
        assert!(canned_reply(Intent::RefundRequest)
            .starts_with("I understand you're requesting a refund."));
        assert!(canned_reply(Intent::GeneralInquiry).starts_with("Thank you for reaching out!"));
    }

    #[test]
    fn every_intent_has_a_distinct_reply() {
        let all = [
            Intent::RefundRequest,
            Intent::TechnicalIssue,
            Intent::HelpRequest,
            Intent::BillingInquiry,
            Intent::AccountIssue,
            Intent::GeneralInquiry,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(canned_reply(*a), canned_reply(*b));
            }
        }
    }
}
