//! Pre-LLM screening rules.
//!
//! Runs before extraction to drop mail that must never get an automatic
//! reply: noreply senders, bounces, auto-responders, bulk mail, and our own
//! outgoing address. A match skips the LLM calls entirely.

use regex::Regex;
use tracing::debug;

use crate::mail::RawMessage;

/// Which field a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    Sender,
    Subject,
}

/// A single screening rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct ScreenRule {
    /// Human-readable pattern description.
    pub pattern: String,
    pub regex: Regex,
    pub field: RuleField,
    /// Why this rule triggers.
    pub reason: String,
}

/// Screening rules engine.
#[derive(Debug, Clone)]
pub struct ScreeningRules {
    rules: Vec<ScreenRule>,
}

impl ScreeningRules {
    /// Rules for automated senders and auto-replies.
    pub fn default_rules() -> Self {
        let rule = |pattern: &str, regex: &str, field, reason: &str| ScreenRule {
            pattern: pattern.into(),
            regex: Regex::new(regex).unwrap(),
            field,
            reason: reason.into(),
        };

        let rules = vec![
            rule(
                "noreply@*",
                r"(?i)^no[\-_.]?reply@",
                RuleField::Sender,
                "noreply sender",
            ),
            // Bounces are recognised by sender only; customers write
            // "Undeliverable parcel" subjects too.
            rule(
                "mailer-daemon",
                r"(?i)^(mailer[\-_]?daemon|postmaster)@",
                RuleField::Sender,
                "automated mail system",
            ),
            rule(
                "*@marketing.*",
                r"(?i)@(marketing|newsletter|promo|campaign)\b",
                RuleField::Sender,
                "marketing/newsletter sender",
            ),
            rule(
                "auto-reply subject",
                r"(?i)^(auto(matic)?[\- ]?reply|out of (the )?office)\b",
                RuleField::Subject,
                "auto-reply",
            ),
        ];

        Self { rules }
    }

    /// Never answer mail sent from `address` (our own outgoing mailbox).
    pub fn with_own_address(mut self, address: &str) -> Self {
        let bare = address
            .rsplit_once('<')
            .map_or(address, |(_, rest)| rest.trim_end_matches('>'))
            .trim();
        if bare.is_empty() {
            return self;
        }
        if let Ok(regex) = Regex::new(&format!("(?i)^{}$", regex::escape(bare))) {
            self.rules.push(ScreenRule {
                pattern: bare.to_string(),
                regex,
                field: RuleField::Sender,
                reason: "message from our own address".into(),
            });
        }
        self
    }

    /// Reason the message should be dropped, or `None` to process it.
    pub fn evaluate(&self, message: &RawMessage) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            let value = match rule.field {
                RuleField::Sender => &message.sender_address,
                RuleField::Subject => &message.subject,
            };
            rule.regex.is_match(value).then(|| {
                debug!(
                    sender = %message.sender_address,
                    rule = %rule.pattern,
                    reason = %rule.reason,
                    "Message matched screening rule"
                );
                rule.reason.clone()
            })
        })
    }
}

impl Default for ScreeningRules {
    fn default() -> Self {
        Self::default_rules()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::mail::{MessageBody, MessageUid};

    fn make_message(sender: &str, subject: &str) -> RawMessage {
        RawMessage {
            uid: MessageUid(1),
            message_id: "m@x".into(),
            sender_address: sender.into(),
            sender_name: "Someone".into(),
            subject: subject.into(),
            body: MessageBody::Text("My order TSR123 never arrived".into()),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn drops_noreply() {
        let rules = ScreeningRules::default_rules();
        assert_eq!(
            rules.evaluate(&make_message("no-reply@service.io", "Update")),
            Some("noreply sender".to_string())
        );
    }

    #[test]
    fn drops_bounces() {
        let rules = ScreeningRules::default_rules();
        assert!(
            rules
                .evaluate(&make_message("MAILER-DAEMON@mx.example", "Undeliverable: Re: TSR123"))
                .is_some()
        );
        assert!(rules.evaluate(&make_message("postmaster@mx.example", "x")).is_some());
    }

    #[test]
    fn delivery_complaint_subject_is_not_a_bounce() {
        let rules = ScreeningRules::default_rules();
        for subject in [
            "Undeliverable parcel, order TSR123",
            "Delivery status notification says lost",
            "Mail delivery failed for my package",
        ] {
            assert!(
                rules
                    .evaluate(&make_message("dana@customer.example", subject))
                    .is_none(),
                "{subject}"
            );
        }
    }

    #[test]
    fn drops_auto_reply() {
        let rules = ScreeningRules::default_rules();
        assert_eq!(
            rules.evaluate(&make_message("sam@example.com", "Out of Office: back Monday")),
            Some("auto-reply".to_string())
        );
    }

    #[test]
    fn passes_customer_complaint() {
        let rules = ScreeningRules::default_rules();
        assert!(
            rules
                .evaluate(&make_message("sam@example.com", "Where is my order?"))
                .is_none()
        );
    }

    #[test]
    fn own_address_is_dropped() {
        let rules = ScreeningRules::default_rules().with_own_address("Support <desk@shop.example>");
        assert!(rules.evaluate(&make_message("Desk@Shop.example", "Re: x")).is_some());
        assert!(rules.evaluate(&make_message("other@shop.example", "Re: x")).is_none());
    }
}
