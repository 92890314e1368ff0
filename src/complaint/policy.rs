//! Refund and escalation policy.
//!
//! The rules are data: a table from `IssueCategory` to a `PolicyRule`, plus
//! a list of escalation keywords. The built-in table can be overridden or
//! extended from a TOML file:
//!
//! ```toml
//! escalation_keywords = ["chargeback", "lawyer"]
//!
//! [rules.damaged]
//! refundable = true
//! escalate = false
//! refund_window_days = 30
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::complaint::types::{ComplaintRecord, IssueCategory, PolicyResult};
use crate::error::ConfigError;

/// Decision inputs for one issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PolicyRule {
    /// Whether this category can be refunded at all.
    pub refundable: bool,
    /// Always hand this category to a human.
    #[serde(default)]
    pub escalate: bool,
    /// Maximum order age for a refund. `None` means no limit.
    #[serde(default)]
    pub refund_window_days: Option<u32>,
}

/// Rule table as it appears in a policy file. Every field is optional so a
/// file only needs to mention what it changes.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    #[serde(default)]
    rules: BTreeMap<IssueCategory, PolicyRule>,
    #[serde(default)]
    escalation_keywords: Option<Vec<String>>,
}

/// The full rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    rules: BTreeMap<IssueCategory, PolicyRule>,
    escalation_keywords: Vec<String>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let rule = |refundable, escalate, refund_window_days| PolicyRule {
            refundable,
            escalate,
            refund_window_days,
        };
        let rules = BTreeMap::from([
            (IssueCategory::NotDelivered, rule(true, false, Some(60))),
            (IssueCategory::Damaged, rule(true, false, Some(30))),
            (IssueCategory::WrongItem, rule(true, false, Some(30))),
            (IssueCategory::Defective, rule(true, false, Some(90))),
            (IssueCategory::LateDelivery, rule(false, false, None)),
            (IssueCategory::Billing, rule(true, true, None)),
            (IssueCategory::Other, rule(false, true, None)),
        ]);
        Self {
            rules,
            escalation_keywords: ["chargeback", "lawyer", "legal action", "fraud", "scam"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PolicyTable {
    /// Built-in table with overrides from a TOML file applied on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse overrides from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let file: PolicyFile = toml::from_str(raw)?;
        let mut table = Self::default();
        table.rules.extend(file.rules);
        if let Some(keywords) = file.escalation_keywords {
            table.escalation_keywords = keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }
        Ok(table)
    }

    /// Rule for a category. Categories missing from the table fall back to
    /// the `other` rule, and to "not refundable, escalate" if that is gone too.
    pub fn rule_for(&self, category: IssueCategory) -> PolicyRule {
        self.rules
            .get(&category)
            .or_else(|| self.rules.get(&IssueCategory::Other))
            .copied()
            .unwrap_or(PolicyRule {
                refundable: false,
                escalate: true,
                refund_window_days: None,
            })
    }
}

/// Applies a `PolicyTable` to complaint records. Pure: no I/O, no clock.
#[derive(Debug, Clone, Default)]
pub struct PolicyChecker {
    table: PolicyTable,
}

impl PolicyChecker {
    pub fn new(table: PolicyTable) -> Self {
        Self { table }
    }

    /// Decide refund eligibility and escalation for one record.
    ///
    /// Order age is measured against `record.received_at`, so the outcome
    /// depends only on the record and the table.
    pub fn check(&self, record: &ComplaintRecord) -> PolicyResult {
        let rule = self.table.rule_for(record.category);

        let order_age_days = record
            .order_date
            .map(|d| (record.received_at.date_naive() - d).num_days());

        let within_window = match (rule.refund_window_days, order_age_days) {
            (Some(window), Some(age)) => age <= i64::from(window),
            _ => true,
        };
        let eligible_for_refund = rule.refundable && within_window;

        let issue_lower = record.issue_text.to_lowercase();
        let keyword = self
            .table
            .escalation_keywords
            .iter()
            .find(|k| issue_lower.contains(k.as_str()));

        let refund_denied = record.refund_requested && !eligible_for_refund;
        let escalate = rule.escalate || keyword.is_some() || refund_denied;

        let mut reasons = Vec::new();
        if !rule.refundable {
            reasons.push(format!("{} issues are not refundable", record.category));
        } else if !within_window {
            reasons.push(format!(
                "order is {} days old, past the {}-day refund window for {} issues",
                order_age_days.unwrap_or_default(),
                rule.refund_window_days.unwrap_or_default(),
                record.category
            ));
        } else {
            reasons.push(format!("{} issues are refundable", record.category));
        }
        if rule.escalate {
            reasons.push(format!("{} issues always go to a specialist", record.category));
        }
        if let Some(k) = keyword {
            reasons.push(format!("message mentions \"{k}\""));
        }
        if refund_denied {
            reasons.push("refund was requested but is not covered".to_string());
        }

        PolicyResult {
            eligible_for_refund,
            escalate,
            reason: reasons.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use super::*;
    use crate::complaint::types::Channel;

    fn record(category: IssueCategory, refund: bool, order_date: Option<&str>) -> ComplaintRecord {
        ComplaintRecord {
            customer_name: "Sam".into(),
            customer_email: "sam@example.com".into(),
            order_id: "TSR123".into(),
            issue_text: "My order never arrived".into(),
            refund_requested: refund,
            category,
            order_date: order_date.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            address: None,
            channel: Channel::Text,
            received_at: DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn not_delivered_refund_is_eligible() {
        let result = PolicyChecker::default().check(&record(IssueCategory::NotDelivered, true, None));
        assert!(result.eligible_for_refund);
        assert!(!result.escalate);
        assert!(result.reason.contains("not_delivered issues are refundable"));
    }

    #[test]
    fn order_outside_window_is_not_eligible_and_escalates_when_refund_requested() {
        let result = PolicyChecker::default()
            .check(&record(IssueCategory::Damaged, true, Some("2026-01-01")));
        assert!(!result.eligible_for_refund);
        assert!(result.escalate);
        assert!(result.reason.contains("68 days old"));
        assert!(result.reason.contains("refund was requested"));
    }

    #[test]
    fn order_on_window_edge_is_eligible() {
        // 2026-02-08 → 2026-03-10 is exactly 30 days
        let result = PolicyChecker::default()
            .check(&record(IssueCategory::Damaged, true, Some("2026-02-08")));
        assert!(result.eligible_for_refund);
    }

    #[test]
    fn outside_window_without_refund_request_does_not_escalate() {
        let result = PolicyChecker::default()
            .check(&record(IssueCategory::Damaged, false, Some("2026-01-01")));
        assert!(!result.eligible_for_refund);
        assert!(!result.escalate);
    }

    #[test]
    fn late_delivery_is_never_refundable() {
        let result = PolicyChecker::default().check(&record(IssueCategory::LateDelivery, false, None));
        assert!(!result.eligible_for_refund);
        assert!(!result.escalate);
        assert!(result.reason.contains("not refundable"));
    }

    #[test]
    fn billing_always_escalates() {
        let result = PolicyChecker::default().check(&record(IssueCategory::Billing, false, None));
        assert!(result.eligible_for_refund);
        assert!(result.escalate);
    }

    #[test]
    fn keyword_forces_escalation() {
        let mut rec = record(IssueCategory::NotDelivered, false, None);
        rec.issue_text = "Never arrived. I will file a CHARGEBACK.".into();
        let result = PolicyChecker::default().check(&rec);
        assert!(result.escalate);
        assert!(result.reason.contains("chargeback"));
    }

    #[test]
    fn check_is_deterministic() {
        let checker = PolicyChecker::default();
        let rec = record(IssueCategory::WrongItem, true, Some("2026-02-20"));
        let first = checker.check(&rec);
        for _ in 0..10 {
            assert_eq!(checker.check(&rec), first);
        }
    }

    #[test]
    fn toml_overrides_one_rule_and_keeps_the_rest() {
        let table = PolicyTable::from_toml(
            r#"
            escalation_keywords = ["Ombudsman"]

            [rules.late_delivery]
            refundable = true
            refund_window_days = 14
            "#,
        )
        .unwrap();
        let late = table.rule_for(IssueCategory::LateDelivery);
        assert!(late.refundable);
        assert_eq!(late.refund_window_days, Some(14));
        assert_eq!(
            table.rule_for(IssueCategory::Damaged),
            PolicyTable::default().rule_for(IssueCategory::Damaged)
        );

        let mut rec = record(IssueCategory::NotDelivered, false, None);
        rec.issue_text = "contacting the ombudsman".into();
        assert!(PolicyChecker::new(table).check(&rec).escalate);
    }

    #[test]
    fn toml_rejects_unknown_category() {
        assert!(PolicyTable::from_toml("[rules.teleported]\nrefundable = true\n").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "[rules.other]\nrefundable = true\n").unwrap();
        let table = PolicyTable::load(&path).unwrap();
        assert!(table.rule_for(IssueCategory::Other).refundable);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = PolicyTable::load(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
