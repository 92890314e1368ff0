//! Complaint domain types shared by the extractor, policy, responder and CRM.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How the complaint reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Text,
    Audio,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// Coarse issue classification used as the policy table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    NotDelivered,
    Damaged,
    WrongItem,
    Defective,
    LateDelivery,
    Billing,
    Other,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 7] = [
        Self::NotDelivered,
        Self::Damaged,
        Self::WrongItem,
        Self::Defective,
        Self::LateDelivery,
        Self::Billing,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDelivered => "not_delivered",
            Self::Damaged => "damaged",
            Self::WrongItem => "wrong_item",
            Self::Defective => "defective",
            Self::LateDelivery => "late_delivery",
            Self::Billing => "billing",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueCategory {
    type Err = String;

    /// Lenient: accepts the snake_case names plus a few spellings models
    /// tend to produce ("not delivered", "Wrong-Item").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown issue category '{s}'"))
    }
}

/// Structured complaint extracted from a customer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub customer_name: String,
    pub customer_email: String,
    pub order_id: String,
    pub issue_text: String,
    pub refund_requested: bool,
    pub category: IssueCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub channel: Channel,
    pub received_at: DateTime<Utc>,
}

/// Outcome of the refund/escalation rules for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub eligible_for_refund: bool,
    pub escalate: bool,
    pub reason: String,
}

/// The reply we send back: exactly a subject and a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDraft {
    pub subject: String,
    pub body: String,
}

impl ResponseDraft {
    /// Encode as the `{"subject": ..., "body": ...}` wire schema.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "subject": self.subject, "body": self.body }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_loose_spellings() {
        assert_eq!("not delivered".parse::<IssueCategory>(), Ok(IssueCategory::NotDelivered));
        assert_eq!("Wrong-Item".parse::<IssueCategory>(), Ok(IssueCategory::WrongItem));
        assert_eq!("billing".parse::<IssueCategory>(), Ok(IssueCategory::Billing));
        assert!("teleported".parse::<IssueCategory>().is_err());
    }

    #[test]
    fn category_roundtrips_through_as_str() {
        for category in IssueCategory::ALL {
            assert_eq!(category.as_str().parse::<IssueCategory>(), Ok(category));
        }
    }

    #[test]
    fn channel_parses() {
        assert_eq!("audio".parse::<Channel>(), Ok(Channel::Audio));
        assert!("fax".parse::<Channel>().is_err());
    }

    #[test]
    fn draft_json_has_only_two_fields() {
        let draft = ResponseDraft {
            subject: "Re: order A1".into(),
            body: "Hello".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&draft.to_json()).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 2);
        assert_eq!(value["subject"], "Re: order A1");
    }
}
