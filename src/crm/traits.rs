//! `ComplaintStore` trait and the rows it reads and writes.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::complaint::{ComplaintRecord, PolicyResult};
use crate::error::PersistenceError;

/// Primary key of a `complaints` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolution state of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintStatus {
    /// Saved; reply not delivered yet.
    InProgress,
    /// Reply delivered.
    Replied,
}

impl ComplaintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Replied => "replied",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "replied" => Self::Replied,
            _ => Self::InProgress,
        }
    }
}

/// A complaint as stored in the CRM.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredComplaint {
    pub id: RecordId,
    pub message_id: String,
    pub record: ComplaintRecord,
    pub policy: PolicyResult,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
    pub replied_at: Option<DateTime<Utc>>,
}

/// Pipeline step at which a message was handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStage {
    Transcription,
    Extraction,
    Generation,
    Formatting,
    /// The reply can never be sent as built (bad address, unbuildable message).
    Delivery,
}

impl ReviewStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Extraction => "extraction",
            Self::Generation => "generation",
            Self::Formatting => "formatting",
            Self::Delivery => "delivery",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "transcription" => Self::Transcription,
            "generation" => Self::Generation,
            "formatting" => Self::Formatting,
            "delivery" => Self::Delivery,
            _ => Self::Extraction,
        }
    }
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A review queue entry to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReviewItem {
    pub message_id: String,
    pub sender: String,
    pub stage: ReviewStage,
    pub reason: String,
    /// Message text (or transcript, or raw model output) the human should see.
    pub raw_text: String,
}

/// A stored review queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub id: i64,
    pub message_id: String,
    pub sender: String,
    pub stage: ReviewStage,
    pub reason: String,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence for complaints and the manual review queue.
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Insert a complaint with status `in_progress`. Rejects records with an
    /// empty issue text, and a second row for the same `message_id`.
    async fn save(
        &self,
        record: &ComplaintRecord,
        policy: &PolicyResult,
        message_id: &str,
    ) -> Result<RecordId, PersistenceError>;

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<StoredComplaint>, PersistenceError>;

    /// Set status `replied` and stamp `replied_at`.
    async fn mark_replied(&self, id: RecordId) -> Result<(), PersistenceError>;

    /// Add a message to the review queue. Queuing the same message at the
    /// same stage twice keeps one entry and returns its id.
    async fn queue_for_review(&self, item: &NewReviewItem) -> Result<i64, PersistenceError>;

    /// Most recent review entries first.
    async fn list_review_queue(&self, limit: usize) -> Result<Vec<ReviewItem>, PersistenceError>;

    /// Most recent complaints first.
    async fn list_complaints(&self, limit: usize)
    -> Result<Vec<StoredComplaint>, PersistenceError>;
}
