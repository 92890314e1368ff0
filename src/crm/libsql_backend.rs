//! libSQL backend for `ComplaintStore`. Supports local file and in-memory
//! databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::complaint::{Channel, ComplaintRecord, IssueCategory, PolicyResult};
use crate::crm::migrations;
use crate::crm::traits::{
    ComplaintStatus, ComplaintStore, NewReviewItem, RecordId, ReviewItem, ReviewStage,
    StoredComplaint,
};
use crate::error::PersistenceError;

/// libSQL complaint store.
///
/// Holds one connection reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PersistenceError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, PersistenceError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                PersistenceError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, PersistenceError> {
        let conn = db
            .connect()
            .map_err(|e| PersistenceError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

const COMPLAINT_COLUMNS: &str = "id, message_id, customer_name, customer_email, order_id, \
    issue_text, refund_requested, category, order_date, address, channel, received_at, \
    eligible_for_refund, escalate, policy_reason, status, created_at, replied_at";

const REVIEW_COLUMNS: &str = "id, message_id, sender, stage, reason, raw_text, created_at";

fn row_to_complaint(row: &libsql::Row) -> Result<StoredComplaint, libsql::Error> {
    let category: String = row.get(7)?;
    let order_date: Option<String> = row.get(8).ok();
    let channel: String = row.get(10)?;
    let received_at: String = row.get(11)?;
    let status: String = row.get(15)?;
    let created_at: String = row.get(16)?;
    let replied_at: Option<String> = row.get(17).ok();

    Ok(StoredComplaint {
        id: RecordId(row.get(0)?),
        message_id: row.get(1)?,
        record: ComplaintRecord {
            customer_name: row.get(2)?,
            customer_email: row.get(3)?,
            order_id: row.get(4)?,
            issue_text: row.get(5)?,
            refund_requested: row.get::<i64>(6)? != 0,
            category: category.parse().unwrap_or(IssueCategory::Other),
            order_date: order_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            address: row.get(9).ok(),
            channel: channel.parse().unwrap_or(Channel::Text),
            received_at: parse_datetime(&received_at),
        },
        policy: PolicyResult {
            eligible_for_refund: row.get::<i64>(12)? != 0,
            escalate: row.get::<i64>(13)? != 0,
            reason: row.get(14)?,
        },
        status: ComplaintStatus::from_db(&status),
        created_at: parse_datetime(&created_at),
        replied_at: replied_at.as_deref().map(parse_datetime),
    })
}

fn row_to_review(row: &libsql::Row) -> Result<ReviewItem, libsql::Error> {
    let stage: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(ReviewItem {
        id: row.get(0)?,
        message_id: row.get(1)?,
        sender: row.get(2)?,
        stage: ReviewStage::from_db(&stage),
        reason: row.get(4)?,
        raw_text: row.get(5)?,
        created_at: parse_datetime(&created_at),
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ComplaintStore for LibSqlStore {
    async fn save(
        &self,
        record: &ComplaintRecord,
        policy: &PolicyResult,
        message_id: &str,
    ) -> Result<RecordId, PersistenceError> {
        if record.issue_text.trim().is_empty() {
            return Err(PersistenceError::Constraint(
                "complaint record has an empty issue text".into(),
            ));
        }

        let conn = self.conn();
        conn.execute(
            "INSERT INTO complaints (message_id, customer_name, customer_email, order_id,
                issue_text, refund_requested, category, order_date, address, channel,
                received_at, eligible_for_refund, escalate, policy_reason, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                message_id,
                record.customer_name.as_str(),
                record.customer_email.as_str(),
                record.order_id.as_str(),
                record.issue_text.as_str(),
                i64::from(record.refund_requested),
                record.category.as_str(),
                opt_text(record.order_date.map(|d| d.format("%Y-%m-%d").to_string())),
                opt_text(record.address.clone()),
                record.channel.as_str(),
                record.received_at.to_rfc3339(),
                i64::from(policy.eligible_for_refund),
                i64::from(policy.escalate),
                policy.reason.as_str(),
                ComplaintStatus::InProgress.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PersistenceError::Constraint(format!(
                    "complaint for message {message_id} already exists"
                ))
            } else {
                PersistenceError::Query(format!("save complaint: {e}"))
            }
        })?;
        let id = RecordId(conn.last_insert_rowid());

        debug!(record_id = %id, message_id, order_id = %record.order_id, "Complaint saved");
        Ok(id)
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<StoredComplaint>, PersistenceError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("find_by_message_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_complaint(&row)
                .map(Some)
                .map_err(|e| PersistenceError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(PersistenceError::Query(format!("find_by_message_id: {e}"))),
        }
    }

    async fn mark_replied(&self, id: RecordId) -> Result<(), PersistenceError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE complaints SET status = ?1, replied_at = ?2 WHERE id = ?3",
                params![
                    ComplaintStatus::Replied.as_str(),
                    Utc::now().to_rfc3339(),
                    id.0
                ],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("mark_replied: {e}")))?;

        if changed == 0 {
            return Err(PersistenceError::Query(format!(
                "mark_replied: no complaint with id {id}"
            )));
        }
        debug!(record_id = %id, "Complaint marked replied");
        Ok(())
    }

    async fn queue_for_review(&self, item: &NewReviewItem) -> Result<i64, PersistenceError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO review_queue
                (message_id, sender, stage, reason, raw_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.message_id.as_str(),
                item.sender.as_str(),
                item.stage.as_str(),
                item.reason.as_str(),
                item.raw_text.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| PersistenceError::Query(format!("queue_for_review: {e}")))?;

        let mut rows = conn
            .query(
                "SELECT id FROM review_queue WHERE message_id = ?1 AND stage = ?2",
                params![item.message_id.as_str(), item.stage.as_str()],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("queue_for_review: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| PersistenceError::Query(format!("queue_for_review: {e}")))?
            .ok_or_else(|| PersistenceError::Query("queue_for_review: row not found".into()))?;
        let id: i64 = row
            .get(0)
            .map_err(|e| PersistenceError::Query(format!("queue_for_review id: {e}")))?;

        debug!(review_id = id, message_id = %item.message_id, stage = %item.stage, "Queued for review");
        Ok(id)
    }

    async fn list_review_queue(&self, limit: usize) -> Result<Vec<ReviewItem>, PersistenceError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REVIEW_COLUMNS} FROM review_queue ORDER BY id DESC LIMIT ?1"),
                params![limit_param(limit)],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("list_review_queue: {e}")))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| PersistenceError::Query(format!("list_review_queue: {e}")))?
        {
            match row_to_review(&row) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping review row: {e}"),
            }
        }
        Ok(items)
    }

    async fn list_complaints(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredComplaint>, PersistenceError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints ORDER BY id DESC LIMIT ?1"),
                params![limit_param(limit)],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("list_complaints: {e}")))?;

        let mut complaints = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| PersistenceError::Query(format!("list_complaints: {e}")))?
        {
            match row_to_complaint(&row) {
                Ok(c) => complaints.push(c),
                Err(e) => tracing::warn!("Skipping complaint row: {e}"),
            }
        }
        Ok(complaints)
    }
}
