//! CRM persistence: complaint records, resolution status and the manual
//! review queue.

mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{
    ComplaintStatus, ComplaintStore, NewReviewItem, RecordId, ReviewItem, ReviewStage,
    StoredComplaint,
};
