//! Complaint handling: extraction, policy, reply generation and formatting.

pub mod extractor;
pub mod formatter;
pub mod policy;
pub mod responder;
pub mod types;

pub use extractor::{ComplaintExtractor, ComplaintInput};
pub use policy::{PolicyChecker, PolicyRule, PolicyTable};
pub use responder::{DEFAULT_SIGNATURE, ResponseGenerator};
pub use types::{Channel, ComplaintRecord, IssueCategory, PolicyResult, ResponseDraft};
