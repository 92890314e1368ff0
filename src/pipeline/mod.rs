//! Complaint processing pipeline.
//!
//! Every unread message flows through:
//! 1. `ScreeningRules::evaluate()`: automated senders dropped (no LLM)
//! 2. `Transcriber`: voice notes to text
//! 3. `ComplaintExtractor` → `PolicyChecker` → `ResponseGenerator` → `formatter`
//! 4. `ComplaintStore::save()` then `MailSender::send()`

pub mod processor;
pub mod screening;
pub mod types;

pub use processor::{Pipeline, PipelineDeps};
pub use screening::{RuleField, ScreeningRules};
pub use types::{CycleReport, MessageOutcome, PipelineConfig};
