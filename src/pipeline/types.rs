//! Shared types for the complaint pipeline.

use std::fmt;
use std::time::Duration;

use crate::complaint::{DEFAULT_SIGNATURE, PolicyTable, ResponseDraft};
use crate::crm::{RecordId, ReviewStage};
use crate::pipeline::screening::ScreeningRules;

/// Default bound for one LLM call.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages with fewer words than this get the brief-message reply.
pub const DEFAULT_MIN_WORDS: usize = 5;

const BRIEF_SUBJECT: &str = "Additional Information Required";

/// Tunables for one `Pipeline`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm_timeout: Duration,
    pub min_words: usize,
    pub signature: String,
    pub policy: PolicyTable,
    pub screening: ScreeningRules,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            min_words: DEFAULT_MIN_WORDS,
            signature: DEFAULT_SIGNATURE.to_string(),
            policy: PolicyTable::default(),
            screening: ScreeningRules::default_rules(),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Complaint saved and answered.
    Replied { record_id: RecordId },
    /// Too brief to act on; the customer was asked for more detail.
    AskedForDetail,
    /// Dropped by a screening rule, no reply.
    Screened { reason: String },
    /// Handed to a human.
    QueuedForReview { stage: ReviewStage, reason: String },
    /// Reply could not be sent. The message stays unread and is retried on
    /// the next cycle. `record_id` is set when a complaint row exists.
    DeliveryFailed { record_id: Option<RecordId> },
    /// An earlier cycle already answered this message.
    AlreadyReplied { record_id: RecordId },
}

/// Per-cycle outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub replied: usize,
    pub asked_for_detail: usize,
    pub screened: usize,
    pub queued_for_review: usize,
    pub delivery_failed: usize,
    pub already_replied: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Replied { .. } => self.replied += 1,
            MessageOutcome::AskedForDetail => self.asked_for_detail += 1,
            MessageOutcome::Screened { .. } => self.screened += 1,
            MessageOutcome::QueuedForReview { .. } => self.queued_for_review += 1,
            MessageOutcome::DeliveryFailed { .. } => self.delivery_failed += 1,
            MessageOutcome::AlreadyReplied { .. } => self.already_replied += 1,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched: {} replied, {} asked for detail, {} screened, {} queued for review, \
             {} delivery failed, {} already replied",
            self.fetched,
            self.replied,
            self.asked_for_detail,
            self.screened,
            self.queued_for_review,
            self.delivery_failed,
            self.already_replied
        )
    }
}

/// Reply for a text message too short to extract a complaint from.
pub fn brief_text_reply(signature: &str) -> ResponseDraft {
    ResponseDraft {
        subject: BRIEF_SUBJECT.to_string(),
        body: format!(
            "Thank you for contacting us. Your message is too brief for us to understand \
             what went wrong. Please reply with a short description of the problem and your \
             order number so we can help you properly.\n\n{signature}"
        ),
    }
}

/// Reply for a recording that was empty, too short or unintelligible.
pub fn brief_audio_reply(signature: &str) -> ResponseDraft {
    ResponseDraft {
        subject: BRIEF_SUBJECT.to_string(),
        body: format!(
            "Thank you for your voice message. Unfortunately the recording is too short for us \
             to understand your request. Please send a longer recording, or describe the \
             problem in writing together with your order number.\n\n{signature}"
        ),
    }
}
