//! Complaint pipeline: one fetch → process → send cycle over the inbox.
//!
//! Per message:
//! 1. Screening rules (no LLM) may drop it
//! 2. Dedup against the CRM by `Message-ID`
//! 3. Transcription for voice notes, brief-message check
//! 4. Extraction → policy → reply generation → formatting
//! 5. Persist, send, mark replied, mark read
//!
//! Transcription, extraction, generation and formatting failures queue the
//! message for manual review and the cycle moves on. Persistence and mailbox
//! failures abort the cycle. Transport failures on send leave the message unread so
//! the next cycle retries it; an address or message that can never be sent
//! goes to review.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::complaint::{
    Channel, ComplaintExtractor, ComplaintInput, ComplaintRecord, PolicyChecker, PolicyResult,
    ResponseDraft, ResponseGenerator, formatter,
};
use crate::crm::{ComplaintStatus, ComplaintStore, NewReviewItem, RecordId, ReviewStage};
use crate::error::{DeliveryError, Error};
use crate::llm::LlmProvider;
use crate::mail::message::word_count;
use crate::mail::{MailFetcher, MailSender, MessageBody, RawMessage};
use crate::pipeline::screening::ScreeningRules;
use crate::pipeline::types::{
    CycleReport, MessageOutcome, PipelineConfig, brief_audio_reply, brief_text_reply,
};
use crate::transcribe::Transcriber;

/// External collaborators of the pipeline.
///
/// Bundles the shared components to reduce argument count.
pub struct PipelineDeps {
    pub fetcher: Arc<dyn MailFetcher>,
    pub sender: Arc<dyn MailSender>,
    pub transcriber: Arc<dyn Transcriber>,
    pub store: Arc<dyn ComplaintStore>,
    pub llm: Arc<dyn LlmProvider>,
}

/// The complaint pipeline.
pub struct Pipeline {
    fetcher: Arc<dyn MailFetcher>,
    sender: Arc<dyn MailSender>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn ComplaintStore>,
    extractor: ComplaintExtractor,
    policy: PolicyChecker,
    responder: ResponseGenerator,
    screening: ScreeningRules,
    min_words: usize,
    signature: String,
}

/// Message text the rest of the pipeline works from.
struct ResolvedText {
    text: String,
    channel: Channel,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            fetcher: deps.fetcher,
            sender: deps.sender,
            transcriber: deps.transcriber,
            store: deps.store,
            extractor: ComplaintExtractor::new(Arc::clone(&deps.llm), config.llm_timeout),
            policy: PolicyChecker::new(config.policy),
            responder: ResponseGenerator::new(deps.llm, config.llm_timeout, config.signature.clone()),
            screening: config.screening,
            min_words: config.min_words,
            signature: config.signature,
        }
    }

    /// Run one cycle over all unread messages, sequentially.
    ///
    /// Returns early with the error when a message hits a persistence or
    /// mailbox failure; messages after it stay unread for the next cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, Error> {
        let messages = self.fetcher.fetch_unread().await?;
        let mut report = CycleReport {
            fetched: messages.len(),
            ..CycleReport::default()
        };

        for msg in &messages {
            let span = info_span!("message", uid = %msg.uid, message_id = %msg.message_id);
            let outcome = self
                .process_message(msg)
                .instrument(span)
                .await
                .inspect_err(|e| {
                    error!(uid = %msg.uid, error = %e, "Cycle aborted");
                })?;
            report.record(&outcome);
        }

        info!(%report, "Cycle complete");
        Ok(report)
    }

    /// Take one message through the pipeline.
    pub async fn process_message(&self, msg: &RawMessage) -> Result<MessageOutcome, Error> {
        info!(sender = %msg.sender_address, subject = %msg.subject, "Processing message");

        if let Some(reason) = self.screening.evaluate(msg) {
            self.fetcher.mark_read(msg.uid).await?;
            info!(%reason, "Message screened out");
            return Ok(MessageOutcome::Screened { reason });
        }

        if let Some(existing) = self.store.find_by_message_id(&msg.message_id).await? {
            return match existing.status {
                ComplaintStatus::Replied => {
                    self.fetcher.mark_read(msg.uid).await?;
                    debug!(record_id = %existing.id, "Already replied, marking read");
                    Ok(MessageOutcome::AlreadyReplied {
                        record_id: existing.id,
                    })
                }
                ComplaintStatus::InProgress => {
                    info!(record_id = %existing.id, "Retrying reply for saved complaint");
                    self.reply_to_saved(msg, existing.id, &existing.record, &existing.policy)
                        .await
                }
            };
        }

        let resolved = match self.resolve_text(msg).await? {
            Ok(resolved) => resolved,
            Err(outcome) => return Ok(outcome),
        };

        if word_count(&resolved.text) < self.min_words {
            let draft = match resolved.channel {
                Channel::Text => brief_text_reply(&self.signature),
                Channel::Audio => brief_audio_reply(&self.signature),
            };
            debug!(words = word_count(&resolved.text), "Message too brief");
            return self.send_brief(msg, &draft).await;
        }

        let input = ComplaintInput {
            text: resolved.text,
            channel: resolved.channel,
            sender_name: msg.sender_name.clone(),
            sender_address: msg.sender_address.clone(),
            received_at: msg.received_at,
        };

        let record = match self.extractor.extract(&input).await {
            Ok(record) => record,
            Err(e) => {
                return self
                    .queue_for_review(msg, ReviewStage::Extraction, e.to_string(), input.text)
                    .await;
            }
        };

        let policy = self.policy.check(&record);
        info!(
            order_id = %record.order_id,
            category = %record.category,
            eligible_for_refund = policy.eligible_for_refund,
            escalate = policy.escalate,
            "Policy decided"
        );

        let draft = match self.draft_reply(&record, &policy).await {
            Ok(draft) => draft,
            Err((stage, reason, raw)) => {
                return self.queue_for_review(msg, stage, reason, raw).await;
            }
        };

        let record_id = self.store.save(&record, &policy, &msg.message_id).await?;
        info!(%record_id, "Complaint saved");

        self.deliver(msg, record_id, &record.customer_email, &draft)
            .await
    }

    /// Retry path for a complaint saved by an earlier cycle whose reply was
    /// never delivered.
    async fn reply_to_saved(
        &self,
        msg: &RawMessage,
        record_id: RecordId,
        record: &ComplaintRecord,
        policy: &PolicyResult,
    ) -> Result<MessageOutcome, Error> {
        match self.draft_reply(record, policy).await {
            Ok(draft) => {
                self.deliver(msg, record_id, &record.customer_email, &draft)
                    .await
            }
            Err((stage, reason, raw)) => self.queue_for_review(msg, stage, reason, raw).await,
        }
    }

    /// Text body, or the transcript of a voice note. A failed transcription
    /// is resolved into a review outcome right here.
    async fn resolve_text(
        &self,
        msg: &RawMessage,
    ) -> Result<Result<ResolvedText, MessageOutcome>, Error> {
        match &msg.body {
            MessageBody::Text(text) => Ok(Ok(ResolvedText {
                text: text.clone(),
                channel: Channel::Text,
            })),
            MessageBody::Audio(audio) => match self.transcriber.transcribe(audio).await {
                Ok(text) => Ok(Ok(ResolvedText {
                    text,
                    channel: Channel::Audio,
                })),
                Err(e) => {
                    warn!(file = %audio.filename, error = %e, "Transcription failed");
                    let note = format!(
                        "[voice note {} ({}, {} bytes)]",
                        audio.filename,
                        audio.content_type,
                        audio.bytes.len()
                    );
                    self.queue_for_review(msg, ReviewStage::Transcription, e.to_string(), note)
                        .await
                        .map(Err)
                }
            },
        }
    }

    /// Generate and format a reply. On failure returns the stage, the
    /// reason, and the text a reviewer should see.
    async fn draft_reply(
        &self,
        record: &ComplaintRecord,
        policy: &PolicyResult,
    ) -> Result<ResponseDraft, (ReviewStage, String, String)> {
        let raw = self
            .responder
            .generate(record, policy)
            .await
            .map_err(|e| (ReviewStage::Generation, e.to_string(), record.issue_text.clone()))?;

        formatter::format(&raw).map_err(|e| {
            warn!(
                error = %e,
                shape = %formatter::describe_shape(&raw),
                "Generated reply rejected"
            );
            (ReviewStage::Formatting, e.to_string(), raw)
        })
    }

    async fn deliver(
        &self,
        msg: &RawMessage,
        record_id: RecordId,
        recipient: &str,
        draft: &ResponseDraft,
    ) -> Result<MessageOutcome, Error> {
        if let Err(e) = self
            .sender
            .send(draft, recipient, Some(&msg.message_id))
            .await
        {
            return self.delivery_failed(msg, Some(record_id), draft, e).await;
        }

        // Both updates are attempted: either one alone keeps a redelivered
        // message from being answered twice.
        let replied = self.store.mark_replied(record_id).await;
        let read = self.fetcher.mark_read(msg.uid).await;
        replied.inspect_err(|e| {
            error!(%record_id, error = %e, "Reply sent but complaint not marked replied");
        })?;
        read?;

        info!(%record_id, "Complaint answered");
        Ok(MessageOutcome::Replied { record_id })
    }

    async fn send_brief(
        &self,
        msg: &RawMessage,
        draft: &ResponseDraft,
    ) -> Result<MessageOutcome, Error> {
        if let Err(e) = self
            .sender
            .send(draft, &msg.sender_address, Some(&msg.message_id))
            .await
        {
            return self.delivery_failed(msg, None, draft, e).await;
        }
        self.fetcher.mark_read(msg.uid).await?;
        info!("Asked sender for more detail");
        Ok(MessageOutcome::AskedForDetail)
    }

    /// Transport failures leave the message unread for the next cycle.
    /// Anything else cannot succeed later and goes to review.
    async fn delivery_failed(
        &self,
        msg: &RawMessage,
        record_id: Option<RecordId>,
        draft: &ResponseDraft,
        err: DeliveryError,
    ) -> Result<MessageOutcome, Error> {
        if err.is_permanent() {
            let unsent = format!("Subject: {}\n\n{}", draft.subject, draft.body);
            return self
                .queue_for_review(msg, ReviewStage::Delivery, err.to_string(), unsent)
                .await;
        }
        warn!(record_id = ?record_id, error = %err, "Reply delivery failed, will retry next cycle");
        Ok(MessageOutcome::DeliveryFailed { record_id })
    }

    async fn queue_for_review(
        &self,
        msg: &RawMessage,
        stage: ReviewStage,
        reason: String,
        raw_text: String,
    ) -> Result<MessageOutcome, Error> {
        warn!(%stage, %reason, "Queuing message for manual review");
        self.store
            .queue_for_review(&NewReviewItem {
                message_id: msg.message_id.clone(),
                sender: msg.sender_address.clone(),
                stage,
                reason: reason.clone(),
                raw_text,
            })
            .await?;
        self.fetcher.flag_for_review(msg.uid).await?;
        Ok(MessageOutcome::QueuedForReview { stage, reason })
    }
}
