//! Response generator: the second LLM call. Turns a record plus its policy
//! decision into a raw reply, which the formatter then validates.

use std::sync::Arc;
use std::time::Duration;

use crate::complaint::types::{ComplaintRecord, PolicyResult};
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, complete_within};

const RESPONSE_TEMPERATURE: f32 = 0.4;
const RESPONSE_MAX_TOKENS: u32 = 900;

/// Sign-off used when none is configured.
pub const DEFAULT_SIGNATURE: &str = "Best regards,\nCustomer Service Team\n\
    Available 24/7 at support@example.com or 1-800-123-4567";

/// Drafts customer replies through the configured LLM.
pub struct ResponseGenerator {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    signature: String,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration, signature: impl Into<String>) -> Self {
        Self {
            llm,
            timeout,
            signature: signature.into(),
        }
    }

    /// Generate the raw reply text. The model is asked for a
    /// `{"subject", "body"}` object but nothing here checks that it complied.
    pub async fn generate(
        &self,
        record: &ComplaintRecord,
        policy: &PolicyResult,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_response_system_prompt(&self.signature)),
            ChatMessage::user(build_response_user_prompt(record, policy)),
        ])
        .with_temperature(RESPONSE_TEMPERATURE)
        .with_max_tokens(RESPONSE_MAX_TOKENS);

        let response = complete_within(self.llm.as_ref(), request, self.timeout).await?;
        tracing::debug!(
            order_id = %record.order_id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Reply drafted"
        );
        Ok(response.content)
    }
}

fn build_response_system_prompt(signature: &str) -> String {
    format!(
        "You write email replies for an online store's customer service team. \
         Be polite, empathetic and concrete. Address the customer by name.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"subject\": \"...\", \"body\": \"...\"}}\n\n\
         Rules:\n\
         - The subject must mention the order id\n\
         - If the customer is eligible for a refund, confirm that a refund is being processed\n\
         - If they asked for a refund and are not eligible, explain why in plain words, \
           without quoting internal rules\n\
         - If the case is escalated, say that a specialist will follow up within two business days\n\
         - Never promise anything the decision below does not allow\n\
         - End the body with this sign-off, verbatim:\n{signature}"
    )
}

fn build_response_user_prompt(record: &ComplaintRecord, policy: &PolicyResult) -> String {
    let mut prompt = format!(
        "Customer: {}\nOrder id: {}\nChannel: {}\nCategory: {}\nIssue: {}\nRefund requested: {}\n",
        record.customer_name,
        record.order_id,
        record.channel,
        record.category,
        record.issue_text,
        if record.refund_requested { "yes" } else { "no" },
    );
    if let Some(date) = record.order_date {
        prompt.push_str(&format!("Order date: {date}\n"));
    }
    if let Some(address) = &record.address {
        prompt.push_str(&format!("Delivery address: {address}\n"));
    }
    prompt.push_str(&format!(
        "\nDecision:\nEligible for refund: {}\nEscalated to a specialist: {}\nReason: {}",
        if policy.eligible_for_refund { "yes" } else { "no" },
        if policy.escalate { "yes" } else { "no" },
        policy.reason,
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{DateTime, NaiveDate, Utc};

    use super::*;
    use crate::complaint::types::{Channel, IssueCategory};
    use crate::llm::CompletionResponse;

    fn record() -> ComplaintRecord {
        ComplaintRecord {
            customer_name: "Jordan".into(),
            customer_email: "jordan@example.com".into(),
            order_id: "TSR123".into(),
            issue_text: "The parcel never arrived".into(),
            refund_requested: true,
            category: IssueCategory::NotDelivered,
            order_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            address: Some("4 Bay Rd".into()),
            channel: Channel::Text,
            received_at: DateTime::parse_from_rfc3339("2026-03-10T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn policy() -> PolicyResult {
        PolicyResult {
            eligible_for_refund: true,
            escalate: false,
            reason: "not_delivered issues are refundable".into(),
        }
    }

    /// Records the prompt it was given and answers with a fixed reply.
    #[derive(Default)]
    struct RecordingLlm {
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: r#"{"subject": "Your order TSR123", "body": "Refund on its way."}"#.into(),
                input_tokens: 50,
                output_tokens: 20,
            })
        }
    }

    #[test]
    fn user_prompt_carries_record_and_decision() {
        let prompt = build_response_user_prompt(&record(), &policy());
        assert!(prompt.contains("Order id: TSR123"));
        assert!(prompt.contains("Customer: Jordan"));
        assert!(prompt.contains("Refund requested: yes"));
        assert!(prompt.contains("Eligible for refund: yes"));
        assert!(prompt.contains("Escalated to a specialist: no"));
        assert!(prompt.contains("Order date: 2026-03-01"));
        assert!(prompt.contains("Delivery address: 4 Bay Rd"));
    }

    #[test]
    fn system_prompt_embeds_signature() {
        let prompt = build_response_system_prompt("Cheers,\nThe Desk");
        assert!(prompt.ends_with("Cheers,\nThe Desk"));
        assert!(prompt.contains("\"subject\""));
    }

    #[tokio::test]
    async fn generate_returns_raw_model_text() {
        let llm = Arc::new(RecordingLlm::default());
        let generator = ResponseGenerator::new(llm.clone(), Duration::from_secs(5), DEFAULT_SIGNATURE);
        let raw = generator.generate(&record(), &policy()).await.unwrap();
        assert!(raw.contains("TSR123"));

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].messages[0].content.contains("Customer Service Team"));
    }
}
