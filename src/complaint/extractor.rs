//! Complaint extractor: one LLM call that turns free text into a
//! `ComplaintRecord`.
//!
//! The model is asked for a single JSON object. Parsing is strict about the
//! object but lenient about value spellings (`"yes"` for booleans, numeric
//! order ids), since those vary between models.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::complaint::types::{Channel, ComplaintRecord, IssueCategory};
use crate::error::ExtractionError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, complete_within, extract_json_object};

/// Extraction is a classification task; keep it close to deterministic.
const EXTRACTION_TEMPERATURE: f32 = 0.0;

const EXTRACTION_MAX_TOKENS: u32 = 400;

/// Message text beyond this is not sent to the model.
const MAX_INPUT_CHARS: usize = 6000;

/// Fallback order-id shape when the model leaves the field empty:
/// letters followed by digits (`TSR123`, `ORD-4471`) or `#` plus digits.
static ORDER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2,5}-?\d{3,})\b|#(\d{4,})").expect("order id pattern is valid")
});

/// What the extractor needs to know about one inbound message.
#[derive(Debug, Clone)]
pub struct ComplaintInput {
    pub text: String,
    pub channel: Channel,
    pub sender_name: String,
    pub sender_address: String,
    pub received_at: DateTime<Utc>,
}

/// Extracts structured complaint fields through the configured LLM.
pub struct ComplaintExtractor {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl ComplaintExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Extract a `ComplaintRecord` from one message.
    pub async fn extract(&self, input: &ComplaintInput) -> Result<ComplaintRecord, ExtractionError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extraction_system_prompt()),
            ChatMessage::user(build_extraction_user_prompt(input)),
        ])
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);

        let response = complete_within(self.llm.as_ref(), request, self.timeout).await?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Extraction response received"
        );

        parse_extraction(&response.content, input).inspect_err(|e| {
            warn!(
                raw_response = %response.content,
                error = %e,
                "Failed to parse extraction response"
            );
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extraction_system_prompt() -> String {
    let categories: Vec<&str> = IssueCategory::ALL.iter().map(|c| c.as_str()).collect();
    format!(
        "You are a complaint analyzer for an online store's customer service team. \
         Extract structured details from the customer's message.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"customer_name\": \"...\", \"order_id\": \"...\", \"issue\": \"...\", \
         \"category\": \"...\", \"refund_requested\": true, \"order_date\": \"YYYY-MM-DD\", \
         \"address\": \"...\"}}\n\n\
         Rules:\n\
         - \"issue\" is a one or two sentence description of the problem in the customer's terms\n\
         - \"category\" is one of: {}\n\
         - \"refund_requested\" is true only if the customer asks for their money back\n\
         - Use null for order_id, order_date or address when the message does not state them\n\
         - Prefer the sender name given below over names mentioned in the text\n\
         - Do not invent order numbers",
        categories.join(", ")
    )
}

fn build_extraction_user_prompt(input: &ComplaintInput) -> String {
    let text: String = input.text.chars().take(MAX_INPUT_CHARS).collect();
    format!(
        "Sender: {} <{}>\nChannel: {}\nReceived: {}\n\nMessage:\n{}",
        input.sender_name,
        input.sender_address,
        input.channel,
        input.received_at.format("%Y-%m-%d"),
        text
    )
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    order_id: serde_json::Value,
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    refund_requested: serde_json::Value,
    #[serde(default)]
    order_date: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// Parse the raw model output into a record, filling channel, sender and
/// timestamp from the input.
pub(crate) fn parse_extraction(
    raw: &str,
    input: &ComplaintInput,
) -> Result<ComplaintRecord, ExtractionError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ExtractionError::Malformed("no JSON object in response".into()))?;
    let response: ExtractionResponse = serde_json::from_str(json)
        .map_err(|e| ExtractionError::Malformed(format!("JSON parse error: {e}")))?;

    let issue_text = non_empty(response.issue).ok_or(ExtractionError::MissingField("issue"))?;

    let order_id = value_as_id(&response.order_id)
        .or_else(|| {
            let found = find_order_id(&input.text);
            if found.is_some() {
                debug!("Order id recovered from message text");
            }
            found
        })
        .ok_or(ExtractionError::MissingField("order_id"))?;

    let customer_name = non_empty(response.customer_name)
        .filter(|n| !n.eq_ignore_ascii_case("unknown"))
        .unwrap_or_else(|| input.sender_name.clone());

    let category = response
        .category
        .as_deref()
        .and_then(|c| c.parse().ok())
        .unwrap_or(IssueCategory::Other);

    let order_date = response
        .order_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());

    Ok(ComplaintRecord {
        customer_name,
        customer_email: input.sender_address.clone(),
        order_id,
        issue_text,
        refund_requested: value_as_bool(&response.refund_requested),
        category,
        order_date,
        address: non_empty(response.address),
        channel: input.channel,
        received_at: input.received_at,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
}

fn value_as_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => non_empty(Some(s.clone())),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_bool(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "y")
        }
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn find_order_id(text: &str) -> Option<String> {
    ORDER_ID_PATTERN.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    })
}
