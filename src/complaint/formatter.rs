//! Strict `{subject, body}` validation of generator output.

use serde_json::Value;

use crate::complaint::types::ResponseDraft;
use crate::error::FormatError;
use crate::llm::extract_json_object;

/// Validate raw generator output into a `ResponseDraft`.
///
/// The JSON object must have exactly `subject` and `body`, and a valid
/// object is returned as is. Two double-encoded shapes are unwrapped: the
/// whole output given as a JSON string, and a body that is itself a
/// serialized `{subject, body}` object. Blank fields and multi-line
/// subjects are rejected.
pub fn format(raw: &str) -> Result<ResponseDraft, FormatError> {
    if let Some(decoded) = decode_string_literal(raw) {
        return format(&decoded);
    }

    let json = extract_json_object(raw).ok_or(FormatError::NoJsonObject)?;
    let mut draft: ResponseDraft =
        serde_json::from_str(json).map_err(|e| FormatError::Malformed(e.to_string()))?;

    if let Some(inner) = nested_draft(&draft.body) {
        draft = inner;
    }

    if draft.subject.trim().is_empty() {
        return Err(FormatError::EmptyField("subject"));
    }
    if draft.subject.contains(['\r', '\n']) {
        return Err(FormatError::Malformed("subject spans several lines".into()));
    }
    if draft.body.trim().is_empty() {
        return Err(FormatError::EmptyField("body"));
    }

    Ok(draft)
}

/// Output that is one JSON string literal wrapping an object.
fn decode_string_literal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('"') && trimmed.ends_with('"')) {
        return None;
    }
    serde_json::from_str::<String>(trimmed)
        .ok()
        .filter(|inner| inner.trim_start().starts_with('{'))
}

fn nested_draft(body: &str) -> Option<ResponseDraft> {
    let trimmed = body.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Check the generator output's top-level shape without building a draft.
/// Used in log lines when a draft is rejected.
pub fn describe_shape(raw: &str) -> String {
    match extract_json_object(raw).map(serde_json::from_str::<Value>) {
        None => "no JSON object".to_string(),
        Some(Err(_)) => "invalid JSON".to_string(),
        Some(Ok(Value::Object(map))) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Some(Ok(_)) => "non-object JSON".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_plain_object() {
        let draft = format(r#"{"subject": "Order TSR123", "body": "Hello Sam,\n\nRefund issued."}"#)
            .unwrap();
        assert_eq!(draft.subject, "Order TSR123");
        assert_eq!(draft.body, "Hello Sam,\n\nRefund issued.");
    }

    #[test]
    fn formats_fenced_object_with_prose() {
        let raw = "Here is the reply:\n```json\n{\"subject\": \"Re: TSR9\", \"body\": \"Hi\"}\n```";
        let draft = format(raw).unwrap();
        assert_eq!(draft.subject, "Re: TSR9");
    }

    #[test]
    fn roundtrips_through_to_json() {
        let drafts = [
            ResponseDraft {
                subject: "Your order TSR123".into(),
                body: "Dear Sam,\n\nWe are sorry.\n\nBest regards,\nSupport".into(),
            },
            ResponseDraft {
                subject: "Order #99120: \"billing\" query".into(),
                body: "Line with a { brace } and unicode café".into(),
            },
        ];
        for d in drafts {
            assert_eq!(format(&d.to_json()).unwrap(), d);
        }
    }

    #[test]
    fn unwraps_nested_draft() {
        let inner = r#"{"subject": "Order A-1", "body": "Inner body"}"#;
        let raw = serde_json::json!({ "subject": "Customer Support", "body": inner }).to_string();
        let draft = format(&raw).unwrap();
        assert_eq!(draft.subject, "Order A-1");
        assert_eq!(draft.body, "Inner body");
    }

    #[test]
    fn keeps_quotes_and_backslashes() {
        let drafts = [
            ResponseDraft {
                subject: "Order TSR123".into(),
                body: "\"Never arrived\" is what you wrote, and we say \"sorry\"".into(),
            },
            ResponseDraft {
                subject: "Label for TSR123".into(),
                body: "Print C:\\new\\label.pdf and attach it.".into(),
            },
            ResponseDraft {
                subject: "'Quoted' subject".into(),
                body: "  Indented first line,\\n literal escape\n".into(),
            },
        ];
        for d in drafts {
            assert_eq!(format(&d.to_json()).unwrap(), d);
        }
    }

    #[test]
    fn unwraps_output_encoded_as_string() {
        let inner = r#"{"subject": "Order A-1", "body": "Hi,\nthanks"}"#;
        let raw = serde_json::to_string(inner).unwrap();
        let draft = format(&raw).unwrap();
        assert_eq!(draft.subject, "Order A-1");
        assert_eq!(draft.body, "Hi,\nthanks");
    }

    #[test]
    fn rejects_multiline_subject() {
        assert!(matches!(
            format(r#"{"subject": "Order\nBcc: x@y", "body": "b"}"#),
            Err(FormatError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = format(r#"{"subject": "s", "body": "b", "tone": "warm"}"#).unwrap_err();
        assert!(matches!(err, FormatError::Malformed(_)));
    }

    #[test]
    fn rejects_missing_body() {
        let err = format(r#"{"subject": "s"}"#).unwrap_err();
        assert!(matches!(err, FormatError::Malformed(_)));
    }

    #[test]
    fn rejects_empty_fields() {
        assert!(matches!(
            format(r#"{"subject": "  ", "body": "b"}"#),
            Err(FormatError::EmptyField("subject"))
        ));
        assert!(matches!(
            format(r#"{"subject": "s", "body": " \n "}"#),
            Err(FormatError::EmptyField("body"))
        ));
    }

    #[test]
    fn rejects_prose() {
        assert!(matches!(
            format("Dear customer, we are sorry."),
            Err(FormatError::NoJsonObject)
        ));
    }

    #[test]
    fn describes_shape() {
        assert_eq!(describe_shape("nope"), "no JSON object");
        assert_eq!(describe_shape(r#"{"a": 1, "b": 2}"#), "object with keys [a, b]");
    }
}
