//! Inbound message model and MIME parsing.

use std::fmt;

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};

/// Text shorter than this many words yields to an attached recording.
pub const AUDIO_PREFERRED_BELOW_WORDS: usize = 20;

/// Attachment extensions treated as recordings when the MIME type is generic.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "aac", "ogg", "oga", "opus", "flac", "m4a", "wma", "webm", "mp4", "mov", "m4v",
    "3gp", "avi", "mkv", "wmv", "flv",
];

/// IMAP UID of a message in the selected mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageUid(pub u32);

impl fmt::Display for MessageUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recording attached to an email.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for AudioAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAttachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What the customer actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Audio(AudioAttachment),
}

/// One unread inbox message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: MessageUid,
    /// `Message-ID` header, or a value derived from the UID when absent.
    pub message_id: String,
    pub sender_address: String,
    pub sender_name: String,
    pub subject: String,
    pub body: MessageBody,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// Parse an RFC 822 message. Returns `None` if mail-parser cannot make
    /// sense of the bytes or there is no sender address.
    pub fn parse(uid: MessageUid, raw: &[u8]) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        let from = parsed.from().and_then(|addr| addr.first());
        let sender_address = from.and_then(|a| a.address())?.trim().to_string();
        if sender_address.is_empty() {
            return None;
        }
        let sender_name = sender_display_name(from.and_then(|a| a.name()), &sender_address);

        let subject = parsed.subject().unwrap_or("(no subject)").to_string();
        let message_id = parsed
            .message_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("uid-{uid}@{}", domain_of(&sender_address)));

        let received_at = parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
            .unwrap_or_else(Utc::now);

        let text = extract_text(&parsed);
        let audio = find_audio(&parsed);
        let body = choose_body(text, audio);

        Some(Self {
            uid,
            message_id,
            sender_address,
            sender_name,
            subject,
            body,
            received_at,
        })
    }
}

/// Pick the body: a recording wins only when the text says little.
fn choose_body(text: String, audio: Option<AudioAttachment>) -> MessageBody {
    match audio {
        Some(audio) if word_count(&text) < AUDIO_PREFERRED_BELOW_WORDS => MessageBody::Audio(audio),
        _ => MessageBody::Text(text),
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Display name, else the address's local part, else "Customer".
pub fn sender_display_name(name: Option<&str>, address: &str) -> String {
    if let Some(name) = name.map(|n| n.trim().trim_matches('"').trim())
        && !name.is_empty()
    {
        return name.to_string();
    }
    match address.split('@').next().map(str::trim) {
        Some(local) if !local.is_empty() && address.contains('@') => local.to_string(),
        _ => "Customer".to_string(),
    }
}

fn domain_of(address: &str) -> &str {
    address.rsplit_once('@').map_or("localhost", |(_, d)| d)
}

/// Readable text of the first body part, quotes removed.
fn extract_text(parsed: &mail_parser::Message) -> String {
    let text = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };
    strip_quoted_text(&text)
}

fn find_audio(parsed: &mail_parser::Message) -> Option<AudioAttachment> {
    parsed.attachments().find_map(|part| {
        let content_type = MimeHeaders::content_type(part).map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        });
        let filename = MimeHeaders::attachment_name(part).map(str::to_string);

        let is_audio = content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("audio/") || ct.starts_with("video/"))
            || filename.as_deref().is_some_and(has_audio_extension);
        if !is_audio || part.contents().is_empty() {
            return None;
        }

        Some(AudioAttachment {
            filename: filename.unwrap_or_else(|| "recording".to_string()),
            content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes: part.contents().to_vec(),
        })
    })
}

pub fn has_audio_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop quoted reply text: `>` lines and everything after an
/// "On ... wrote:" or "--- Original Message ---" marker.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('>') {
            continue;
        }
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }
        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }
        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n").trim().to_string()
}
