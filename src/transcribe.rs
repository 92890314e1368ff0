//! Speech to text for voice-note complaints.
//!
//! Uses an OpenAI-compatible `/v1/audio/transcriptions` endpoint: a
//! multipart upload with `file` and `model`, answered by `{"text": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::TranscriptionError;
use crate::mail::AudioAttachment;

pub const DEFAULT_TRANSCRIBE_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_TRANSCRIBE_MODEL: &str = "whisper-1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns a recording into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioAttachment) -> Result<String, TranscriptionError>;
}

/// Whisper-style HTTP transcription.
pub struct WhisperTranscriber {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperTranscriber {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TranscriptionError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioAttachment) -> Result<String, TranscriptionError> {
        let part = Part::bytes(audio.bytes.clone())
            .file_name(audio.filename.clone())
            .mime_str(&audio.content_type)
            .map_err(|e| TranscriptionError::Request(format!("bad content type: {e}")))?;

        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TranscriptionError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            file = %audio.filename,
            chars = parsed.text.len(),
            "Recording transcribed"
        );
        Ok(parsed.text.trim().to_string())
    }
}

/// Used when no transcription backend is configured. Every recording ends
/// up in the review queue.
pub struct NoTranscriber;

#[async_trait]
impl Transcriber for NoTranscriber {
    async fn transcribe(&self, _audio: &AudioAttachment) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AudioAttachment {
        AudioAttachment {
            filename: "note.m4a".into(),
            content_type: "audio/mp4".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn no_transcriber_is_unavailable() {
        let err = NoTranscriber.transcribe(&clip()).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::Unavailable));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let transcriber = WhisperTranscriber::new(
            "http://127.0.0.1:9/v1/audio/transcriptions",
            DEFAULT_TRANSCRIBE_MODEL,
            SecretString::from("sk-test"),
        )
        .unwrap();
        let err = transcriber.transcribe(&clip()).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::Request(_)));
    }

    #[test]
    fn response_shape() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "My order never came"}"#).unwrap();
        assert_eq!(parsed.text, "My order never came");
    }
}
