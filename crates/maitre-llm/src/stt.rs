use std::future::Future;
use std::pin::Pin;

use crate::error::LlmError;

#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
    pub duration_secs: Option<f32>,
}

/// Async trait for speech-to-text backends.
pub trait SpeechToText: Send + Sync {
    /// Transcribe audio bytes into text. `language` is a hint; `None`
    /// lets the backend auto-detect.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::TranscriptionFailed` if the backend rejects the
    /// request.
    fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Transcription, LlmError>> + Send + '_>>;
}

/// Client for the external speech-to-text service.
pub struct HttpSttClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSttClient {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl std::fmt::Debug for HttpSttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSttClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f32>,
}

impl SpeechToText for HttpSttClient {
    fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Transcription, LlmError>> + Send + '_>> {
        let audio = audio.to_vec();
        let language = language.map(str::to_owned);
        Box::pin(async move {
            let part = reqwest::multipart::Part::bytes(audio)
                .file_name("audio.wav")
                .mime_str("application/octet-stream")
                .map_err(|e| LlmError::TranscriptionFailed(e.to_string()))?;

            let mut form = reqwest::multipart::Form::new().part("audio", part);
            if let Some(lang) = language {
                form = form.text("language", lang);
            }

            let url = format!("{}/transcribe", self.base_url.trim_end_matches('/'));
            let resp = self.client.post(&url).multipart(form).send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let mut body = resp.text().await.unwrap_or_default();
                body.truncate(500);
                return Err(LlmError::TranscriptionFailed(format!("{status}: {body}")));
            }

            let parsed: SttResponse = resp.json().await?;
            Ok(Transcription {
                text: parsed.text,
                language: parsed.language,
                duration_secs: parsed.duration,
            })
        })
    }
}
