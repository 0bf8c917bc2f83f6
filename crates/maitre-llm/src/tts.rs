use std::future::Future;
use std::pin::Pin;

use crate::error::LlmError;

/// Audio formats the synthesis service can produce.
pub const SUPPORTED_FORMATS: &[&str] = &["wav", "mp3"];

/// The synthesis service rejects longer inputs.
const MAX_TEXT_LENGTH: usize = 1000;

/// Async trait for text-to-speech backends.
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text` into audio bytes in the requested format.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::SynthesisFailed` if the text is too long, the
    /// format is unsupported, or the backend rejects the request.
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, LlmError>> + Send + '_>>;
}

/// Client for the external text-to-speech service.
pub struct HttpTtsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTtsClient {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl std::fmt::Debug for HttpTtsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTtsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    format: &'a str,
}

impl TextToSpeech for HttpTtsClient {
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, LlmError>> + Send + '_>> {
        let text = text.to_owned();
        let voice = voice.to_owned();
        let format = format.to_owned();
        Box::pin(async move {
            if text.len() > MAX_TEXT_LENGTH {
                return Err(LlmError::SynthesisFailed(format!(
                    "text too long ({} chars, max {MAX_TEXT_LENGTH})",
                    text.len()
                )));
            }
            if !SUPPORTED_FORMATS.contains(&format.as_str()) {
                return Err(LlmError::SynthesisFailed(format!(
                    "unsupported format: {format}"
                )));
            }

            let url = format!("{}/synthesize", self.base_url.trim_end_matches('/'));
            let resp = self
                .client
                .post(&url)
                .json(&SynthesizeRequest {
                    text: &text,
                    voice: &voice,
                    format: &format,
                })
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let mut body = resp.text().await.unwrap_or_default();
                body.truncate(500);
                return Err(LlmError::SynthesisFailed(format!("{status}: {body}")));
            }

            Ok(resp.bytes().await?.to_vec())
        })
    }
}
