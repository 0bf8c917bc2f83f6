use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::provider::{ChatProvider, Message, Role};

/// Runs a single typed extraction against a provider, optionally with a
/// system preamble describing the extraction task.
pub struct Extractor<'a, P: ChatProvider> {
    provider: &'a P,
    preamble: Option<String>,
}

impl<'a, P: ChatProvider> Extractor<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            preamble: None,
        }
    }

    #[must_use]
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// # Errors
    ///
    /// Returns an error if the provider fails or the response cannot be
    /// parsed into `T`.
    pub async fn extract<T>(&self, input: &str) -> Result<T, LlmError>
    where
        T: DeserializeOwned + JsonSchema + 'static,
    {
        let mut messages = Vec::new();
        if let Some(ref preamble) = self.preamble {
            messages.push(Message::new(Role::System, preamble.clone()));
        }
        messages.push(Message::new(Role::User, input));
        self.provider.chat_typed::<T>(&messages).await
    }
}
