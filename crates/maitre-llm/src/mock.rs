//! Test-only scripted provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{ChatProvider, Message};

/// Scripted provider for tests. Counts chat and embed calls so tests can
/// assert that a rejected turn never reached the model.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail_chat: bool,
    pub fail_embed: bool,
    pub echo_context: bool,
    /// When scripted responses run out, fail instead of falling back to
    /// the default response.
    pub fail_when_exhausted: bool,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock answer".into(),
            fail_chat: false,
            fail_embed: false,
            echo_context: false,
            fail_when_exhausted: false,
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Serve the scripted responses, then fail every later call.
    #[must_use]
    pub fn with_responses_then_fail(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fail_when_exhausted: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embed() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    /// Chat responses echo every message fed to the model, concatenated.
    /// Lets tests assert that retrieved passages reached the prompt.
    #[must_use]
    pub fn echoing() -> Self {
        Self {
            echo_context: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

/// Deterministic pseudo-embedding so retrieval ordering is stable in tests.
fn pseudo_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, byte) in text.bytes().enumerate() {
        v[i % 8] += f32::from(byte) / 255.0;
    }
    v
}

impl ChatProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_chat {
            return Err(LlmError::Other("mock generation failure".into()));
        }
        if self.echo_context {
            let echoed: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
            return Ok(echoed.join("\n"));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            if self.fail_when_exhausted {
                return Err(LlmError::Other("mock script exhausted".into()));
            }
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Other("mock embed failure".into()));
        }
        Ok(pseudo_embedding(text))
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
