use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use maitre_llm::provider::ChatProvider;
use maitre_llm::LlmError;
use maitre_memory::{ConversationMemory, VectorStore};
use tokio::sync::Mutex;

use crate::error::AskError;
use crate::prompt;
use crate::retriever::{QueryPlanner, Retriever, SelfQueryPlanner, SemanticOnlyPlanner};

/// Per-session knobs, shared by every session a manager creates.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub assistant_name: String,
    pub collection: String,
    pub n_retrievals: u64,
    pub chat_max_tokens: usize,
    pub self_query: bool,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            assistant_name: "Dubula".into(),
            collection: "training_documents".into(),
            n_retrievals: 4,
            chat_max_tokens: 3097,
            self_query: true,
            retrieval_timeout: Duration::from_secs(8),
            generation_timeout: Duration::from_secs(45),
        }
    }
}

/// One conversation: retrieval, prompt assembly, generation, and the
/// session's token-bounded memory.
///
/// `ask` takes `&mut self`, so turns within a session are strictly
/// sequential; memory is appended only after a fully successful turn.
pub struct RagSession<P> {
    provider: Arc<P>,
    retriever: Retriever<P>,
    memory: ConversationMemory,
    assistant_name: String,
    generation_timeout: Duration,
}

impl<P: ChatProvider + 'static> RagSession<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<dyn VectorStore>, settings: &SessionSettings) -> Self {
        let planner: Box<dyn QueryPlanner> = if settings.self_query {
            Box::new(SelfQueryPlanner::new(provider.clone()))
        } else {
            Box::new(SemanticOnlyPlanner)
        };
        let retriever = Retriever::new(
            provider.clone(),
            store,
            planner,
            settings.collection.clone(),
            settings.n_retrievals,
            settings.retrieval_timeout,
        );
        Self {
            provider,
            retriever,
            memory: ConversationMemory::new(settings.chat_max_tokens),
            assistant_name: settings.assistant_name.clone(),
            generation_timeout: settings.generation_timeout,
        }
    }

    /// Answer one question: retrieve, assemble the prompt, generate,
    /// then record the turn.
    ///
    /// # Errors
    ///
    /// Returns `AskError::Validation` for an empty question before any
    /// retrieval or generation work, and retrieval/generation errors
    /// otherwise. A failed turn leaves the conversation memory exactly
    /// as it was.
    pub async fn ask(&mut self, question: &str) -> Result<String, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::Validation);
        }

        let passages = self.retriever.retrieve(question).await?;
        tracing::debug!(count = passages.len(), "retrieved passages");

        let history = self.memory.snapshot();
        let messages =
            prompt::assemble_messages(&self.assistant_name, &passages, &history, question);

        let answer = tokio::time::timeout(self.generation_timeout, self.provider.chat(&messages))
            .await
            .map_err(|_| AskError::Generation(LlmError::Timeout))?
            .map_err(AskError::Generation)?;

        self.memory.append(question, answer.clone());
        Ok(answer)
    }

    #[must_use]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }
}

/// Narrow seam the transport layer talks to.
pub trait ChatService: Send + Sync {
    fn ask(
        &self,
        session_id: Option<String>,
        question: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, AskError>> + Send + '_>>;
}

const DEFAULT_SESSION: &str = "default";

/// Owns all live sessions. Turns within a session are serialized behind
/// that session's lock; independent sessions proceed in parallel.
pub struct SessionManager<P> {
    sessions: Mutex<HashMap<String, Arc<Mutex<RagSession<P>>>>>,
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    settings: SessionSettings,
}

impl<P: ChatProvider + 'static> SessionManager<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<dyn VectorStore>, settings: SessionSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            provider,
            store,
            settings,
        }
    }

    /// Answer a question within the named session, creating it on first
    /// use. A missing id maps to the `"default"` session.
    ///
    /// # Errors
    ///
    /// Propagates the session's `AskError`; the session itself remains
    /// usable for the next turn.
    pub async fn ask(
        &self,
        session_id: Option<&str>,
        question: &str,
    ) -> Result<String, AskError> {
        let id = session_id.unwrap_or(DEFAULT_SESSION).to_owned();

        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(id)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(RagSession::new(
                        self.provider.clone(),
                        self.store.clone(),
                        &self.settings,
                    )))
                })
                .clone()
        };

        let mut session = session.lock().await;
        session.ask(question).await
    }

    #[must_use]
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl<P: ChatProvider + 'static> ChatService for SessionManager<P> {
    fn ask(
        &self,
        session_id: Option<String>,
        question: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, AskError>> + Send + '_>> {
        Box::pin(async move { self.ask(session_id.as_deref(), &question).await })
    }
}
