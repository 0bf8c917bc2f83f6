use maitre_llm::LlmError;
use maitre_memory::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("query embedding failed: {0}")]
    Embed(#[from] LlmError),

    #[error("vector index failure: {0}")]
    Store(#[from] VectorStoreError),

    #[error("retrieval timed out")]
    Timeout,
}

/// One failed turn. No variant leaves partial state behind: the
/// conversation memory is only written after a fully successful turn.
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("question must not be empty")]
    Validation,

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrieveError),

    #[error("generation failed: {0}")]
    Generation(#[source] LlmError),
}
