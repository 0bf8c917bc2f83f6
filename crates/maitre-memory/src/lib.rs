//! Document ingestion, vector index adapters, and token-bounded
//! conversation memory.

pub mod conversation;
pub mod document;
pub mod in_memory;
pub mod qdrant;
pub mod vector_store;

pub use conversation::{ConversationMemory, Turn, estimate_tokens};
pub use in_memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use vector_store::{PassageFilter, ScoredPoint, VectorPoint, VectorStore, VectorStoreError};
