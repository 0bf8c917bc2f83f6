pub mod error;
pub mod loader;
pub mod pipeline;
pub mod splitter;
pub mod types;

pub use error::DocumentError;
pub use loader::{DocumentLoader, TextLoader};
pub use pipeline::{IngestReport, IngestionPipeline};
pub use splitter::{PassageSplitter, SplitConfig};
pub use types::{Document, DocumentMetadata, Passage};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
