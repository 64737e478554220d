//! Knowledge base and hybrid retrieval engine.
//!
//! Documents are chunked with inherited heading context, embedded, and stored
//! in SQLite alongside an FTS5 index. Retrieval fuses semantic and lexical
//! rankings, selects a diverse subset, optionally reranks it with a language
//! model and assembles a citation-bearing context block.

pub mod chunker;
pub mod embeddings;
pub mod ingest;
pub mod retrieval;
pub mod store;
pub mod text;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::chunk_text;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use ingest::{infer_department, infer_domain, Ingestor};
pub use retrieval::Retriever;
pub use store::ChunkStore;
pub use types::{
    Channel, Citation, DocumentInput, ImageInput, ImageMatch, IngestAction, IngestOutcome,
    RetrievalCandidate, RetrievalMeta, RetrievalOutput, RetrieveRequest, SearchFilters,
    StoreStats,
};
