//! Cross-module scenarios: ingestion through retrieval on a real store.

mod retrieval_pipeline;
