//! Hybrid retrieval and ranking.
//!
//! Stages, in the order a request meets them: [`expand`], [`hybrid`] search
//! with rank fusion, [`mmr`] diversity selection, optional [`rerank`], and
//! [`assemble`]. [`pipeline::Retriever`] drives them.

pub mod assemble;
pub mod expand;
pub mod hybrid;
pub mod mmr;
pub mod pipeline;
pub mod rerank;

pub use assemble::{assemble, CONTEXT_SEPARATOR};
pub use expand::QueryExpander;
pub use hybrid::{reciprocal_rank_fusion, HybridResults, HybridSearcher, RRF_K};
pub use mmr::{cosine_similarity, mmr_select};
pub use pipeline::{Retriever, DEFAULT_IMAGE_SIMILARITY};
pub use rerank::{RerankOutcome, Reranker};
